use crate::settings::MoverSettings;
use keymove_core::{NodeId, OverlayId, SurfaceId, Vec2};
use keymove_graph::{ConnectionHighlighter, OverlayAnchor, OverlayShape, OverlaySpec, Surface};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Grip drawn at the top-left of the focused node. Clicking it enters sticky
/// mode for that node. Sizes are read from the settings each time a grip is
/// drawn.
#[derive(Debug, Clone, Default)]
pub struct HandleAffordance {
    shown: HashMap<SurfaceId, (NodeId, OverlayId, OverlaySpec)>,
}

impl HandleAffordance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, surface: SurfaceId) -> Option<NodeId> {
        self.shown.get(&surface).map(|(node, _, _)| *node)
    }

    /// Side length of the grip for `node`; short nodes get the narrow variant.
    pub fn size_for(surface: &dyn Surface, node: NodeId, settings: &MoverSettings) -> f32 {
        match surface.node_bounds(node) {
            Some(bounds) if bounds.height() < settings.small_node_height => {
                settings.handle_small_size
            }
            _ => settings.handle_size,
        }
    }

    pub fn show(
        &mut self,
        surface: &mut dyn Surface,
        node: NodeId,
        settings: &MoverSettings,
    ) -> bool {
        if self.node(surface.id()) == Some(node) {
            return true;
        }
        self.hide(surface);
        if surface.element(node).is_none() {
            return false;
        }
        let side = Self::size_for(surface, node, settings);
        let spec = OverlaySpec {
            shape: OverlayShape::Handle,
            anchor: OverlayAnchor::Node {
                node,
                offset: Vec2::new(-side, 0.0),
            },
            size: Vec2::new(side, side),
            port: None,
        };
        match surface.add_overlay(&spec) {
            Ok(id) => {
                debug!("Showing move handle for {}", node);
                self.shown.insert(surface.id(), (node, id, spec));
                true
            }
            Err(e) => {
                warn!("Failed to show move handle for {}: {}", node, e);
                false
            }
        }
    }

    pub fn hide(&mut self, surface: &mut dyn Surface) {
        if let Some((node, id, _)) = self.shown.remove(&surface.id())
            && let Err(e) = surface.remove_overlay(id)
        {
            warn!("Failed to remove move handle for {}: {}", node, e);
        }
    }

    /// The node whose grip covers the screen point, if any.
    pub fn hit(&self, surface: &dyn Surface, point: Vec2) -> Option<NodeId> {
        let (node, _, spec) = self.shown.get(&surface.id())?;
        ConnectionHighlighter::screen_rect(surface, spec)
            .filter(|rect| rect.contains(point))
            .map(|_| *node)
    }
}
