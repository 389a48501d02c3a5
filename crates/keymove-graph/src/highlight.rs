use crate::connection_search::is_searchable;
use crate::element::PortTemplate;
use crate::surface::{OverlayAnchor, OverlayShape, OverlaySpec, Surface};
use keymove_core::{NodeId, OverlayId, PortId, Rect, Vec2};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Upper bound on rendered highlights per computation.
pub const DEFAULT_HIGHLIGHT_LIMIT: usize = 50;
/// Outline drawn around a previous/next port.
pub const NOTCH_SIZE: Vec2 = Vec2 { x: 24.0, y: 8.0 };
/// Outline drawn around an empty input.
pub const DEFAULT_TAB_SIZE: Vec2 = Vec2 { x: 16.0, y: 24.0 };

/// A port on the moving side: either real, or part of a palette template that
/// has not been materialized yet.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalPort {
    Existing(PortId),
    Template(PortTemplate),
}

/// One legal `{local, neighbour}` pairing. `local` indexes the slice passed to
/// [`ConnectionHighlighter::highlight_valid`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pairing {
    pub local: usize,
    pub neighbour: PortId,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub neighbour: PortId,
    pub overlay: Option<OverlayId>,
    pub spec: OverlaySpec,
}

type ActivateCallback = Box<dyn FnMut(PortId)>;

/// Keeps one clickable overlay per reachable neighbour port.
///
/// The set is either empty or mirrors the most recent `highlight_valid` call.
/// Overlay failures are logged and skipped; they never interrupt the caller.
pub struct ConnectionHighlighter {
    highlights: Vec<Highlight>,
    limit: usize,
    on_activate: Option<ActivateCallback>,
    /// Whether scroll/pan notifications should re-sync overlays.
    listening: bool,
}

impl Default for ConnectionHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionHighlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHighlighter")
            .field("highlights", &self.highlights)
            .field("limit", &self.limit)
            .field("listening", &self.listening)
            .finish()
    }
}

impl ConnectionHighlighter {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HIGHLIGHT_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            highlights: Vec::new(),
            limit,
            on_activate: None,
            listening: false,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    pub fn len(&self) -> usize {
        self.highlights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn neighbours(&self) -> Vec<PortId> {
        self.highlights.iter().map(|h| h.neighbour).collect()
    }

    /// Every legal pairing between `locals` and `all_ports`, nearest first.
    ///
    /// Template ports are measured from `origin`, since they have no position
    /// on the surface yet.
    pub fn valid_pairings(
        surface: &dyn Surface,
        moving: Option<NodeId>,
        all_ports: &[PortId],
        locals: &[LocalPort],
        origin: Vec2,
    ) -> Vec<Pairing> {
        let excluded: HashSet<NodeId> = moving
            .map(|m| surface.descendants(m).into_iter().collect())
            .unwrap_or_default();

        let mut pairings = Vec::new();
        for (index, local) in locals.iter().enumerate() {
            for &neighbour in all_ports {
                if !is_searchable(surface, &excluded, neighbour) {
                    continue;
                }
                let Some(to) = surface.port_position(neighbour) else {
                    continue;
                };
                let from = match local {
                    LocalPort::Existing(port) => {
                        if !surface.can_connect(*port, neighbour, false, f32::INFINITY) {
                            continue;
                        }
                        match surface.port_position(*port) {
                            Some(from) => from,
                            None => continue,
                        }
                    }
                    LocalPort::Template(template) => {
                        if !surface.accepts_template(template, neighbour) {
                            continue;
                        }
                        origin
                    }
                };
                pairings.push(Pairing {
                    local: index,
                    neighbour,
                    distance: from.distance(to),
                });
            }
        }
        pairings.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        pairings
    }

    /// Replace the current set with overlays for every legal pairing, capped
    /// at the limit. Returns the number of overlays created.
    pub fn highlight_valid(
        &mut self,
        surface: &mut dyn Surface,
        moving: Option<NodeId>,
        all_ports: &[PortId],
        locals: &[LocalPort],
        origin: Vec2,
        on_activate: impl FnMut(PortId) + 'static,
    ) -> usize {
        self.clear_highlights(surface);

        let mut pairings = Self::valid_pairings(surface, moving, all_ports, locals, origin);
        pairings.truncate(self.limit);

        let mut seen = HashSet::new();
        for pairing in pairings {
            if !seen.insert(pairing.neighbour) {
                continue;
            }
            let Some(spec) = overlay_for(surface, pairing.neighbour) else {
                continue;
            };
            match surface.add_overlay(&spec) {
                Ok(id) => self.highlights.push(Highlight {
                    neighbour: pairing.neighbour,
                    overlay: Some(id),
                    spec,
                }),
                Err(e) => warn!("Failed to add highlight for {}: {}", pairing.neighbour, e),
            }
        }

        self.on_activate = Some(Box::new(on_activate));
        self.listening = true;
        debug!("Highlighted {} connection(s)", self.highlights.len());
        self.highlights.len()
    }

    /// Remove every overlay and stop following surface scrolls. Safe to call
    /// repeatedly.
    pub fn clear_highlights(&mut self, surface: &mut dyn Surface) {
        for highlight in self.highlights.drain(..) {
            if let Some(id) = highlight.overlay
                && let Err(e) = surface.remove_overlay(id)
            {
                warn!("Failed to remove highlight {:?}: {}", id, e);
            }
        }
        self.on_activate = None;
        self.listening = false;
    }

    /// Screen-space rectangle covered by a highlight.
    pub fn screen_rect(surface: &dyn Surface, spec: &OverlaySpec) -> Option<Rect> {
        let min = match spec.anchor {
            OverlayAnchor::Node { node, offset } => surface.element(node)?.position + offset,
            OverlayAnchor::Surface(at) => at,
        };
        let screen_min = surface.to_screen(min);
        Some(Rect::from_pos_size(screen_min, spec.size * surface.scale()))
    }

    /// Hit-test a screen point against the current overlays. When several
    /// overlap, the one with the smallest area wins.
    pub fn find_connection_at_point(&self, surface: &dyn Surface, point: Vec2) -> Option<PortId> {
        let mut best: Option<(PortId, f32)> = None;
        for highlight in &self.highlights {
            let Some(rect) = Self::screen_rect(surface, &highlight.spec) else {
                continue;
            };
            if !rect.contains(point) {
                continue;
            }
            let area = rect.width() * rect.height();
            match &best {
                Some((_, best_area)) if area >= *best_area => {}
                _ => best = Some((highlight.neighbour, area)),
            }
        }
        best.map(|(port, _)| port)
    }

    /// Invoke the activation callback for a highlighted neighbour.
    pub fn activate(&mut self, neighbour: PortId) -> bool {
        if !self.highlights.iter().any(|h| h.neighbour == neighbour) {
            return false;
        }
        match self.on_activate.as_mut() {
            Some(callback) => {
                callback(neighbour);
                true
            }
            None => false,
        }
    }

    /// Hit-test and activate in one step, as a host click handler would.
    pub fn activate_at(&mut self, surface: &dyn Surface, point: Vec2) -> Option<PortId> {
        let neighbour = self.find_connection_at_point(surface, point)?;
        self.activate(neighbour).then_some(neighbour)
    }

    /// Re-sync overlay geometry in place after nodes move or re-render.
    pub fn update_highlights(&mut self, surface: &mut dyn Surface) {
        for highlight in &mut self.highlights {
            let Some(spec) = overlay_for(surface, highlight.neighbour) else {
                continue;
            };
            let Some(id) = highlight.overlay else {
                continue;
            };
            if spec == highlight.spec {
                continue;
            }
            match surface.update_overlay(id, &spec) {
                Ok(()) => highlight.spec = spec,
                Err(e) => warn!("Failed to update highlight {:?}: {}", id, e),
            }
        }
    }

    /// Scroll/pan notification from the host.
    pub fn on_surface_scrolled(&mut self, surface: &mut dyn Surface) {
        if self.listening {
            self.update_highlights(surface);
        }
    }
}

/// Overlay geometry for a neighbour port: a notch for sequential ports, a tab
/// sized to the current occupant for value ports.
pub fn overlay_for(surface: &dyn Surface, neighbour: PortId) -> Option<OverlaySpec> {
    let port = surface.port(neighbour)?;
    if port.kind.is_sequential() {
        return Some(OverlaySpec {
            shape: OverlayShape::Notch,
            anchor: OverlayAnchor::Node {
                node: port.node,
                offset: port.offset - NOTCH_SIZE * 0.5,
            },
            size: NOTCH_SIZE,
            port: Some(neighbour),
        });
    }

    let size = port
        .target
        .and_then(|t| surface.port(t))
        .and_then(|occupant| surface.node_bounds(occupant.node))
        .map(|bounds| bounds.size())
        .unwrap_or(DEFAULT_TAB_SIZE);
    Some(OverlaySpec {
        shape: OverlayShape::Tab,
        anchor: OverlayAnchor::Node {
            node: port.node,
            offset: port.offset - Vec2::new(0.0, size.y * 0.5),
        },
        size,
        port: Some(neighbour),
    })
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::connection_search::all_ports;
    use crate::workspace::Workspace;
    use keymove_core::{PortKind, SurfaceId};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn highlight_set_is_capped_at_nearest_pairings(
            offsets in prop::collection::vec((0u16..200, 0u16..200), 51..90),
        ) {
            let mut ws = Workspace::new(SurfaceId(1));
            for (i, (x, y)) in offsets.iter().enumerate() {
                ws.add_statement(format!("n{i}"), Vec2::new(*x as f32 * 7.0, *y as f32 * 5.0));
            }
            let moving = ws.add_statement("moving", Vec2::new(300.0, 300.0));
            let local = ws.first_port(moving, PortKind::Previous).unwrap();
            let ports = all_ports(&ws);
            let locals = vec![LocalPort::Existing(local)];

            let pairings =
                ConnectionHighlighter::valid_pairings(&ws, Some(moving), &ports, &locals, Vec2::ZERO);
            prop_assert_eq!(pairings.len(), offsets.len());

            let mut highlighter = ConnectionHighlighter::new();
            let count =
                highlighter.highlight_valid(&mut ws, Some(moving), &ports, &locals, Vec2::ZERO, |_| {});
            prop_assert_eq!(count, DEFAULT_HIGHLIGHT_LIMIT);
            prop_assert_eq!(ws.overlays().len(), DEFAULT_HIGHLIGHT_LIMIT);

            let from = ws.port_position(local).unwrap();
            let chosen: HashSet<PortId> = highlighter.neighbours().into_iter().collect();
            let worst_chosen = chosen
                .iter()
                .map(|p| from.distance(ws.port_position(*p).unwrap()))
                .fold(0.0f32, f32::max);
            for pairing in &pairings {
                if !chosen.contains(&pairing.neighbour) {
                    prop_assert!(pairing.distance >= worst_chosen);
                }
            }
        }
    }
}
