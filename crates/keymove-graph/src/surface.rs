//! The diagram surface as seen from the interaction core.
//!
//! The surface owns nodes, ports, rendering and persistence. The core only
//! enumerates, asks the compatibility oracle, and calls the mutation and view
//! primitives below.

use crate::element::{Element, NodeTemplate, Port, PortTemplate};
use keymove_core::{NodeId, OverlayId, PortId, Rect, SurfaceError, SurfaceId, Vec2};
use serde::{Deserialize, Serialize};

/// Which connection preview the host should render for the current candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Preview {
    Insertion {
        local: PortId,
        neighbour: PortId,
    },
    /// The moving node would displace `displaced`, which cannot be re-attached
    /// at the tail of the moving stack.
    Replacement {
        local: PortId,
        neighbour: PortId,
        displaced: NodeId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlayShape {
    /// Outline for sequential (previous/next) ports.
    Notch,
    /// Pill outline for value (input/output) ports.
    Tab,
    /// Grip shown beside a focused node.
    Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OverlayAnchor {
    /// Positioned relative to a node; follows the node when it moves.
    Node { node: NodeId, offset: Vec2 },
    /// Fixed surface position.
    Surface(Vec2),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySpec {
    pub shape: OverlayShape,
    pub anchor: OverlayAnchor,
    pub size: Vec2,
    pub port: Option<PortId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorTarget {
    Node(NodeId),
    Port(PortId),
}

pub trait Surface {
    fn id(&self) -> SurfaceId;
    fn is_editable(&self) -> bool;

    // Enumeration
    fn top_nodes(&self) -> Vec<NodeId>;
    /// `node` itself followed by everything attached beneath it, depth-first.
    fn descendants(&self, node: NodeId) -> Vec<NodeId>;
    fn element(&self, node: NodeId) -> Option<&Element>;
    fn port(&self, port: PortId) -> Option<&Port>;
    /// Absolute surface position of a port.
    fn port_position(&self, port: PortId) -> Option<Vec2>;
    fn node_bounds(&self, node: NodeId) -> Option<Rect>;
    /// The `(local, neighbour)` port pair attaching `node` to its parent.
    fn attachment(&self, node: NodeId) -> Option<(PortId, PortId)>;
    /// Where an occupant displaced by the stack rooted at `stack_top` would be
    /// re-attached, if anywhere.
    fn orphan_reattach_port(&self, stack_top: NodeId, orphan: PortId) -> Option<PortId>;

    // Compatibility oracle
    fn can_connect(
        &self,
        local: PortId,
        neighbour: PortId,
        require_disconnected: bool,
        max_distance: f32,
    ) -> bool;
    fn accepts_template(&self, template: &PortTemplate, neighbour: PortId) -> bool;

    // Mutation
    fn reposition(&mut self, node: NodeId, position: Vec2);
    fn connect(&mut self, local: PortId, neighbour: PortId) -> Result<(), SurfaceError>;
    fn unplug(&mut self, node: NodeId, heal: bool);
    fn dispose(&mut self, node: NodeId);
    fn render(&mut self, node: NodeId);
    fn render_all(&mut self);
    fn has_capacity_for(&self, template: &NodeTemplate) -> bool;
    fn materialize(&mut self, template: &NodeTemplate, at: Vec2) -> Result<NodeId, SurfaceError>;

    // Previews
    fn show_preview(&mut self, preview: &Preview);
    fn hide_preview(&mut self);

    // Overlays (best-effort)
    fn add_overlay(&mut self, spec: &OverlaySpec) -> Result<OverlayId, SurfaceError>;
    fn update_overlay(&mut self, id: OverlayId, spec: &OverlaySpec) -> Result<(), SurfaceError>;
    fn remove_overlay(&mut self, id: OverlayId) -> Result<(), SurfaceError>;

    // View
    fn view_offset(&self) -> Vec2;
    fn scale(&self) -> f32;
    /// The currently visible region in surface coordinates.
    fn visible_rect(&self) -> Rect;
    fn scroll_into_view(&mut self, region: Rect);
    fn set_cursor(&mut self, target: Option<CursorTarget>);
    fn focus_node(&mut self, node: NodeId);
    /// Trash drop region in screen coordinates.
    fn trash_bounds(&self) -> Option<Rect>;
    fn show_move_hint(&mut self);
    fn clear_move_hint(&mut self);

    fn to_screen(&self, point: Vec2) -> Vec2 {
        (point - self.view_offset()) * self.scale()
    }

    fn to_surface(&self, point: Vec2) -> Vec2 {
        let scale = self.scale();
        let scale = if scale > 0.0 { scale } else { 1.0 };
        point * (1.0 / scale) + self.view_offset()
    }

    /// Top of the stack `node` belongs to.
    fn root_of(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = self.element(current).and_then(|e| e.parent) {
            current = parent;
        }
        current
    }
}
