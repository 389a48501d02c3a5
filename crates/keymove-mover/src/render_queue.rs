use keymove_core::{NodeId, SurfaceId};
use keymove_graph::Surface;
use std::collections::HashMap;

/// Post-commit render work, batched until the host's next frame.
#[derive(Debug, Default)]
pub struct RenderQueue {
    pending: HashMap<SurfaceId, Vec<NodeId>>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, surface: SurfaceId, node: NodeId) {
        let queue = self.pending.entry(surface).or_default();
        if !queue.contains(&node) {
            queue.push(node);
        }
    }

    pub fn is_pending(&self, surface: SurfaceId) -> bool {
        self.pending.get(&surface).is_some_and(|q| !q.is_empty())
    }

    /// Run the deferred pass: re-render each moved node's stack, then the
    /// whole surface once, then bring each node into view and focus it.
    /// Nodes disposed since scheduling are skipped. Returns the nodes handled.
    pub fn run(&mut self, surface: &mut dyn Surface) -> Vec<NodeId> {
        let Some(queue) = self.pending.remove(&surface.id()) else {
            return Vec::new();
        };
        let live: Vec<NodeId> = queue
            .into_iter()
            .filter(|node| surface.element(*node).is_some())
            .collect();
        if live.is_empty() {
            return live;
        }

        for node in &live {
            let root = surface.root_of(*node);
            surface.render(root);
        }
        surface.render_all();
        for node in &live {
            if let Some(bounds) = surface.node_bounds(*node) {
                surface.scroll_into_view(bounds);
            }
            surface.focus_node(*node);
        }
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keymove_core::{PortKind, Vec2};
    use keymove_graph::Workspace;

    #[test]
    fn pass_renders_root_then_surface_then_focuses() {
        let mut ws = Workspace::new(SurfaceId(1));
        let a = ws.add_statement("a", Vec2::ZERO);
        let b = ws.add_statement("b", Vec2::ZERO);
        ws.link_ports(
            ws.first_port(a, PortKind::Next).unwrap(),
            ws.first_port(b, PortKind::Previous).unwrap(),
        )
        .unwrap();

        let mut queue = RenderQueue::new();
        queue.schedule(SurfaceId(1), b);
        queue.schedule(SurfaceId(1), b);
        assert!(queue.is_pending(SurfaceId(1)));
        assert!(ws.log().renders.is_empty());

        assert_eq!(queue.run(&mut ws), vec![b]);
        assert_eq!(ws.log().renders, vec![a]);
        assert_eq!(ws.log().full_renders, 1);
        assert_eq!(ws.log().scrolls.len(), 1);
        assert_eq!(ws.focused(), Some(b));
        assert!(!queue.is_pending(SurfaceId(1)));
        assert!(queue.run(&mut ws).is_empty());
    }

    #[test]
    fn disposed_nodes_are_skipped() {
        let mut ws = Workspace::new(SurfaceId(1));
        let a = ws.add_statement("a", Vec2::ZERO);
        let mut queue = RenderQueue::new();
        queue.schedule(SurfaceId(1), a);
        ws.dispose(a);
        assert!(queue.run(&mut ws).is_empty());
        assert_eq!(ws.log().full_renders, 0);
    }
}
