//! Per-node drag strategies and the side-table that swaps them during a move.

use keymove_core::{NodeId, PortId};
use keymove_events::DragInput;
use keymove_graph::{Candidate, ConnectionSearch, Surface};
use std::collections::HashMap;

/// Decides which candidate a drag update resolves to.
pub trait DragStrategy {
    fn name(&self) -> &'static str;

    /// Capture per-drag state (port ordering, search radius) for `node`.
    fn start(&mut self, surface: &dyn Surface, node: NodeId);

    fn update(
        &mut self,
        surface: &dyn Surface,
        locals: &[PortId],
        current: Option<&Candidate>,
        input: DragInput,
    ) -> Option<Candidate>;

    /// Point traversal at a neighbour chosen outside the strategy.
    fn resume_from(&mut self, _neighbour: Option<PortId>) {}

    fn end(&mut self) {}
}

/// Pointer dragging: nearest candidate within the snap radius.
#[derive(Debug, Clone)]
pub struct FreeDragStrategy {
    snap_radius: f32,
    preference: f32,
    search: Option<ConnectionSearch>,
}

impl FreeDragStrategy {
    pub fn new(snap_radius: f32, preference: f32) -> Self {
        Self {
            snap_radius,
            preference,
            search: None,
        }
    }
}

impl DragStrategy for FreeDragStrategy {
    fn name(&self) -> &'static str {
        "free"
    }

    fn start(&mut self, surface: &dyn Surface, node: NodeId) {
        self.search = Some(ConnectionSearch::new(
            surface,
            node,
            self.snap_radius,
            self.preference,
        ));
    }

    fn update(
        &mut self,
        surface: &dyn Surface,
        locals: &[PortId],
        current: Option<&Candidate>,
        _input: DragInput,
    ) -> Option<Candidate> {
        self.search
            .as_mut()
            .and_then(|search| search.free(surface, locals, current))
    }

    fn end(&mut self) {
        self.search = None;
    }
}

/// Keyboard moves: constrained steps walk the port ordering, everything else
/// falls back to the free policy.
#[derive(Debug, Clone)]
pub struct KeyboardDragStrategy {
    snap_radius: f32,
    preference: f32,
    search: Option<ConnectionSearch>,
}

impl KeyboardDragStrategy {
    pub fn new(snap_radius: f32, preference: f32) -> Self {
        Self {
            snap_radius,
            preference,
            search: None,
        }
    }

    pub fn search(&self) -> Option<&ConnectionSearch> {
        self.search.as_ref()
    }
}

impl DragStrategy for KeyboardDragStrategy {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn start(&mut self, surface: &dyn Surface, node: NodeId) {
        self.search = Some(ConnectionSearch::new(
            surface,
            node,
            self.snap_radius,
            self.preference,
        ));
    }

    fn update(
        &mut self,
        surface: &dyn Surface,
        locals: &[PortId],
        current: Option<&Candidate>,
        input: DragInput,
    ) -> Option<Candidate> {
        let search = self.search.as_mut()?;
        match input {
            DragInput::Constrained(direction) => {
                search.constrained(surface, locals, current, direction)
            }
            DragInput::Pointer | DragInput::Unconstrained(_) => search.free(surface, locals, current),
        }
    }

    fn resume_from(&mut self, neighbour: Option<PortId>) {
        if let Some(search) = self.search.as_mut() {
            search.set_search_node(neighbour);
        }
    }

    fn end(&mut self) {
        self.search = None;
    }
}

/// Strategy overrides keyed by node. Nodes without an entry drag with
/// [`FreeDragStrategy`].
#[derive(Default)]
pub struct StrategyTable {
    overrides: HashMap<NodeId, Box<dyn DragStrategy>>,
}

impl std::fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<(NodeId, &'static str)> = self
            .overrides
            .iter()
            .map(|(node, strategy)| (*node, strategy.name()))
            .collect();
        entries.sort();
        f.debug_struct("StrategyTable")
            .field("overrides", &entries)
            .finish()
    }
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `strategy` for `node`, returning whatever it displaced.
    pub fn install(
        &mut self,
        node: NodeId,
        strategy: Box<dyn DragStrategy>,
    ) -> Option<Box<dyn DragStrategy>> {
        self.overrides.insert(node, strategy)
    }

    /// Put back what `install` displaced (or clear the override).
    pub fn restore(&mut self, node: NodeId, previous: Option<Box<dyn DragStrategy>>) {
        match previous {
            Some(strategy) => {
                self.overrides.insert(node, strategy);
            }
            None => {
                self.overrides.remove(&node);
            }
        }
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut (dyn DragStrategy + 'static)> {
        self.overrides.get_mut(&node).map(|s| s.as_mut())
    }

    pub fn strategy_name(&self, node: NodeId) -> &'static str {
        self.overrides
            .get(&node)
            .map(|s| s.name())
            .unwrap_or("free")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keymove_core::{Direction, PortKind, SurfaceId, Vec2};
    use keymove_graph::{Workspace, local_ports};

    #[test]
    fn install_and_restore_round_trip() {
        let mut table = StrategyTable::new();
        let node = NodeId(1);
        assert_eq!(table.strategy_name(node), "free");

        let custom = table.install(node, Box::new(FreeDragStrategy::new(10.0, 1.0)));
        assert!(custom.is_none());
        let displaced = table.install(node, Box::new(KeyboardDragStrategy::new(28.0, 8.0)));
        assert_eq!(table.strategy_name(node), "keyboard");

        table.restore(node, displaced);
        assert_eq!(table.strategy_name(node), "free");
        assert!(table.get_mut(node).is_some());
        table.restore(node, None);
        assert!(table.get_mut(node).is_none());
    }

    #[test]
    fn keyboard_strategy_routes_by_input() {
        let mut ws = Workspace::new(SurfaceId(1));
        let top = ws.add_statement("top", Vec2::ZERO);
        let bottom = ws.add_statement("bottom", Vec2::new(0.0, 400.0));
        let moving = ws.add_statement("moving", Vec2::new(0.0, 45.0));
        let locals = local_ports(&ws, moving);

        let mut strategy = KeyboardDragStrategy::new(28.0, 8.0);
        strategy.start(&ws, moving);

        let near = strategy
            .update(&ws, &locals, None, DragInput::Pointer)
            .unwrap();
        assert_eq!(near.neighbour, ws.first_port(top, PortKind::Next).unwrap());

        let stepped = strategy
            .update(&ws, &locals, Some(&near), DragInput::Constrained(Direction::Down))
            .unwrap();
        assert_eq!(
            stepped.neighbour,
            ws.first_port(bottom, PortKind::Previous).unwrap()
        );

        strategy.end();
        assert!(strategy.update(&ws, &locals, None, DragInput::Pointer).is_none());
    }
}
