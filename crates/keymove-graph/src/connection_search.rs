//! Candidate search for a moving node.
//!
//! Two policies share one filtered port list:
//! - **free**: nearest legal neighbour within the snap radius, with hysteresis
//!   so a live candidate is only replaced by a clearly closer one;
//! - **constrained**: a stable row-then-column ordering walked one legal port
//!   at a time in the requested direction, wrapping at both ends.

use crate::surface::{Preview, Surface};
use keymove_core::{Direction, NodeId, PortId, PortKind};
use std::cmp::Ordering;
use std::collections::HashSet;

/// One legal attachment opportunity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub local: PortId,
    pub neighbour: PortId,
    pub distance: f32,
}

impl Candidate {
    /// Identity of the pairing, ignoring distance.
    pub fn key(&self) -> (PortId, PortId) {
        (self.local, self.neighbour)
    }
}

/// Every port on the surface, walking each top-level stack depth-first.
pub fn all_ports(surface: &dyn Surface) -> Vec<PortId> {
    surface
        .top_nodes()
        .into_iter()
        .flat_map(|top| surface.descendants(top))
        .filter_map(|node| surface.element(node))
        .flat_map(|element| element.ports.iter().copied())
        .collect()
}

/// Ports of the moving stack that can take part in a connection: the free
/// ports of `node` itself plus the free next port at the bottom of its stack.
pub fn local_ports(surface: &dyn Surface, node: NodeId) -> Vec<PortId> {
    let Some(element) = surface.element(node) else {
        return Vec::new();
    };
    let mut locals: Vec<PortId> = element
        .ports
        .iter()
        .copied()
        .filter(|id| surface.port(*id).is_some_and(|p| !p.is_connected()))
        .collect();

    let mut tail = node;
    loop {
        let next = surface.element(tail).and_then(|e| {
            e.ports
                .iter()
                .copied()
                .find(|p| surface.port(*p).is_some_and(|p| p.kind == PortKind::Next))
        });
        let Some(next) = next else { break };
        match surface.port(next).and_then(|p| p.target) {
            Some(child_port) => match surface.port(child_port) {
                Some(child) => tail = child.node,
                None => break,
            },
            None => {
                if tail != node && !locals.contains(&next) {
                    locals.push(next);
                }
                break;
            }
        }
    }
    locals
}

/// True when the port may be offered as a neighbour for `moving`.
pub fn is_searchable(surface: &dyn Surface, excluded: &HashSet<NodeId>, port: PortId) -> bool {
    surface.port(port).is_some_and(|p| {
        !excluded.contains(&p.node)
            && surface
                .element(p.node)
                .is_some_and(|owner| !owner.kind.is_transient())
    })
}

#[derive(Debug, Clone)]
pub struct ConnectionSearch {
    moving: NodeId,
    excluded: HashSet<NodeId>,
    ordered: Vec<PortId>,
    search_node: Option<PortId>,
    snap_radius: f32,
    preference: f32,
}

impl ConnectionSearch {
    /// Snapshot the searchable ports for a session moving `moving`.
    pub fn new(surface: &dyn Surface, moving: NodeId, snap_radius: f32, preference: f32) -> Self {
        let excluded: HashSet<NodeId> = surface.descendants(moving).into_iter().collect();
        let mut ordered: Vec<(PortId, f32, f32)> = all_ports(surface)
            .into_iter()
            .filter(|p| is_searchable(surface, &excluded, *p))
            .filter_map(|p| surface.port_position(p).map(|pos| (p, pos.y, pos.x)))
            .collect();
        ordered.sort_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.2.total_cmp(&b.2))
                .then_with(|| a.0.cmp(&b.0))
        });

        Self {
            moving,
            excluded,
            ordered: ordered.into_iter().map(|(p, _, _)| p).collect(),
            search_node: None,
            snap_radius,
            preference,
        }
    }

    pub fn moving(&self) -> NodeId {
        self.moving
    }

    /// The traversal order used by constrained steps.
    pub fn ordered(&self) -> &[PortId] {
        &self.ordered
    }

    pub fn excludes(&self, node: NodeId) -> bool {
        self.excluded.contains(&node)
    }

    pub fn search_node(&self) -> Option<PortId> {
        self.search_node
    }

    /// Remember where constrained traversal should resume from.
    pub fn set_search_node(&mut self, neighbour: Option<PortId>) {
        self.search_node = neighbour;
    }

    /// Nearest legal pairing within `radius`; the first match wins ties.
    pub fn nearest(
        &self,
        surface: &dyn Surface,
        locals: &[PortId],
        radius: f32,
    ) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for &local in locals {
            let Some(from) = surface.port_position(local) else {
                continue;
            };
            for &neighbour in &self.ordered {
                if !surface.can_connect(local, neighbour, false, radius) {
                    continue;
                }
                let Some(to) = surface.port_position(neighbour) else {
                    continue;
                };
                let distance = from.distance(to);
                if best
                    .as_ref()
                    .is_none_or(|b| distance.partial_cmp(&b.distance) == Some(Ordering::Less))
                {
                    best = Some(Candidate {
                        local,
                        neighbour,
                        distance,
                    });
                }
            }
        }
        best
    }

    /// Pointer-style update. A live `current` candidate survives unless the
    /// best alternative beats it by more than the connection preference.
    pub fn free(
        &mut self,
        surface: &dyn Surface,
        locals: &[PortId],
        current: Option<&Candidate>,
    ) -> Option<Candidate> {
        let best = self.nearest(surface, locals, self.snap_radius);
        let kept = current.and_then(|c| {
            surface
                .can_connect(c.local, c.neighbour, false, self.snap_radius)
                .then(|| self.measure(surface, c.local, c.neighbour))
                .flatten()
        });

        let chosen = match (kept, best) {
            (Some(kept), Some(best)) if best.distance < kept.distance - self.preference => {
                Some(best)
            }
            (Some(kept), _) => Some(kept),
            (None, best) => best,
        };
        if let Some(c) = &chosen {
            self.search_node = Some(c.neighbour);
        }
        chosen
    }

    /// One directional keyboard step. Walks the ordering from the current
    /// neighbour (or the last one chosen) and returns the first legal port;
    /// without a starting point it falls back to the nearest candidate at any
    /// distance.
    pub fn constrained(
        &mut self,
        surface: &dyn Surface,
        locals: &[PortId],
        current: Option<&Candidate>,
        direction: Direction,
    ) -> Option<Candidate> {
        let start = current
            .map(|c| c.neighbour)
            .or(self.search_node)
            .and_then(|p| self.ordered.iter().position(|o| *o == p));

        let Some(start) = start else {
            let found = self.nearest(surface, locals, f32::INFINITY);
            if let Some(c) = &found {
                self.search_node = Some(c.neighbour);
            }
            return found;
        };

        let len = self.ordered.len() as isize;
        let step = direction.step();
        let mut index = start as isize;
        for _ in 0..len {
            index = (index + step).rem_euclid(len);
            let neighbour = self.ordered[index as usize];
            for &local in locals {
                if surface.can_connect(local, neighbour, false, f32::INFINITY)
                    && let Some(candidate) = self.measure(surface, local, neighbour)
                {
                    self.search_node = Some(neighbour);
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn measure(&self, surface: &dyn Surface, local: PortId, neighbour: PortId) -> Option<Candidate> {
        let from = surface.port_position(local)?;
        let to = surface.port_position(neighbour)?;
        Some(Candidate {
            local,
            neighbour,
            distance: from.distance(to),
        })
    }
}

/// Pair an explicitly chosen neighbour with a compatible port on the moving
/// stack: input takes an output, next takes a previous, previous takes a next.
pub fn forced_candidate(
    surface: &dyn Surface,
    locals: &[PortId],
    target: PortId,
) -> Option<Candidate> {
    let target_port = surface.port(target)?;
    let wanted = match target_port.kind {
        PortKind::Input => PortKind::Output,
        PortKind::Next => PortKind::Previous,
        PortKind::Previous => PortKind::Next,
        PortKind::Output => return None,
    };
    let to = surface.port_position(target)?;
    locals
        .iter()
        .copied()
        .filter(|l| surface.port(*l).is_some_and(|p| p.kind == wanted))
        .find(|l| surface.can_connect(*l, target, false, f32::INFINITY))
        .and_then(|local| {
            surface.port_position(local).map(|from| Candidate {
                local,
                neighbour: target,
                distance: from.distance(to),
            })
        })
}

/// Replacement when the neighbour holds a real node that cannot re-attach at
/// the bottom of the moving stack; insertion otherwise.
pub fn preview_for(surface: &dyn Surface, moving: NodeId, candidate: &Candidate) -> Preview {
    let displaced = surface.port(candidate.neighbour).and_then(|neighbour| {
        if neighbour.kind.is_child_side() {
            return None;
        }
        let occupant_port = neighbour.target?;
        let occupant = surface.port(occupant_port)?.node;
        let real = surface
            .element(occupant)
            .is_some_and(|e| !e.kind.is_transient());
        (real && surface.orphan_reattach_port(moving, occupant_port).is_none())
            .then_some(occupant)
    });

    match displaced {
        Some(displaced) => Preview::Replacement {
            local: candidate.local,
            neighbour: candidate.neighbour,
            displaced,
        },
        None => Preview::Insertion {
            local: candidate.local,
            neighbour: candidate.neighbour,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;
    use keymove_core::{ElementKind, SurfaceId, Vec2};

    fn port(ws: &Workspace, node: NodeId, kind: PortKind) -> PortId {
        ws.first_port(node, kind).unwrap()
    }

    #[test]
    fn local_ports_include_free_tail_next() {
        let mut ws = Workspace::new(SurfaceId(1));
        let a = ws.add_statement("a", Vec2::ZERO);
        let b = ws.add_statement("b", Vec2::ZERO);
        ws.link_ports(port(&ws, a, PortKind::Next), port(&ws, b, PortKind::Previous))
            .unwrap();
        let locals = local_ports(&ws, a);
        assert_eq!(
            locals,
            vec![port(&ws, a, PortKind::Previous), port(&ws, b, PortKind::Next)]
        );
    }

    #[test]
    fn search_excludes_moving_stack_and_transient_owners() {
        let mut ws = Workspace::new(SurfaceId(1));
        let a = ws.add_statement("a", Vec2::ZERO);
        let b = ws.add_statement("b", Vec2::ZERO);
        ws.link_ports(port(&ws, a, PortKind::Next), port(&ws, b, PortKind::Previous))
            .unwrap();
        let marker = ws.add_node(
            ElementKind::InsertionMarker,
            "ghost",
            Vec2::new(0.0, 200.0),
            Vec2::new(120.0, 40.0),
        );
        ws.add_port(marker, PortKind::Next, Vec2::new(16.0, 40.0));
        let c = ws.add_statement("c", Vec2::new(0.0, 400.0));

        let search = ConnectionSearch::new(&ws, a, 28.0, 8.0);
        assert!(search.excludes(b));
        assert_eq!(
            search.ordered(),
            &[port(&ws, c, PortKind::Previous), port(&ws, c, PortKind::Next)]
        );
    }

    #[test]
    fn nearest_respects_radius() {
        let mut ws = Workspace::new(SurfaceId(1));
        let target = ws.add_statement("target", Vec2::ZERO);
        let moving = ws.add_statement("moving", Vec2::new(0.0, 60.0));
        let search = ConnectionSearch::new(&ws, moving, 28.0, 8.0);
        let locals = local_ports(&ws, moving);
        let found = search.nearest(&ws, &locals, 28.0).unwrap();
        assert_eq!(found.neighbour, port(&ws, target, PortKind::Next));
        assert_eq!(found.distance, 20.0);
        assert!(search.nearest(&ws, &locals, 10.0).is_none());
    }

    #[test]
    fn free_policy_keeps_current_unless_clearly_beaten() {
        let mut ws = Workspace::new(SurfaceId(1));
        let first = ws.add_statement("first", Vec2::ZERO);
        let second = ws.add_statement("second", Vec2::new(10.0, 0.0));
        let moving = ws.add_statement("moving", Vec2::new(8.0, 50.0));
        let locals = local_ports(&ws, moving);
        let mut search = ConnectionSearch::new(&ws, moving, 28.0, 8.0);

        let current = Candidate {
            local: port(&ws, moving, PortKind::Previous),
            neighbour: port(&ws, first, PortKind::Next),
            distance: 0.0,
        };
        // second is closer, but not by more than the preference.
        let kept = search.free(&ws, &locals, Some(&current)).unwrap();
        assert_eq!(kept.neighbour, current.neighbour);

        ws.reposition(moving, Vec2::new(10.0, 45.0));
        let still = search.free(&ws, &locals, Some(&kept));
        assert_eq!(
            still.map(|c| c.neighbour),
            Some(port(&ws, first, PortKind::Next))
        );
        ws.reposition(moving, Vec2::new(24.0, 45.0));
        let switched = search.free(&ws, &locals, Some(&kept)).unwrap();
        assert_eq!(switched.neighbour, port(&ws, second, PortKind::Next));
    }

    #[test]
    fn constrained_walks_rows_then_columns_and_wraps() {
        let mut ws = Workspace::new(SurfaceId(1));
        let left = ws.add_statement("left", Vec2::new(0.0, 0.0));
        let right = ws.add_statement("right", Vec2::new(300.0, 0.0));
        let moving = ws.add_statement("moving", Vec2::new(0.0, 500.0));
        let locals = local_ports(&ws, moving);
        let mut search = ConnectionSearch::new(&ws, moving, 28.0, 8.0);

        let expected = [
            port(&ws, left, PortKind::Previous),
            port(&ws, right, PortKind::Previous),
            port(&ws, left, PortKind::Next),
            port(&ws, right, PortKind::Next),
        ];
        assert_eq!(search.ordered(), &expected);

        search.set_search_node(Some(expected[3]));
        let mut seen = Vec::new();
        for _ in 0..4 {
            let c = search
                .constrained(&ws, &locals, None, Direction::Down)
                .unwrap();
            seen.push(c.neighbour);
        }
        assert_eq!(seen, expected);

        let back = search
            .constrained(&ws, &locals, None, Direction::Up)
            .unwrap();
        assert_eq!(back.neighbour, expected[2]);
    }

    #[test]
    fn constrained_without_start_falls_back_to_nearest() {
        let mut ws = Workspace::new(SurfaceId(1));
        let far = ws.add_statement("far", Vec2::new(0.0, 0.0));
        let moving = ws.add_statement("moving", Vec2::new(0.0, 1000.0));
        let locals = local_ports(&ws, moving);
        let mut search = ConnectionSearch::new(&ws, moving, 28.0, 8.0);
        let c = search
            .constrained(&ws, &locals, None, Direction::Up)
            .unwrap();
        assert_eq!(c.neighbour, port(&ws, far, PortKind::Next));
        assert_eq!(search.search_node(), Some(c.neighbour));
    }

    #[test]
    fn forced_candidate_matches_by_kind() {
        let mut ws = Workspace::new(SurfaceId(1));
        let holder = ws.add_node(ElementKind::Block, "holder", Vec2::ZERO, Vec2::new(120.0, 40.0));
        let input = ws.add_port(holder, PortKind::Input, Vec2::new(80.0, 20.0));
        let value = ws.add_value("v", Vec2::new(300.0, 300.0));
        let stmt = ws.add_statement("s", Vec2::new(500.0, 500.0));

        let value_locals = local_ports(&ws, value);
        let forced = forced_candidate(&ws, &value_locals, input).unwrap();
        assert_eq!(forced.local, port(&ws, value, PortKind::Output));

        let stmt_locals = local_ports(&ws, stmt);
        assert!(forced_candidate(&ws, &stmt_locals, input).is_none());
        assert!(forced_candidate(&ws, &value_locals, port(&ws, value, PortKind::Output)).is_none());
    }

    #[test]
    fn preview_is_replacement_only_for_unplaceable_occupant() {
        let mut ws = Workspace::new(SurfaceId(1));
        let holder = ws.add_node(ElementKind::Block, "holder", Vec2::ZERO, Vec2::new(120.0, 40.0));
        let input = ws.add_port(holder, PortKind::Input, Vec2::new(80.0, 20.0));
        let occupant = ws.add_value("old", Vec2::ZERO);
        ws.link_ports(input, port(&ws, occupant, PortKind::Output))
            .unwrap();
        let moving = ws.add_value("new", Vec2::new(300.0, 0.0));
        let candidate = Candidate {
            local: port(&ws, moving, PortKind::Output),
            neighbour: input,
            distance: 0.0,
        };
        assert_eq!(
            preview_for(&ws, moving, &candidate),
            Preview::Replacement {
                local: candidate.local,
                neighbour: input,
                displaced: occupant,
            }
        );

        let a = ws.add_statement("a", Vec2::new(0.0, 300.0));
        let b = ws.add_statement("b", Vec2::ZERO);
        ws.link_ports(port(&ws, a, PortKind::Next), port(&ws, b, PortKind::Previous))
            .unwrap();
        let inserted = ws.add_statement("c", Vec2::new(400.0, 400.0));
        let candidate = Candidate {
            local: port(&ws, inserted, PortKind::Previous),
            neighbour: port(&ws, a, PortKind::Next),
            distance: 0.0,
        };
        assert!(matches!(
            preview_for(&ws, inserted, &candidate),
            Preview::Insertion { .. }
        ));
    }
}
