use crate::element::{
    Element, NodeTemplate, PORT_INSET, Port, PortTemplate, STATEMENT_SIZE, VALUE_SIZE,
    checks_intersect,
};
use crate::surface::{CursorTarget, OverlayAnchor, OverlaySpec, Preview, Surface};
use keymove_core::{
    ElementKind, NodeId, OverlayId, PortId, PortKind, Rect, SurfaceError, SurfaceId, Vec2,
};
use std::collections::BTreeMap;

/// Offset applied to an occupant that could not be re-attached after being displaced.
pub const BUMP_OFFSET: Vec2 = Vec2 { x: 24.0, y: 24.0 };

/// Collaborator calls recorded for observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceLog {
    pub renders: Vec<NodeId>,
    pub full_renders: usize,
    pub scrolls: Vec<Rect>,
    pub previews_shown: usize,
    pub focus_requests: Vec<NodeId>,
}

/// Arena-backed in-memory diagram surface.
#[derive(Debug)]
pub struct Workspace {
    id: SurfaceId,
    editable: bool,
    elements: BTreeMap<NodeId, Element>,
    ports: BTreeMap<PortId, Port>,
    next_node: i64,
    next_port: i64,
    next_overlay: u64,
    overlays: BTreeMap<OverlayId, OverlaySpec>,
    preview: Option<Preview>,
    cursor: Option<CursorTarget>,
    focused: Option<NodeId>,
    view_offset: Vec2,
    scale: f32,
    viewport: Vec2,
    trash: Option<Rect>,
    capacity: Option<usize>,
    hint_visible: bool,
    log: SurfaceLog,
}

impl Workspace {
    pub fn new(id: SurfaceId) -> Self {
        Self {
            id,
            editable: true,
            elements: BTreeMap::new(),
            ports: BTreeMap::new(),
            next_node: 1,
            next_port: 1,
            next_overlay: 1,
            overlays: BTreeMap::new(),
            preview: None,
            cursor: None,
            focused: None,
            view_offset: Vec2::ZERO,
            scale: 1.0,
            viewport: Vec2::new(800.0, 600.0),
            trash: None,
            capacity: None,
            hint_visible: false,
            log: SurfaceLog::default(),
        }
    }

    // -- Building --

    pub fn add_node(
        &mut self,
        kind: ElementKind,
        label: impl Into<String>,
        position: Vec2,
        size: Vec2,
    ) -> NodeId {
        let id = NodeId(self.next_node);
        self.insert_element(id, kind, label.into(), position, size);
        id
    }

    pub(crate) fn insert_element(
        &mut self,
        id: NodeId,
        kind: ElementKind,
        label: String,
        position: Vec2,
        size: Vec2,
    ) {
        self.next_node = self.next_node.max(id.0 + 1);
        self.elements.insert(
            id,
            Element {
                id,
                kind,
                label,
                position,
                size,
                ports: Vec::new(),
                parent: None,
                movable: kind != ElementKind::InsertionMarker,
                deletable: kind != ElementKind::InsertionMarker,
            },
        );
    }

    pub fn add_port(&mut self, node: NodeId, kind: PortKind, offset: Vec2) -> PortId {
        self.add_port_checked(node, kind, offset, None)
    }

    pub fn add_port_checked(
        &mut self,
        node: NodeId,
        kind: PortKind,
        offset: Vec2,
        check: Option<Vec<String>>,
    ) -> PortId {
        let id = PortId(self.next_port);
        self.insert_port(id, node, kind, offset, check);
        id
    }

    pub(crate) fn insert_port(
        &mut self,
        id: PortId,
        node: NodeId,
        kind: PortKind,
        offset: Vec2,
        check: Option<Vec<String>>,
    ) {
        self.next_port = self.next_port.max(id.0 + 1);
        self.ports.insert(
            id,
            Port {
                id,
                node,
                kind,
                offset,
                check,
                target: None,
            },
        );
        if let Some(element) = self.elements.get_mut(&node) {
            element.ports.push(id);
        }
    }

    /// A sequential node with a previous port on top and a next port below.
    pub fn add_statement(&mut self, label: impl Into<String>, position: Vec2) -> NodeId {
        let node = self.add_node(ElementKind::Block, label, position, STATEMENT_SIZE);
        self.add_port(node, PortKind::Previous, Vec2::new(PORT_INSET, 0.0));
        self.add_port(node, PortKind::Next, Vec2::new(PORT_INSET, STATEMENT_SIZE.y));
        node
    }

    /// A value node with a single output port on its left edge.
    pub fn add_value(&mut self, label: impl Into<String>, position: Vec2) -> NodeId {
        let node = self.add_node(ElementKind::Block, label, position, VALUE_SIZE);
        self.add_port(node, PortKind::Output, Vec2::new(0.0, VALUE_SIZE.y * 0.5));
        node
    }

    /// Attach `child` to `parent` ports and align the child under the parent.
    pub fn link_ports(&mut self, parent: PortId, child: PortId) -> Result<(), SurfaceError> {
        let parent_kind = self.port_kind(parent)?;
        let child_kind = self.port_kind(child)?;
        if parent_kind.is_child_side() || parent_kind.complement() != child_kind {
            return Err(SurfaceError::Incompatible {
                local: child,
                neighbour: parent,
            });
        }
        self.disconnect_port(child);
        self.disconnect_port(parent);
        self.link(parent, child);
        self.align(child, parent);
        Ok(())
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    pub fn set_movable(&mut self, node: NodeId, movable: bool) {
        if let Some(element) = self.elements.get_mut(&node) {
            element.movable = movable;
        }
    }

    pub fn set_deletable(&mut self, node: NodeId, deletable: bool) {
        if let Some(element) = self.elements.get_mut(&node) {
            element.deletable = deletable;
        }
    }

    pub fn set_trash(&mut self, bounds: Option<Rect>) {
        self.trash = bounds;
    }

    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }

    pub fn set_view(&mut self, offset: Vec2, scale: f32, viewport: Vec2) {
        self.view_offset = offset;
        self.scale = scale;
        self.viewport = viewport;
    }

    /// Pan the view; hosts notify interested overlays afterwards.
    pub fn scroll_by(&mut self, delta: Vec2) {
        self.view_offset += delta;
    }

    // -- Observation --

    pub fn contains(&self, node: NodeId) -> bool {
        self.elements.contains_key(&node)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    pub fn all_ports(&self) -> Vec<PortId> {
        self.ports.keys().copied().collect()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn position_of(&self, node: NodeId) -> Option<Vec2> {
        self.elements.get(&node).map(|e| e.position)
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.elements.get(&node).and_then(|e| e.parent)
    }

    pub fn ports_of(&self, node: NodeId, kind: PortKind) -> Vec<PortId> {
        self.elements
            .get(&node)
            .map(|e| {
                e.ports
                    .iter()
                    .copied()
                    .filter(|p| self.ports.get(p).is_some_and(|port| port.kind == kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn first_port(&self, node: NodeId, kind: PortKind) -> Option<PortId> {
        self.ports_of(node, kind).into_iter().next()
    }

    pub fn overlays(&self) -> &BTreeMap<OverlayId, OverlaySpec> {
        &self.overlays
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn cursor(&self) -> Option<CursorTarget> {
        self.cursor
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn hint_visible(&self) -> bool {
        self.hint_visible
    }

    pub fn log(&self) -> &SurfaceLog {
        &self.log
    }

    pub(crate) fn trash(&self) -> Option<Rect> {
        self.trash
    }

    pub(crate) fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub(crate) fn viewport(&self) -> Vec2 {
        self.viewport
    }

    // -- Internals --

    fn port_kind(&self, port: PortId) -> Result<PortKind, SurfaceError> {
        self.ports
            .get(&port)
            .map(|p| p.kind)
            .ok_or(SurfaceError::UnknownPort(port))
    }

    fn owner(&self, port: PortId) -> Option<NodeId> {
        self.ports.get(&port).map(|p| p.node)
    }

    fn link(&mut self, parent: PortId, child: PortId) {
        let parent_node = self.owner(parent);
        if let Some(p) = self.ports.get_mut(&parent) {
            p.target = Some(child);
        }
        let child_node = match self.ports.get_mut(&child) {
            Some(c) => {
                c.target = Some(parent);
                c.node
            }
            None => return,
        };
        if let Some(element) = self.elements.get_mut(&child_node) {
            element.parent = parent_node;
        }
    }

    fn disconnect_port(&mut self, port: PortId) {
        let Some(target) = self.ports.get_mut(&port).and_then(|p| p.target.take()) else {
            return;
        };
        if let Some(other) = self.ports.get_mut(&target) {
            other.target = None;
        }
        let child_port = match self.port_kind(port) {
            Ok(kind) if kind.is_child_side() => port,
            _ => target,
        };
        if let Some(child) = self.owner(child_port)
            && let Some(element) = self.elements.get_mut(&child)
        {
            element.parent = None;
        }
    }

    fn translate_subtree(&mut self, node: NodeId, delta: Vec2) {
        for id in self.descendants(node) {
            if let Some(element) = self.elements.get_mut(&id) {
                element.position += delta;
            }
        }
    }

    fn align(&mut self, child_port: PortId, parent_port: PortId) {
        let (Some(from), Some(to), Some(child)) = (
            self.port_position(child_port),
            self.port_position(parent_port),
            self.owner(child_port),
        ) else {
            return;
        };
        self.translate_subtree(child, to - from);
    }

    fn next_port_of(&self, node: NodeId) -> Option<PortId> {
        self.first_port(node, PortKind::Next)
    }

    fn last_in_stack(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(child) = self
            .next_port_of(current)
            .and_then(|p| self.ports.get(&p))
            .and_then(|p| p.target)
            .and_then(|t| self.owner(t))
        {
            current = child;
        }
        current
    }

    fn rehome_orphan(&mut self, stack_top: NodeId, orphan: PortId) {
        let Some(occupant) = self.owner(orphan) else {
            return;
        };
        if self
            .elements
            .get(&occupant)
            .is_some_and(|e| e.kind == ElementKind::Placeholder)
        {
            self.dispose(occupant);
            return;
        }
        match self.orphan_reattach_port(stack_top, orphan) {
            Some(tail) => {
                self.link(tail, orphan);
                self.align(orphan, tail);
            }
            None => {
                tracing::debug!("Bumping displaced node {} off {}", occupant, stack_top);
                self.translate_subtree(occupant, BUMP_OFFSET);
            }
        }
    }
}

impl Surface for Workspace {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn is_editable(&self) -> bool {
        self.editable
    }

    fn top_nodes(&self) -> Vec<NodeId> {
        self.elements
            .values()
            .filter(|e| e.parent.is_none())
            .map(|e| e.id)
            .collect()
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(element) = self.elements.get(&current) else {
                continue;
            };
            out.push(current);
            // Reverse so children are visited in port order.
            for port in element.ports.iter().rev() {
                if let Some(port) = self.ports.get(port)
                    && !port.kind.is_child_side()
                    && let Some(child) = port.target.and_then(|t| self.owner(t))
                {
                    stack.push(child);
                }
            }
        }
        out
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        self.elements.get(&node)
    }

    fn port(&self, port: PortId) -> Option<&Port> {
        self.ports.get(&port)
    }

    fn port_position(&self, port: PortId) -> Option<Vec2> {
        let port = self.ports.get(&port)?;
        let owner = self.elements.get(&port.node)?;
        Some(owner.position + port.offset)
    }

    fn node_bounds(&self, node: NodeId) -> Option<Rect> {
        self.elements.get(&node).map(Element::bounds)
    }

    fn attachment(&self, node: NodeId) -> Option<(PortId, PortId)> {
        let element = self.elements.get(&node)?;
        element.ports.iter().find_map(|id| {
            let port = self.ports.get(id)?;
            if port.kind.is_child_side() {
                port.target.map(|t| (port.id, t))
            } else {
                None
            }
        })
    }

    fn orphan_reattach_port(&self, stack_top: NodeId, orphan: PortId) -> Option<PortId> {
        let orphan = self.ports.get(&orphan)?;
        match orphan.kind {
            PortKind::Previous => {
                let tail = self.next_port_of(self.last_in_stack(stack_top))?;
                let tail_port = self.ports.get(&tail)?;
                (tail_port.target.is_none()
                    && checks_intersect(tail_port.check.as_deref(), orphan.check.as_deref()))
                .then_some(tail)
            }
            PortKind::Output => {
                // Follow the single compatible input down the nesting chain.
                let mut node = stack_top;
                for _ in 0..self.elements.len() {
                    let inputs: Vec<&Port> = self
                        .ports_of(node, PortKind::Input)
                        .iter()
                        .filter_map(|p| self.ports.get(p))
                        .filter(|p| checks_intersect(p.check.as_deref(), orphan.check.as_deref()))
                        .collect();
                    let [input] = inputs.as_slice() else {
                        return None;
                    };
                    match input.target.and_then(|t| self.owner(t)) {
                        None => return Some(input.id),
                        Some(occupant)
                            if self
                                .elements
                                .get(&occupant)
                                .is_some_and(|e| e.kind == ElementKind::Block) =>
                        {
                            node = occupant;
                        }
                        Some(_) => return None,
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn can_connect(
        &self,
        local: PortId,
        neighbour: PortId,
        require_disconnected: bool,
        max_distance: f32,
    ) -> bool {
        let (Some(l), Some(n)) = (self.ports.get(&local), self.ports.get(&neighbour)) else {
            return false;
        };
        if l.kind.complement() != n.kind || l.node == n.node {
            return false;
        }
        let (Some(ln), Some(nn)) = (self.elements.get(&l.node), self.elements.get(&n.node)) else {
            return false;
        };
        if ln.kind.is_transient() || nn.kind.is_transient() {
            return false;
        }
        if !checks_intersect(l.check.as_deref(), n.check.as_deref()) {
            return false;
        }
        if l.target.is_some() {
            return false;
        }
        // A node's previous/output can only ever hold one parent.
        if n.kind.is_child_side() && n.target.is_some() {
            return false;
        }
        if require_disconnected && n.target.is_some() {
            return false;
        }
        match (self.port_position(local), self.port_position(neighbour)) {
            (Some(a), Some(b)) => a.distance(b) <= max_distance,
            _ => false,
        }
    }

    fn accepts_template(&self, template: &PortTemplate, neighbour: PortId) -> bool {
        let Some(n) = self.ports.get(&neighbour) else {
            return false;
        };
        if template.kind.complement() != n.kind {
            return false;
        }
        if self
            .elements
            .get(&n.node)
            .is_none_or(|e| e.kind.is_transient())
        {
            return false;
        }
        if n.kind.is_child_side() && n.target.is_some() {
            return false;
        }
        checks_intersect(template.check.as_deref(), n.check.as_deref())
    }

    fn reposition(&mut self, node: NodeId, position: Vec2) {
        if let Some(current) = self.position_of(node) {
            self.translate_subtree(node, position - current);
        }
    }

    fn connect(&mut self, local: PortId, neighbour: PortId) -> Result<(), SurfaceError> {
        let local_kind = self.port_kind(local)?;
        let neighbour_kind = self.port_kind(neighbour)?;
        if local_kind.complement() != neighbour_kind || self.owner(local) == self.owner(neighbour)
        {
            return Err(SurfaceError::Incompatible { local, neighbour });
        }
        let (parent_port, child_port) = if local_kind.is_child_side() {
            (neighbour, local)
        } else {
            (local, neighbour)
        };
        let child = self
            .owner(child_port)
            .ok_or(SurfaceError::UnknownPort(child_port))?;
        self.disconnect_port(child_port);
        let orphan = self.ports.get(&parent_port).and_then(|p| p.target);
        if let Some(orphan) = orphan {
            self.disconnect_port(orphan);
        }
        self.link(parent_port, child_port);
        self.align(child_port, parent_port);
        if let Some(orphan) = orphan {
            self.rehome_orphan(child, orphan);
        }
        Ok(())
    }

    fn unplug(&mut self, node: NodeId, heal: bool) {
        let Some((local, parent_port)) = self.attachment(node) else {
            // A free stack still gives up whatever hangs beneath it.
            if heal && let Some(next) = self.next_port_of(node) {
                self.disconnect_port(next);
            }
            return;
        };
        self.disconnect_port(local);
        if !heal {
            return;
        }
        // Lift the node out and let whatever hung beneath it take its place.
        let replacement = match self.port_kind(local) {
            Ok(PortKind::Previous) => self
                .next_port_of(node)
                .and_then(|p| self.ports.get(&p))
                .and_then(|p| p.target),
            Ok(PortKind::Output) => {
                let occupied: Vec<PortId> = self
                    .ports_of(node, PortKind::Input)
                    .into_iter()
                    .filter_map(|p| self.ports.get(&p).and_then(|p| p.target))
                    .collect();
                match occupied.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                }
            }
            _ => None,
        };
        if let Some(child_port) = replacement {
            let compatible = match (self.ports.get(&child_port), self.ports.get(&parent_port)) {
                (Some(c), Some(p)) => checks_intersect(c.check.as_deref(), p.check.as_deref()),
                _ => false,
            };
            if compatible {
                self.disconnect_port(child_port);
                self.link(parent_port, child_port);
                self.align(child_port, parent_port);
            }
        }
    }

    fn dispose(&mut self, node: NodeId) {
        if let Some((local, _)) = self.attachment(node) {
            self.disconnect_port(local);
        }
        let doomed = self.descendants(node);
        for id in &doomed {
            if let Some(element) = self.elements.remove(id) {
                for port in element.ports {
                    self.ports.remove(&port);
                }
            }
        }
        // Node-anchored overlays go with their node.
        self.overlays.retain(|_, spec| match spec.anchor {
            OverlayAnchor::Node { node, .. } => !doomed.contains(&node),
            OverlayAnchor::Surface(_) => true,
        });
        if self.focused.is_some_and(|f| doomed.contains(&f)) {
            self.focused = None;
        }
        if let Some(CursorTarget::Node(n)) = self.cursor
            && doomed.contains(&n)
        {
            self.cursor = None;
        }
    }

    fn render(&mut self, node: NodeId) {
        self.log.renders.push(node);
    }

    fn render_all(&mut self) {
        self.log.full_renders += 1;
    }

    fn has_capacity_for(&self, _template: &NodeTemplate) -> bool {
        match self.capacity {
            Some(limit) => {
                self.elements
                    .values()
                    .filter(|e| e.kind == ElementKind::Block)
                    .count()
                    < limit
            }
            None => true,
        }
    }

    fn materialize(&mut self, template: &NodeTemplate, at: Vec2) -> Result<NodeId, SurfaceError> {
        if !self.editable {
            return Err(SurfaceError::NotEditable);
        }
        if !self.has_capacity_for(template) {
            return Err(SurfaceError::CapacityExhausted);
        }
        let node = self.add_node(template.kind, template.label.clone(), at, template.size);
        for port in &template.ports {
            self.add_port_checked(node, port.kind, port.offset, port.check.clone());
        }
        Ok(node)
    }

    fn show_preview(&mut self, preview: &Preview) {
        self.preview = Some(preview.clone());
        self.log.previews_shown += 1;
    }

    fn hide_preview(&mut self) {
        self.preview = None;
    }

    fn add_overlay(&mut self, spec: &OverlaySpec) -> Result<OverlayId, SurfaceError> {
        if let OverlayAnchor::Node { node, .. } = spec.anchor
            && !self.elements.contains_key(&node)
        {
            return Err(SurfaceError::UnknownNode(node));
        }
        let id = OverlayId(self.next_overlay);
        self.next_overlay += 1;
        self.overlays.insert(id, spec.clone());
        Ok(id)
    }

    fn update_overlay(&mut self, id: OverlayId, spec: &OverlaySpec) -> Result<(), SurfaceError> {
        match self.overlays.get_mut(&id) {
            Some(existing) => {
                *existing = spec.clone();
                Ok(())
            }
            None => Err(SurfaceError::OverlayDetached(id)),
        }
    }

    fn remove_overlay(&mut self, id: OverlayId) -> Result<(), SurfaceError> {
        self.overlays
            .remove(&id)
            .map(|_| ())
            .ok_or(SurfaceError::OverlayDetached(id))
    }

    fn view_offset(&self) -> Vec2 {
        self.view_offset
    }

    fn scale(&self) -> f32 {
        self.scale
    }

    fn visible_rect(&self) -> Rect {
        let scale = if self.scale > 0.0 { self.scale } else { 1.0 };
        Rect::from_pos_size(self.view_offset, self.viewport * (1.0 / scale))
    }

    fn scroll_into_view(&mut self, region: Rect) {
        self.log.scrolls.push(region);
        let visible = self.visible_rect();
        let mut shift = Vec2::ZERO;
        if region.min.x < visible.min.x {
            shift.x = region.min.x - visible.min.x;
        } else if region.max.x > visible.max.x {
            shift.x = region.max.x - visible.max.x;
        }
        if region.min.y < visible.min.y {
            shift.y = region.min.y - visible.min.y;
        } else if region.max.y > visible.max.y {
            shift.y = region.max.y - visible.max.y;
        }
        self.view_offset += shift;
    }

    fn set_cursor(&mut self, target: Option<CursorTarget>) {
        self.cursor = target;
    }

    fn focus_node(&mut self, node: NodeId) {
        self.log.focus_requests.push(node);
        if self.elements.contains_key(&node) {
            self.focused = Some(node);
        }
    }

    fn trash_bounds(&self) -> Option<Rect> {
        self.trash
    }

    fn show_move_hint(&mut self) {
        self.hint_visible = true;
    }

    fn clear_move_hint(&mut self) {
        self.hint_visible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of_two() -> (Workspace, NodeId, NodeId) {
        let mut ws = Workspace::new(SurfaceId(1));
        let a = ws.add_statement("a", Vec2::new(0.0, 0.0));
        let b = ws.add_statement("b", Vec2::new(300.0, 300.0));
        let a_next = ws.first_port(a, PortKind::Next).unwrap();
        let b_prev = ws.first_port(b, PortKind::Previous).unwrap();
        ws.link_ports(a_next, b_prev).unwrap();
        (ws, a, b)
    }

    #[test]
    fn link_aligns_child_below_parent() {
        let (ws, a, b) = stack_of_two();
        assert_eq!(ws.parent_of(b), Some(a));
        assert_eq!(ws.position_of(b), Some(Vec2::new(0.0, STATEMENT_SIZE.y)));
        assert_eq!(ws.descendants(a), vec![a, b]);
        assert_eq!(ws.top_nodes(), vec![a]);
        assert_eq!(ws.root_of(b), a);
    }

    #[test]
    fn moving_parent_moves_children() {
        let (mut ws, a, b) = stack_of_two();
        ws.reposition(a, Vec2::new(100.0, 50.0));
        assert_eq!(ws.position_of(b), Some(Vec2::new(100.0, 90.0)));
    }

    #[test]
    fn can_connect_rejects_same_kind_and_occupied_previous() {
        let (ws, a, b) = stack_of_two();
        let a_prev = ws.first_port(a, PortKind::Previous).unwrap();
        let b_prev = ws.first_port(b, PortKind::Previous).unwrap();
        let b_next = ws.first_port(b, PortKind::Next).unwrap();
        assert!(!ws.can_connect(a_prev, b_prev, false, f32::INFINITY));
        // b's previous already holds a parent.
        let mut ws = ws;
        let c = ws.add_statement("c", Vec2::new(500.0, 0.0));
        let c_next = ws.first_port(c, PortKind::Next).unwrap();
        assert!(!ws.can_connect(c_next, b_prev, false, f32::INFINITY));
        let c_prev = ws.first_port(c, PortKind::Previous).unwrap();
        assert!(ws.can_connect(c_prev, b_next, false, f32::INFINITY));
        assert!(!ws.can_connect(c_prev, b_next, false, 10.0));
    }

    #[test]
    fn require_disconnected_rejects_occupied_neighbour() {
        let (mut ws, a, _) = stack_of_two();
        let c = ws.add_statement("c", Vec2::new(500.0, 0.0));
        let c_prev = ws.first_port(c, PortKind::Previous).unwrap();
        let a_next = ws.first_port(a, PortKind::Next).unwrap();
        assert!(ws.can_connect(c_prev, a_next, false, f32::INFINITY));
        assert!(!ws.can_connect(c_prev, a_next, true, f32::INFINITY));
    }

    #[test]
    fn connect_into_middle_reattaches_orphan_at_tail() {
        let (mut ws, a, b) = stack_of_two();
        let c = ws.add_statement("c", Vec2::new(500.0, 0.0));
        let c_prev = ws.first_port(c, PortKind::Previous).unwrap();
        let a_next = ws.first_port(a, PortKind::Next).unwrap();
        ws.connect(c_prev, a_next).unwrap();
        assert_eq!(ws.parent_of(c), Some(a));
        assert_eq!(ws.parent_of(b), Some(c));
        assert_eq!(ws.position_of(b), Some(Vec2::new(0.0, 80.0)));
    }

    #[test]
    fn connect_value_replaces_placeholder() {
        let mut ws = Workspace::new(SurfaceId(1));
        let holder = ws.add_node(
            ElementKind::Block,
            "print",
            Vec2::ZERO,
            Vec2::new(120.0, 40.0),
        );
        let input = ws.add_port(holder, PortKind::Input, Vec2::new(60.0, 20.0));
        let shadow = ws.add_node(
            ElementKind::Placeholder,
            "0",
            Vec2::ZERO,
            Vec2::new(20.0, 20.0),
        );
        let shadow_out = ws.add_port(shadow, PortKind::Output, Vec2::ZERO);
        ws.link_ports(input, shadow_out).unwrap();

        let value = ws.add_value("42", Vec2::new(300.0, 300.0));
        let out = ws.first_port(value, PortKind::Output).unwrap();
        ws.connect(out, input).unwrap();

        assert!(!ws.contains(shadow));
        assert_eq!(ws.parent_of(value), Some(holder));
        assert_eq!(ws.port_position(out), ws.port_position(input));
    }

    #[test]
    fn displaced_value_without_free_input_is_bumped() {
        let mut ws = Workspace::new(SurfaceId(1));
        let holder = ws.add_node(ElementKind::Block, "print", Vec2::ZERO, Vec2::new(120.0, 40.0));
        let input = ws.add_port(holder, PortKind::Input, Vec2::new(60.0, 20.0));
        let old = ws.add_value("old", Vec2::ZERO);
        let old_out = ws.first_port(old, PortKind::Output).unwrap();
        ws.link_ports(input, old_out).unwrap();
        let before = ws.position_of(old).unwrap();

        let new = ws.add_value("new", Vec2::new(400.0, 0.0));
        let new_out = ws.first_port(new, PortKind::Output).unwrap();
        assert_eq!(ws.orphan_reattach_port(new, old_out), None);
        ws.connect(new_out, input).unwrap();

        assert_eq!(ws.parent_of(old), None);
        assert_eq!(ws.position_of(old), Some(before + BUMP_OFFSET));
    }

    #[test]
    fn unplug_with_heal_keeps_stack_together() {
        let (mut ws, a, b) = stack_of_two();
        let c = ws.add_statement("c", Vec2::ZERO);
        let b_next = ws.first_port(b, PortKind::Next).unwrap();
        let c_prev = ws.first_port(c, PortKind::Previous).unwrap();
        ws.link_ports(b_next, c_prev).unwrap();

        ws.unplug(b, true);
        assert_eq!(ws.parent_of(b), None);
        assert_eq!(ws.parent_of(c), Some(a));
        assert_eq!(ws.position_of(c), Some(Vec2::new(0.0, 40.0)));
    }

    #[test]
    fn healing_a_free_stack_releases_its_tail() {
        let (mut ws, a, b) = stack_of_two();
        ws.unplug(a, false);
        assert_eq!(ws.parent_of(b), Some(a));
        ws.unplug(a, true);
        assert_eq!(ws.parent_of(b), None);
        assert_eq!(ws.position_of(b), Some(Vec2::new(0.0, 40.0)));
    }

    #[test]
    fn dispose_removes_subtree_and_anchored_overlays() {
        let (mut ws, a, b) = stack_of_two();
        let spec = OverlaySpec {
            shape: crate::surface::OverlayShape::Notch,
            anchor: OverlayAnchor::Node {
                node: b,
                offset: Vec2::ZERO,
            },
            size: Vec2::new(10.0, 10.0),
            port: None,
        };
        let overlay = ws.add_overlay(&spec).unwrap();
        ws.dispose(a);
        assert!(!ws.contains(a));
        assert!(!ws.contains(b));
        assert_eq!(ws.remove_overlay(overlay), Err(SurfaceError::OverlayDetached(overlay)));
    }

    #[test]
    fn materialize_respects_capacity() {
        let mut ws = Workspace::new(SurfaceId(1));
        ws.set_capacity(Some(1));
        let template = NodeTemplate::statement("x");
        let first = ws.materialize(&template, Vec2::ZERO).unwrap();
        assert_eq!(ws.element(first).unwrap().ports.len(), 2);
        assert_eq!(
            ws.materialize(&template, Vec2::ZERO),
            Err(SurfaceError::CapacityExhausted)
        );
    }

    #[test]
    fn screen_conversion_round_trips_through_view() {
        let mut ws = Workspace::new(SurfaceId(1));
        ws.set_view(Vec2::new(100.0, 50.0), 2.0, Vec2::new(800.0, 600.0));
        let screen = ws.to_screen(Vec2::new(110.0, 60.0));
        assert_eq!(screen, Vec2::new(20.0, 20.0));
        assert_eq!(ws.to_surface(screen), Vec2::new(110.0, 60.0));
        assert_eq!(ws.visible_rect().size(), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn scroll_into_view_pans_minimally() {
        let mut ws = Workspace::new(SurfaceId(1));
        ws.scroll_into_view(Rect::from_pos_size(Vec2::new(900.0, 10.0), Vec2::new(50.0, 50.0)));
        assert_eq!(ws.view_offset(), Vec2::new(150.0, 0.0));
        assert_eq!(ws.log().scrolls.len(), 1);
    }
}
