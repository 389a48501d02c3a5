//! Sticky mode: a move session that follows the pointer until a click
//! resolves it, entered through one of several trigger gestures.

pub mod handle;

pub use handle::HandleAffordance;

use crate::session::{MoveRequest, Mover};
use crate::settings::{MoverSettings, TriggerPolicy};
use crate::throttle::Throttle;
use keymove_core::{FocusTarget, Modifiers, NodeId, PortId, Rect, SurfaceId, Vec2};
use keymove_events::{ClickOutcome, Event};
use keymove_graph::{
    ConnectionHighlighter, LocalPort, NodeTemplate, Surface, all_ports, forced_candidate,
    local_ports,
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Kinds of widget that can sit inside a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    TextInput,
    Dropdown,
    Checkbox,
    Colour,
    Label,
    Image,
}

impl FieldKind {
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            FieldKind::TextInput | FieldKind::Dropdown | FieldKind::Checkbox | FieldKind::Colour
        )
    }
}

/// One step of a click target's visual ancestry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualRole {
    Field(FieldKind),
    /// The outer boundary of a node.
    Body(NodeId),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickTarget {
    /// A node on the surface. `path` runs from the element actually hit
    /// outwards.
    Node { node: NodeId, path: Vec<VisualRole> },
    Background,
    /// A palette entry that has not been placed yet.
    Palette(NodeTemplate),
    Handle(NodeId),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerEvent {
    /// Screen coordinates.
    pub position: Vec2,
    pub modifiers: Modifiers,
    pub target: ClickTarget,
    pub at: Instant,
}

impl PointerEvent {
    pub fn new(position: Vec2, target: ClickTarget) -> Self {
        Self {
            position,
            modifiers: Modifiers::NONE,
            target,
            at: Instant::now(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn at(mut self, at: Instant) -> Self {
        self.at = at;
        self
    }
}

/// How the controller dealt with a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickResolution {
    Ignored,
    /// A sticky session opened.
    Entered,
    Deleted,
    Connected,
    Dropped,
    /// A pending palette template was placed and connected.
    Inserted,
    /// Highlights are showing for a palette template.
    PendingShown,
    /// A palette template was placed free-floating.
    Materialized,
}

/// True when the click landed on an interactive field belonging to the node.
/// The walk stops at the node's own boundary.
pub fn hits_interactive_field(path: &[VisualRole]) -> bool {
    for role in path {
        match role {
            VisualRole::Field(kind) if kind.is_interactive() => return true,
            VisualRole::Body(_) => return false,
            _ => {}
        }
    }
    false
}

#[derive(Debug)]
struct StickyState {
    node: NodeId,
    /// Pointer position, in screen coordinates, when the session opened.
    origin: Vec2,
    highlight_key: Option<(PortId, PortId)>,
    dirty: bool,
    throttle: Throttle,
}

#[derive(Debug, Clone)]
struct PendingInsertion {
    template: NodeTemplate,
    /// Surface coordinates of the palette click.
    origin: Vec2,
}

#[derive(Debug)]
pub struct StickyController {
    mover: Mover,
    sticky: HashMap<SurfaceId, StickyState>,
    pending: HashMap<SurfaceId, PendingInsertion>,
    highlighters: HashMap<SurfaceId, ConnectionHighlighter>,
    focused: HashMap<SurfaceId, NodeId>,
    last_click: Option<(SurfaceId, NodeId, Instant)>,
    handle: HandleAffordance,
}

impl StickyController {
    pub fn new(mover: Mover) -> Self {
        Self {
            mover,
            sticky: HashMap::new(),
            pending: HashMap::new(),
            highlighters: HashMap::new(),
            focused: HashMap::new(),
            last_click: None,
            handle: HandleAffordance::new(),
        }
    }

    pub fn mover(&self) -> &Mover {
        &self.mover
    }

    pub fn mover_mut(&mut self) -> &mut Mover {
        &mut self.mover
    }

    pub fn settings(&self) -> &MoverSettings {
        self.mover.settings()
    }

    /// Switch trigger policy. A grip left over from the handle policy is
    /// removed from `surface` straight away and from any other surface on its
    /// next event.
    pub fn set_trigger_policy(&mut self, surface: &mut dyn Surface, policy: TriggerPolicy) {
        info!("Sticky trigger policy set to {:?}", policy);
        self.mover.settings_mut().trigger_policy = policy;
        if policy != TriggerPolicy::HandleActivate {
            self.handle.hide(surface);
        }
    }

    pub fn set_follow_pointer(&mut self, follow: bool) {
        self.mover.settings_mut().follow_pointer = follow;
    }

    pub fn set_highlight_connections(&mut self, highlight: bool) {
        self.mover.settings_mut().highlight_connections = highlight;
    }

    pub fn is_sticky(&self, surface: SurfaceId) -> bool {
        self.sticky.contains_key(&surface)
    }

    pub fn sticky_node(&self, surface: SurfaceId) -> Option<NodeId> {
        self.sticky.get(&surface).map(|s| s.node)
    }

    pub fn pending_insertion(&self, surface: SurfaceId) -> Option<&NodeTemplate> {
        self.pending.get(&surface).map(|p| &p.template)
    }

    pub fn highlighter(&self, surface: SurfaceId) -> Option<&ConnectionHighlighter> {
        self.highlighters.get(&surface)
    }

    pub fn handle(&self) -> &HandleAffordance {
        &self.handle
    }

    /// Open a sticky session on `node`. An ordinary session is aborted first;
    /// an existing sticky session is committed first.
    pub fn enter(&mut self, surface: &mut dyn Surface, node: NodeId, pointer: Vec2) -> bool {
        self.enter_at(surface, node, pointer, Instant::now())
    }

    /// [`enter`](Self::enter) with an explicit clock reading; the highlight
    /// refresh throttle starts counting from `now`.
    pub fn enter_at(
        &mut self,
        surface: &mut dyn Surface,
        node: NodeId,
        pointer: Vec2,
        now: Instant,
    ) -> bool {
        self.open(surface, MoveRequest::existing(node).sticky(), pointer, now)
    }

    /// Start an ordinary (non-sticky) session. A pending palette insertion on
    /// the surface is cancelled first.
    pub fn start(&mut self, surface: &mut dyn Surface, request: MoveRequest) -> bool {
        self.sync(surface);
        if self.is_sticky(surface.id()) {
            debug!("Committing the open sticky session before starting another");
            self.finish(surface);
        }
        self.cancel_pending(surface);
        self.mover.start(surface, request)
    }

    /// Commit the sticky session where it stands.
    pub fn exit(&mut self, surface: &mut dyn Surface) -> bool {
        self.sync(surface);
        if !self.is_sticky(surface.id()) {
            return false;
        }
        self.finish(surface)
    }

    /// Externally driven entry and exit. Returns whether a sticky session is
    /// open afterwards.
    pub fn toggle(&mut self, surface: &mut dyn Surface, node: NodeId, pointer: Vec2) -> bool {
        self.sync(surface);
        if self.is_sticky(surface.id()) {
            self.exit(surface);
            false
        } else {
            self.enter(surface, node, pointer)
        }
    }

    /// Commit whatever session is open on the surface.
    pub fn finish(&mut self, surface: &mut dyn Surface) -> bool {
        self.close_sticky(surface);
        self.mover.finish(surface)
    }

    /// Abort whatever session is open on the surface.
    pub fn abort(&mut self, surface: &mut dyn Surface) -> bool {
        self.close_sticky(surface);
        self.mover.abort(surface)
    }

    pub fn on_pointer_move(&mut self, surface: &mut dyn Surface, position: Vec2, now: Instant) {
        self.sync(surface);
        let id = surface.id();
        if !self.settings().follow_pointer {
            return;
        }
        let Some(origin) = self.sticky.get(&id).map(|s| s.origin) else {
            return;
        };
        let delta = surface.to_surface(position) - surface.to_surface(origin);
        if let Err(e) = self.mover.drag_to(surface, delta) {
            warn!("Pointer follow failed: {}", e);
            return;
        }

        let key = self.mover.candidate(id).map(|c| c.key());
        let due = match self.sticky.get_mut(&id) {
            Some(state) => {
                if key != state.highlight_key {
                    state.dirty = true;
                }
                state.dirty && state.throttle.ready(now)
            }
            None => false,
        };
        if due {
            self.refresh_highlights(surface);
        }
    }

    /// Host display-refresh tick: flushes a throttled highlight refresh and
    /// the deferred render pass.
    pub fn on_frame(&mut self, surface: &mut dyn Surface, now: Instant) -> usize {
        self.sync(surface);
        let id = surface.id();
        let key = self.mover.candidate(id).map(|c| c.key());
        let due = self.sticky.get_mut(&id).is_some_and(|state| {
            if key != state.highlight_key {
                state.dirty = true;
            }
            state.dirty && state.throttle.ready(now)
        });
        if due {
            self.refresh_highlights(surface);
        }
        self.mover.on_frame(surface)
    }

    pub fn on_surface_scrolled(&mut self, surface: &mut dyn Surface) {
        if let Some(highlighter) = self.highlighters.get_mut(&surface.id()) {
            highlighter.on_surface_scrolled(surface);
        }
    }

    /// Keyboard focus changed. Returns whether an open session was committed
    /// because of it.
    pub fn on_focus_changed(&mut self, surface: &mut dyn Surface, target: FocusTarget) -> bool {
        let id = surface.id();
        match target {
            FocusTarget::Node(node) => self.note_focus(surface, node),
            FocusTarget::Background | FocusTarget::Outside => {
                self.focused.remove(&id);
                self.handle.hide(surface);
            }
        }
        let finished = self.mover.on_focus_lost(surface, target);
        if finished {
            self.close_sticky(surface);
        }
        finished
    }

    pub fn on_click(&mut self, surface: &mut dyn Surface, event: PointerEvent) -> ClickResolution {
        self.sync(surface);
        self.drop_stale_handle(surface);
        let id = surface.id();
        if self.pending.contains_key(&id)
            && let Some(resolution) = self.resolve_pending(surface, &event)
        {
            return resolution;
        }
        if self.is_sticky(id) {
            return self.resolve_sticky_click(surface, &event);
        }

        match event.target {
            ClickTarget::Palette(template) => {
                self.on_palette_click(surface, template, event.position, event.at)
            }
            ClickTarget::Handle(node) => self.on_handle_click(surface, node, event.position),
            ClickTarget::Node { node, path } => {
                self.on_node_click(surface, node, &path, event.modifiers, event.position, event.at)
            }
            ClickTarget::Background | ClickTarget::Other => {
                self.last_click = None;
                ClickResolution::Ignored
            }
        }
    }

    pub fn on_handle_click(
        &mut self,
        surface: &mut dyn Surface,
        node: NodeId,
        position: Vec2,
    ) -> ClickResolution {
        if self.enter(surface, node, position) {
            ClickResolution::Entered
        } else {
            ClickResolution::Ignored
        }
    }

    fn on_node_click(
        &mut self,
        surface: &mut dyn Surface,
        node: NodeId,
        path: &[VisualRole],
        modifiers: Modifiers,
        position: Vec2,
        at: Instant,
    ) -> ClickResolution {
        let id = surface.id();
        if hits_interactive_field(path) {
            debug!("Click on a field of {}; not a move trigger", node);
            return ClickResolution::Ignored;
        }

        let settings = self.settings();
        let triggered = match settings.trigger_policy {
            TriggerPolicy::DoubleActivate => {
                let window = settings.double_activate_window();
                self.last_click.is_some_and(|(s, n, t)| {
                    s == id && n == node && at.saturating_duration_since(t) <= window
                })
            }
            TriggerPolicy::ModifierActivate => modifiers.contains(settings.trigger_modifier),
            TriggerPolicy::FocusActivate => self.focused.get(&id) == Some(&node),
            TriggerPolicy::HandleActivate => self.handle.hit(surface, position) == Some(node),
            TriggerPolicy::Toggle => false,
        };

        if triggered {
            self.last_click = None;
            if self.enter_at(surface, node, position, at) {
                return ClickResolution::Entered;
            }
            return ClickResolution::Ignored;
        }
        self.last_click = Some((id, node, at));
        self.note_focus(surface, node);
        ClickResolution::Ignored
    }

    fn on_palette_click(
        &mut self,
        surface: &mut dyn Surface,
        template: NodeTemplate,
        position: Vec2,
        at: Instant,
    ) -> ClickResolution {
        let id = surface.id();
        let origin = surface.to_surface(position);

        if !self.settings().highlight_connections {
            let node = match surface.materialize(&template, origin) {
                Ok(node) => node,
                Err(e) => {
                    warn!("Could not place {}: {}", template.label, e);
                    return ClickResolution::Ignored;
                }
            };
            if self.open(surface, MoveRequest::insertion(node).sticky(), position, at) {
                return ClickResolution::Entered;
            }
            return ClickResolution::Materialized;
        }

        let targets = all_ports(surface);
        let locals: Vec<LocalPort> = template
            .ports
            .iter()
            .cloned()
            .map(LocalPort::Template)
            .collect();
        let pairings =
            ConnectionHighlighter::valid_pairings(surface, None, &targets, &locals, origin);
        if pairings.is_empty() {
            return match surface.materialize(&template, origin) {
                Ok(node) => {
                    debug!("No targets for {}; placed free-floating", template.label);
                    self.mover.schedule_render(id, node);
                    ClickResolution::Materialized
                }
                Err(e) => {
                    warn!("Could not place {}: {}", template.label, e);
                    ClickResolution::Ignored
                }
            };
        }

        let bus = self.mover.event_bus().clone();
        let limit = self.settings().highlight_limit;
        let highlighter = self
            .highlighters
            .entry(id)
            .or_insert_with(|| ConnectionHighlighter::with_limit(limit));
        let shown = highlighter.highlight_valid(surface, None, &targets, &locals, origin, move |port| {
            bus.publish(Event::HighlightActivated { surface: id, port })
        });
        self.pending.insert(id, PendingInsertion { template, origin });
        self.mover
            .event_bus()
            .publish(Event::PendingInsertionShown { surface: id, targets: shown });
        ClickResolution::PendingShown
    }

    /// A click while a palette template is pending. Returns `None` when the
    /// click cancelled the insertion and should be handled normally.
    fn resolve_pending(
        &mut self,
        surface: &mut dyn Surface,
        event: &PointerEvent,
    ) -> Option<ClickResolution> {
        let id = surface.id();
        let pending = self.pending.remove(&id)?;
        let hit = match self.highlighters.get_mut(&id) {
            Some(highlighter) => {
                let hit = highlighter.activate_at(surface, event.position);
                highlighter.clear_highlights(surface);
                hit
            }
            None => None,
        };

        let Some(neighbour) = hit else {
            debug!("Pending insertion of {} cancelled", pending.template.label);
            self.mover
                .event_bus()
                .publish(Event::PendingInsertionCancelled { surface: id });
            return None;
        };

        let node = match surface.materialize(&pending.template, pending.origin) {
            Ok(node) => node,
            Err(e) => {
                warn!("Could not place {}: {}", pending.template.label, e);
                return Some(ClickResolution::Ignored);
            }
        };
        let locals = local_ports(surface, node);
        let connected = match forced_candidate(surface, &locals, neighbour) {
            Some(candidate) => match surface.connect(candidate.local, neighbour) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to connect new {} at {}: {}", node, neighbour, e);
                    false
                }
            },
            None => false,
        };
        self.mover.schedule_render(id, node);
        if !connected {
            return Some(ClickResolution::Materialized);
        }
        self.publish_resolved(id, Some(node), ClickOutcome::Inserted);
        Some(ClickResolution::Inserted)
    }

    fn resolve_sticky_click(
        &mut self,
        surface: &mut dyn Surface,
        event: &PointerEvent,
    ) -> ClickResolution {
        let id = surface.id();
        let Some(node) = self.sticky_node(id) else {
            return ClickResolution::Ignored;
        };
        let point = event.position;

        if surface.trash_bounds().is_some_and(|trash| trash.contains(point)) {
            if surface.element(node).is_some_and(|e| e.deletable) {
                self.abort(surface);
                surface.unplug(node, true);
                surface.dispose(node);
                info!("Deleted {} by dropping it on the trash", node);
                self.publish_resolved(id, Some(node), ClickOutcome::Deleted);
                return ClickResolution::Deleted;
            }
            debug!("{} is not deletable; resolving the trash click as a drop", node);
        }

        let hit = match self.highlighters.get_mut(&id) {
            Some(highlighter) => {
                let hit = highlighter.activate_at(surface, point);
                highlighter.clear_highlights(surface);
                hit
            }
            None => None,
        };
        self.close_sticky(surface);

        let outcome = if let Some(neighbour) = hit {
            match self.mover.connect_to(surface, neighbour) {
                Ok(true) => ClickOutcome::Connected,
                Ok(false) => {
                    self.mover.clear_candidate(surface);
                    self.mover.finish(surface);
                    ClickOutcome::Dropped
                }
                Err(e) => {
                    warn!("Click-to-connect failed: {}", e);
                    return ClickResolution::Ignored;
                }
            }
        } else if self.mover.candidate(id).is_some() {
            self.mover.finish(surface);
            ClickOutcome::Connected
        } else if screen_bounds(surface, node).is_some_and(|b| b.contains(point)) {
            self.mover.finish(surface);
            ClickOutcome::Dropped
        } else {
            let target = surface.to_surface(point);
            let start = self.mover.session(id).map(|s| s.start_position);
            if let Some(start) = start
                && let Err(e) = self.mover.drag_to(surface, target - start)
            {
                warn!("Could not move {} to the click: {}", node, e);
            }
            self.mover.clear_candidate(surface);
            self.mover.finish(surface);
            ClickOutcome::Dropped
        };

        self.publish_resolved(id, Some(node), outcome);
        match outcome {
            ClickOutcome::Connected => ClickResolution::Connected,
            ClickOutcome::Dropped => ClickResolution::Dropped,
            ClickOutcome::Deleted => ClickResolution::Deleted,
            ClickOutcome::Inserted => ClickResolution::Inserted,
        }
    }

    fn open(
        &mut self,
        surface: &mut dyn Surface,
        request: MoveRequest,
        pointer: Vec2,
        now: Instant,
    ) -> bool {
        self.sync(surface);
        let id = surface.id();
        match self.mover.session(id).map(|s| s.sticky) {
            Some(true) => {
                debug!("Committing the open sticky session before entering another");
                self.finish(surface);
            }
            Some(false) => {
                debug!("Aborting the ordinary session before entering sticky mode");
                self.abort(surface);
            }
            None => {}
        }
        self.cancel_pending(surface);

        let node = request.node;
        if !self.mover.start(surface, request) {
            return false;
        }
        let mut throttle = Throttle::new(self.settings().highlight_refresh_interval());
        // The initial refresh below counts as the first pass.
        throttle.ready(now);
        self.sticky.insert(
            id,
            StickyState {
                node,
                origin: pointer,
                highlight_key: None,
                dirty: true,
                throttle,
            },
        );
        self.mover
            .event_bus()
            .publish(Event::StickyEntered { surface: id, node });
        info!("Entered sticky move of {} on {}", node, id);
        self.refresh_highlights(surface);
        true
    }

    fn refresh_highlights(&mut self, surface: &mut dyn Surface) {
        let id = surface.id();
        let Some(node) = self.sticky_node(id) else {
            return;
        };
        let key = self.mover.candidate(id).map(|c| c.key());
        if let Some(state) = self.sticky.get_mut(&id) {
            state.highlight_key = key;
            state.dirty = false;
        }

        let settings = self.mover.settings();
        let limit = settings.highlight_limit;
        let highlighter = self
            .highlighters
            .entry(id)
            .or_insert_with(|| ConnectionHighlighter::with_limit(limit));
        if !settings.highlight_connections {
            highlighter.clear_highlights(surface);
            return;
        }
        let targets = all_ports(surface);
        let locals: Vec<LocalPort> = local_ports(surface, node)
            .into_iter()
            .map(LocalPort::Existing)
            .collect();
        let bus = self.mover.event_bus().clone();
        highlighter.highlight_valid(surface, Some(node), &targets, &locals, Vec2::ZERO, move |port| {
            bus.publish(Event::HighlightActivated { surface: id, port })
        });
    }

    fn note_focus(&mut self, surface: &mut dyn Surface, node: NodeId) {
        self.focused.insert(surface.id(), node);
        if self.settings().trigger_policy == TriggerPolicy::HandleActivate
            && !self.is_sticky(surface.id())
        {
            self.handle.show(surface, node, self.mover.settings());
        } else {
            self.handle.hide(surface);
        }
    }

    fn drop_stale_handle(&mut self, surface: &mut dyn Surface) {
        if self.settings().trigger_policy != TriggerPolicy::HandleActivate {
            self.handle.hide(surface);
        }
    }

    fn cancel_pending(&mut self, surface: &mut dyn Surface) {
        let id = surface.id();
        if self.pending.remove(&id).is_none() {
            return;
        }
        if let Some(highlighter) = self.highlighters.get_mut(&id) {
            highlighter.clear_highlights(surface);
        }
        self.mover
            .event_bus()
            .publish(Event::PendingInsertionCancelled { surface: id });
    }

    fn close_sticky(&mut self, surface: &mut dyn Surface) {
        let id = surface.id();
        if self.sticky.remove(&id).is_some()
            && let Some(highlighter) = self.highlighters.get_mut(&id)
        {
            highlighter.clear_highlights(surface);
        }
    }

    /// Drop sticky state whose session was closed behind the controller's
    /// back (a keyboard commit, for instance).
    fn sync(&mut self, surface: &mut dyn Surface) {
        let id = surface.id();
        let Some(node) = self.sticky_node(id) else {
            return;
        };
        let live = self
            .mover
            .session(id)
            .is_some_and(|s| s.sticky && s.node == node);
        if !live {
            self.close_sticky(surface);
        }
    }

    fn publish_resolved(&self, surface: SurfaceId, node: Option<NodeId>, outcome: ClickOutcome) {
        self.mover.event_bus().publish(Event::StickyResolved {
            surface,
            node,
            outcome,
        });
    }
}

fn screen_bounds(surface: &dyn Surface, node: NodeId) -> Option<Rect> {
    let bounds = surface.node_bounds(node)?;
    Some(Rect::from_min_max(
        surface.to_screen(bounds.min),
        surface.to_screen(bounds.max),
    ))
}
