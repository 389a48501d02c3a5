//! Move sessions: at most one per surface, driven by keyboard steps or pointer
//! deltas, closed exactly once by `finish` or `abort`.

use crate::drag_strategy::{DragStrategy, KeyboardDragStrategy, StrategyTable};
use crate::render_queue::RenderQueue;
use crate::settings::MoverSettings;
use crate::shortcuts::{Shortcut, ShortcutGuard, ShortcutRegistry, commit_shortcut_name};
use keymove_core::{
    Direction, ElementKind, FocusTarget, MoveError, MoveKind, NodeId, PortId, SurfaceId, Vec2,
};
use keymove_events::telemetry;
use keymove_events::{DragInput, DragSignal, Event, EventBus};
use keymove_graph::{
    Candidate, CursorTarget, Surface, forced_candidate, local_ports, preview_for,
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Committed { connected: bool },
    Aborted,
}

pub type CompletionCallback = Box<dyn FnOnce(MoveOutcome)>;

/// What losing keyboard focus does to an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurPolicy {
    /// Any focus loss commits the move.
    AutoFinish,
    /// Focus moving to the surface background is left for the click handler.
    DeferToClick,
}

/// Parameters for [`Mover::start`].
pub struct MoveRequest {
    pub node: NodeId,
    pub kind: MoveKind,
    pub anchor: Option<PortId>,
    pub sticky: bool,
    pub on_done: Option<CompletionCallback>,
}

impl MoveRequest {
    pub fn existing(node: NodeId) -> Self {
        Self {
            node,
            kind: MoveKind::Existing,
            anchor: None,
            sticky: false,
            on_done: None,
        }
    }

    pub fn insertion(node: NodeId) -> Self {
        Self {
            kind: MoveKind::Insertion,
            ..Self::existing(node)
        }
    }

    /// Neighbour port the inserted node was placed against.
    pub fn anchored(mut self, port: PortId) -> Self {
        self.anchor = Some(port);
        self
    }

    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }

    pub fn on_done(mut self, callback: impl FnOnce(MoveOutcome) + 'static) -> Self {
        self.on_done = Some(Box::new(callback));
        self
    }
}

/// The record of one in-progress relocation.
pub struct MoveSession {
    pub node: NodeId,
    pub element_kind: ElementKind,
    pub kind: MoveKind,
    pub sticky: bool,
    pub start_position: Vec2,
    pub start_attachment: Option<(PortId, PortId)>,
    pub total_delta: Vec2,
    pub candidate: Option<Candidate>,
    pub anchor: Option<PortId>,
    /// Neighbour of the most recent candidate, kept after it is cleared.
    pub last_neighbour: Option<PortId>,
    pub blur_policy: BlurPolicy,
    correlation_id: String,
    started_at: Instant,
    shortcut: Option<ShortcutGuard>,
    displaced_strategy: Option<Box<dyn DragStrategy>>,
    on_done: Option<CompletionCallback>,
}

impl std::fmt::Debug for MoveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveSession")
            .field("node", &self.node)
            .field("element_kind", &self.element_kind)
            .field("kind", &self.kind)
            .field("sticky", &self.sticky)
            .field("start_position", &self.start_position)
            .field("total_delta", &self.total_delta)
            .field("candidate", &self.candidate)
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

impl MoveSession {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

pub struct Mover {
    sessions: HashMap<SurfaceId, MoveSession>,
    strategies: StrategyTable,
    render_queue: RenderQueue,
    shortcuts: ShortcutRegistry,
    event_bus: EventBus,
    settings: MoverSettings,
}

impl std::fmt::Debug for Mover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mover")
            .field("sessions", &self.sessions)
            .field("strategies", &self.strategies)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Mover {
    pub fn new(event_bus: EventBus, shortcuts: ShortcutRegistry, settings: MoverSettings) -> Self {
        Self {
            sessions: HashMap::new(),
            strategies: StrategyTable::new(),
            render_queue: RenderQueue::new(),
            shortcuts,
            event_bus,
            settings,
        }
    }

    pub fn settings(&self) -> &MoverSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut MoverSettings {
        &mut self.settings
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn shortcuts(&self) -> &ShortcutRegistry {
        &self.shortcuts
    }

    pub fn strategies(&self) -> &StrategyTable {
        &self.strategies
    }

    pub fn strategies_mut(&mut self) -> &mut StrategyTable {
        &mut self.strategies
    }

    pub fn is_moving(&self, surface: SurfaceId) -> bool {
        self.sessions.contains_key(&surface)
    }

    pub fn session(&self, surface: SurfaceId) -> Option<&MoveSession> {
        self.sessions.get(&surface)
    }

    pub fn candidate(&self, surface: SurfaceId) -> Option<Candidate> {
        self.sessions.get(&surface).and_then(|s| s.candidate)
    }

    pub fn can_start(&self, surface: &dyn Surface, node: NodeId) -> bool {
        surface.is_editable()
            && !self.is_moving(surface.id())
            && surface
                .element(node)
                .is_some_and(|e| e.movable && !e.kind.is_transient())
    }

    /// Open a session. If one is already open on the surface it is aborted and
    /// `false` is returned.
    pub fn start(&mut self, surface: &mut dyn Surface, request: MoveRequest) -> bool {
        let surface_id = surface.id();
        if self.is_moving(surface_id) {
            warn!("A move is already in progress on {}; aborting it", surface_id);
            self.abort(surface);
            return false;
        }
        if !self.can_start(surface, request.node) {
            debug!("Node {} cannot be moved on {}", request.node, surface_id);
            return false;
        }
        let Some(element) = surface.element(request.node) else {
            return false;
        };
        let node = request.node;
        let element_kind = element.kind;
        let start_position = element.position;
        let start_attachment = surface.attachment(node);

        self.publish_drag(
            surface_id,
            DragSignal::Start {
                node,
                position: surface.to_screen(start_position),
            },
        );
        surface.unplug(node, false);

        let mut strategy: Box<dyn DragStrategy> = Box::new(KeyboardDragStrategy::new(
            self.settings.snap_radius,
            self.settings.connection_preference,
        ));
        strategy.start(surface, node);

        let locals = local_ports(surface, node);
        let initial = match (request.kind, start_attachment, request.anchor) {
            (MoveKind::Existing, Some((local, neighbour)), _) => {
                measured(surface, local, neighbour)
            }
            (MoveKind::Insertion, _, Some(anchor)) => forced_candidate(surface, &locals, anchor),
            _ => None,
        };
        strategy.resume_from(initial.map(|c| c.neighbour));
        let displaced_strategy = self.strategies.install(node, strategy);

        let shortcut = self.register_commit_shortcut(surface_id);
        surface.show_move_hint();

        let correlation_id = telemetry::new_correlation_id();
        telemetry::session_start(surface_id, node, &correlation_id, request.sticky);

        self.sessions.insert(
            surface_id,
            MoveSession {
                node,
                element_kind,
                kind: request.kind,
                sticky: request.sticky,
                start_position,
                start_attachment,
                total_delta: Vec2::ZERO,
                candidate: None,
                anchor: request.anchor,
                last_neighbour: None,
                blur_policy: if request.sticky {
                    BlurPolicy::DeferToClick
                } else {
                    BlurPolicy::AutoFinish
                },
                correlation_id,
                started_at: Instant::now(),
                shortcut,
                displaced_strategy,
                on_done: request.on_done,
            },
        );
        self.set_candidate(surface, initial);

        self.event_bus.publish(Event::MoveStarted {
            surface: surface_id,
            node,
            kind: request.kind,
            sticky: request.sticky,
        });
        info!("Started {:?} move of {} on {}", request.kind, node, surface_id);
        true
    }

    /// Commit the open session, connecting at the current candidate if any.
    /// Returns `false` when there is nothing to finish.
    pub fn finish(&mut self, surface: &mut dyn Surface) -> bool {
        let surface_id = surface.id();
        let Some(mut session) = self.sessions.remove(&surface_id) else {
            return false;
        };
        drop(session.shortcut.take());
        surface.clear_move_hint();
        surface.hide_preview();
        self.restore_strategy(&mut session);

        let position = surface
            .element(session.node)
            .map(|e| e.position)
            .unwrap_or(session.start_position);
        self.publish_drag(
            surface_id,
            DragSignal::End {
                node: session.node,
                position: surface.to_screen(position),
                delta: session.total_delta,
            },
        );

        let connected = match session.candidate {
            Some(candidate) => match surface.connect(candidate.local, candidate.neighbour) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to connect {} at {}: {}", session.node, candidate.neighbour, e);
                    false
                }
            },
            None => false,
        };

        self.event_bus.publish(Event::MoveFinished {
            surface: surface_id,
            node: session.node,
            connected,
        });
        telemetry::session_end(
            surface_id,
            session.node,
            &session.correlation_id,
            true,
            session.started_at.elapsed().as_millis(),
        );
        if let Some(on_done) = session.on_done.take() {
            on_done(MoveOutcome::Committed { connected });
        }
        self.render_queue.schedule(surface_id, session.node);
        info!("Finished move of {} (connected: {})", session.node, connected);
        true
    }

    /// Cancel the open session. An existing node returns to where it was and
    /// is re-attached; an inserted node is deleted and the cursor is left on
    /// the neighbour it was last offered.
    pub fn abort(&mut self, surface: &mut dyn Surface) -> bool {
        let surface_id = surface.id();
        let Some(mut session) = self.sessions.remove(&surface_id) else {
            return false;
        };
        drop(session.shortcut.take());
        surface.clear_move_hint();
        surface.hide_preview();
        self.restore_strategy(&mut session);
        session.candidate = None;

        self.publish_drag(
            surface_id,
            DragSignal::End {
                node: session.node,
                position: surface.to_screen(session.start_position),
                delta: Vec2::ZERO,
            },
        );

        match session.kind {
            MoveKind::Existing => {
                surface.reposition(session.node, session.start_position);
                if let Some((local, neighbour)) = session.start_attachment
                    && let Err(e) = surface.connect(local, neighbour)
                {
                    warn!("Failed to restore attachment of {}: {}", session.node, e);
                }
                self.render_queue.schedule(surface_id, session.node);
            }
            MoveKind::Insertion => {
                surface.dispose(session.node);
                if let Some(port) = session.last_neighbour.or(session.anchor) {
                    surface.set_cursor(Some(CursorTarget::Port(port)));
                }
            }
        }

        self.event_bus.publish(Event::MoveAborted {
            surface: surface_id,
            node: session.node,
        });
        telemetry::session_end(
            surface_id,
            session.node,
            &session.correlation_id,
            false,
            session.started_at.elapsed().as_millis(),
        );
        if let Some(on_done) = session.on_done.take() {
            on_done(MoveOutcome::Aborted);
        }
        info!("Aborted move of {}", session.node);
        true
    }

    /// One directional step to the next legal attachment point. Nodes without
    /// ports (comments) take an unconstrained step instead.
    pub fn move_constrained(
        &mut self,
        surface: &mut dyn Surface,
        direction: Direction,
    ) -> Result<(), MoveError> {
        let surface_id = surface.id();
        let (node, current) = {
            let session = self
                .sessions
                .get(&surface_id)
                .ok_or(MoveError::NoActiveSession(surface_id))?;
            (session.node, session.candidate)
        };
        let locals = local_ports(surface, node);
        if locals.is_empty() {
            return self.move_unconstrained(surface, direction);
        }

        let input = DragInput::Constrained(direction);
        let next = self
            .strategies
            .get_mut(node)
            .and_then(|s| s.update(surface, &locals, current.as_ref(), input));
        match next {
            Some(candidate) => {
                // Park the node so its port sits on the chosen neighbour.
                if let (Some(from), Some(to), Some(position)) = (
                    surface.port_position(candidate.local),
                    surface.port_position(candidate.neighbour),
                    surface.element(node).map(|e| e.position),
                ) {
                    let shift = to - from;
                    surface.reposition(node, position + shift);
                    self.add_delta(surface_id, shift);
                }
                let parked = Candidate {
                    distance: 0.0,
                    ..candidate
                };
                self.set_candidate(surface, Some(parked));
            }
            None => debug!("No legal connection {:?} of {}", direction, node),
        }
        self.after_step(surface, node, input);
        Ok(())
    }

    /// One fixed-size step that ignores ports; the candidate is re-evaluated
    /// with the free policy at the new position.
    pub fn move_unconstrained(
        &mut self,
        surface: &mut dyn Surface,
        direction: Direction,
    ) -> Result<(), MoveError> {
        let surface_id = surface.id();
        let (node, current) = {
            let session = self
                .sessions
                .get(&surface_id)
                .ok_or(MoveError::NoActiveSession(surface_id))?;
            (session.node, session.candidate)
        };
        let position = surface
            .element(node)
            .map(|e| e.position)
            .ok_or(MoveError::UnknownNode(node))?;
        let step = direction.unit() * self.settings.unconstrained_step;
        surface.reposition(node, position + step);
        self.add_delta(surface_id, step);

        let input = DragInput::Unconstrained(direction);
        self.resolve_free(surface, node, current, input);
        self.after_step(surface, node, input);
        Ok(())
    }

    /// Pointer-style update: place the node at its start position plus
    /// `total_delta` and re-run the free search.
    pub fn drag_to(&mut self, surface: &mut dyn Surface, total_delta: Vec2) -> Result<(), MoveError> {
        let surface_id = surface.id();
        let (node, current, start) = {
            let session = self
                .sessions
                .get_mut(&surface_id)
                .ok_or(MoveError::NoActiveSession(surface_id))?;
            session.total_delta = total_delta;
            (session.node, session.candidate, session.start_position)
        };
        surface.reposition(node, start + total_delta);
        self.resolve_free(surface, node, current, DragInput::Pointer);
        let position = surface.to_screen(start + total_delta);
        self.publish_drag(
            surface_id,
            DragSignal::Move {
                node,
                position,
                delta: total_delta,
                input: DragInput::Pointer,
            },
        );
        Ok(())
    }

    /// Click-to-complete: force a connection to `neighbour` and commit.
    /// Returns `Ok(false)` when the moving stack has no compatible port.
    pub fn connect_to(
        &mut self,
        surface: &mut dyn Surface,
        neighbour: PortId,
    ) -> Result<bool, MoveError> {
        let surface_id = surface.id();
        let node = self
            .sessions
            .get(&surface_id)
            .map(|s| s.node)
            .ok_or(MoveError::NoActiveSession(surface_id))?;
        let locals = local_ports(surface, node);
        let Some(candidate) = forced_candidate(surface, &locals, neighbour) else {
            return Ok(false);
        };
        self.set_candidate(surface, Some(candidate));
        Ok(self.finish(surface))
    }

    /// Drop the current candidate so that finishing leaves the node floating.
    pub fn clear_candidate(&mut self, surface: &mut dyn Surface) {
        if self.is_moving(surface.id()) {
            self.set_candidate(surface, None);
        }
    }

    /// Keyboard focus left the moving node. Returns whether the session was
    /// finished as a result.
    pub fn on_focus_lost(&mut self, surface: &mut dyn Surface, target: FocusTarget) -> bool {
        let Some(session) = self.sessions.get(&surface.id()) else {
            return false;
        };
        if target == FocusTarget::Node(session.node) {
            return false;
        }
        if session.blur_policy == BlurPolicy::DeferToClick && target == FocusTarget::Background {
            debug!("Focus moved to background during sticky move; waiting for click");
            return false;
        }
        self.finish(surface)
    }

    /// Run deferred render work for the surface. Hosts call this once per
    /// display frame.
    pub fn on_frame(&mut self, surface: &mut dyn Surface) -> usize {
        let surface_id = surface.id();
        let rendered = self.render_queue.run(surface);
        for node in &rendered {
            self.event_bus.publish(Event::RenderPassCompleted {
                surface: surface_id,
                node: *node,
            });
        }
        rendered.len()
    }

    /// Queue `node` for the next deferred render pass.
    pub fn schedule_render(&mut self, surface: SurfaceId, node: NodeId) {
        self.render_queue.schedule(surface, node);
    }

    pub fn has_pending_render(&self, surface: SurfaceId) -> bool {
        self.render_queue.is_pending(surface)
    }

    fn resolve_free(
        &mut self,
        surface: &mut dyn Surface,
        node: NodeId,
        current: Option<Candidate>,
        input: DragInput,
    ) {
        let locals = local_ports(surface, node);
        let next = self
            .strategies
            .get_mut(node)
            .and_then(|s| s.update(surface, &locals, current.as_ref(), input));
        self.set_candidate(surface, next);
    }

    fn after_step(&mut self, surface: &mut dyn Surface, node: NodeId, input: DragInput) {
        let surface_id = surface.id();
        let Some(session) = self.sessions.get(&surface_id) else {
            return;
        };
        let delta = session.total_delta;
        let position = surface
            .element(node)
            .map(|e| surface.to_screen(e.position))
            .unwrap_or_default();
        self.publish_drag(
            surface_id,
            DragSignal::Move {
                node,
                position,
                delta,
                input,
            },
        );
        let root = surface.root_of(node);
        surface.render(root);
        if let Some(bounds) = surface.node_bounds(node) {
            surface.scroll_into_view(bounds);
        }
    }

    fn add_delta(&mut self, surface: SurfaceId, delta: Vec2) {
        if let Some(session) = self.sessions.get_mut(&surface) {
            session.total_delta += delta;
        }
    }

    fn set_candidate(&mut self, surface: &mut dyn Surface, candidate: Option<Candidate>) {
        let surface_id = surface.id();
        let Some(session) = self.sessions.get_mut(&surface_id) else {
            return;
        };
        let changed = session.candidate.map(|c| c.key()) != candidate.map(|c| c.key());
        session.candidate = candidate;
        if let Some(c) = &candidate {
            session.last_neighbour = Some(c.neighbour);
        }
        let node = session.node;

        if !changed {
            return;
        }
        match &candidate {
            Some(c) => {
                let preview = preview_for(surface, node, c);
                surface.show_preview(&preview);
            }
            None => surface.hide_preview(),
        }
        self.event_bus.publish(Event::CandidateChanged {
            surface: surface_id,
            local: candidate.map(|c| c.local),
            neighbour: candidate.map(|c| c.neighbour),
        });
    }

    fn restore_strategy(&mut self, session: &mut MoveSession) {
        if let Some(strategy) = self.strategies.get_mut(session.node) {
            strategy.end();
        }
        let displaced = session.displaced_strategy.take();
        self.strategies.restore(session.node, displaced);
    }

    fn register_commit_shortcut(&self, surface: SurfaceId) -> Option<ShortcutGuard> {
        let combos = self.shortcuts.shadowable_combos();
        let shortcut = Shortcut::new(commit_shortcut_name(surface), combos);
        match self.shortcuts.register_scoped(shortcut) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("Could not register commit shortcut: {}", e);
                None
            }
        }
    }

    fn publish_drag(&self, surface: SurfaceId, signal: DragSignal) {
        self.event_bus.publish(Event::Drag { surface, signal });
    }
}

fn measured(surface: &dyn Surface, local: PortId, neighbour: PortId) -> Option<Candidate> {
    let from = surface.port_position(local)?;
    let to = surface.port_position(neighbour)?;
    surface
        .can_connect(local, neighbour, false, f32::INFINITY)
        .then(|| Candidate {
            local,
            neighbour,
            distance: from.distance(to),
        })
}
