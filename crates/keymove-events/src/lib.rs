use crossbeam_channel::{unbounded, Receiver, Sender};
use keymove_core::{Direction, MoveKind, NodeId, PortId, SurfaceId, Vec2};
use serde::{Deserialize, Serialize};

pub mod telemetry;

/// Where a synthesized drag update came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DragInput {
    /// Raw pointer movement; resolved with the free (nearest) policy.
    Pointer,
    /// One constrained keyboard step through the port ordering.
    Constrained(Direction),
    /// One fixed-size keyboard step that ignores ports.
    Unconstrained(Direction),
}

/// Low-level drag signals. Positions are in screen space; `delta` is the
/// accumulated offset from the drag origin in surface units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DragSignal {
    Start {
        node: NodeId,
        position: Vec2,
    },
    Move {
        node: NodeId,
        position: Vec2,
        delta: Vec2,
        input: DragInput,
    },
    End {
        node: NodeId,
        position: Vec2,
        delta: Vec2,
    },
}

impl DragSignal {
    pub fn node(&self) -> NodeId {
        match self {
            Self::Start { node, .. } | Self::Move { node, .. } | Self::End { node, .. } => *node,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClickOutcome {
    Deleted,
    Connected,
    Dropped,
    Inserted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Move sessions
    MoveStarted {
        surface: SurfaceId,
        node: NodeId,
        kind: MoveKind,
        sticky: bool,
    },
    MoveFinished {
        surface: SurfaceId,
        node: NodeId,
        connected: bool,
    },
    MoveAborted {
        surface: SurfaceId,
        node: NodeId,
    },
    CandidateChanged {
        surface: SurfaceId,
        local: Option<PortId>,
        neighbour: Option<PortId>,
    },
    Drag {
        surface: SurfaceId,
        signal: DragSignal,
    },
    RenderPassCompleted {
        surface: SurfaceId,
        node: NodeId,
    },

    // Sticky mode
    StickyEntered {
        surface: SurfaceId,
        node: NodeId,
    },
    StickyResolved {
        surface: SurfaceId,
        node: Option<NodeId>,
        outcome: ClickOutcome,
    },
    HighlightActivated {
        surface: SurfaceId,
        port: PortId,
    },
    PendingInsertionShown {
        surface: SurfaceId,
        targets: usize,
    },
    PendingInsertionCancelled {
        surface: SurfaceId,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Event> {
        self.rx.clone()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Dispatch all pending events to a listener.
    /// This is useful for processing events in the UI loop.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }

    /// Take every pending event without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

/// Trait for components that respond to events.
/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}
