use crate::{NodeId, OverlayId, PortId, SurfaceId};
use thiserror::Error;

/// Failures reported by a diagram surface collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Unknown port: {0}")]
    UnknownPort(PortId),
    #[error("Ports {local} and {neighbour} cannot be connected")]
    Incompatible { local: PortId, neighbour: PortId },
    #[error("Overlay {0:?} is no longer attached")]
    OverlayDetached(OverlayId),
    #[error("Surface has no capacity left for another node")]
    CapacityExhausted,
    #[error("Surface is read-only")]
    NotEditable,
    #[error("Invalid surface description: {0}")]
    InvalidSpec(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MoveError {
    /// Step operations require an open session; gate on `is_moving` first.
    #[error("No move in progress on {0}")]
    NoActiveSession(SurfaceId),
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortcutError {
    #[error("Shortcut already registered: {0}")]
    Duplicate(String),
}
