use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod error;
pub mod geometry;
pub mod input;

pub use error::{MoveError, ShortcutError, SurfaceError};
pub use geometry::{Rect, Vec2};
pub use input::{Key, KeyCombo, Modifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub i64);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Identity of one diagram surface. Sessions on different surfaces never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone)]
pub enum EnumConversionError {
    #[error("Invalid PortKind value: {0}")]
    InvalidPortKind(i32),
    #[error("Invalid ElementKind value: {0}")]
    InvalidElementKind(i32),
}

/// Attachment point types. `Previous`/`Next` chain nodes into stacks,
/// `Input`/`Output` nest value nodes inside their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum PortKind {
    Previous,
    Next,
    Input,
    Output,
}

impl PortKind {
    /// The kind a neighbour port must have to pair with this one.
    pub fn complement(self) -> PortKind {
        match self {
            PortKind::Previous => PortKind::Next,
            PortKind::Next => PortKind::Previous,
            PortKind::Input => PortKind::Output,
            PortKind::Output => PortKind::Input,
        }
    }

    /// Previous and output ports are how a node hangs off its parent.
    pub fn is_child_side(self) -> bool {
        matches!(self, PortKind::Previous | PortKind::Output)
    }

    pub fn is_sequential(self) -> bool {
        matches!(self, PortKind::Previous | PortKind::Next)
    }
}

impl TryFrom<i32> for PortKind {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PortKind::Previous),
            1 => Ok(PortKind::Next),
            2 => Ok(PortKind::Input),
            3 => Ok(PortKind::Output),
            _ => Err(EnumConversionError::InvalidPortKind(value)),
        }
    }
}

/// What sort of diagram element a node is. Decided once when the element is
/// created and carried explicitly by anything that needs to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum ElementKind {
    #[default]
    Block,
    Comment,
    /// Default-value stand-in occupying an input until a real node replaces it.
    Placeholder,
    /// Ghost rendered by the host while previewing an insertion.
    InsertionMarker,
}

impl ElementKind {
    /// Ports owned by these elements never take part in connection search.
    pub fn is_transient(self) -> bool {
        matches!(self, ElementKind::Placeholder | ElementKind::InsertionMarker)
    }
}

impl TryFrom<i32> for ElementKind {
    type Error = EnumConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ElementKind::Block),
            1 => Ok(ElementKind::Comment),
            2 => Ok(ElementKind::Placeholder),
            3 => Ok(ElementKind::InsertionMarker),
            _ => Err(EnumConversionError::InvalidElementKind(value)),
        }
    }
}

/// Whether the node being moved already existed or was just inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Existing,
    /// Provisional node; aborting its move deletes it.
    Insertion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Traversal step through the row-major port ordering.
    pub fn step(self) -> isize {
        match self {
            Direction::Up | Direction::Left => -1,
            Direction::Down | Direction::Right => 1,
        }
    }

    /// Unit vector in surface coordinates (y grows downwards).
    pub fn unit(self) -> Vec2 {
        match self {
            Direction::Up => Vec2::new(0.0, -1.0),
            Direction::Down => Vec2::new(0.0, 1.0),
            Direction::Left => Vec2::new(-1.0, 0.0),
            Direction::Right => Vec2::new(1.0, 0.0),
        }
    }
}

/// Where keyboard focus landed after leaving a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusTarget {
    /// The empty diagram background.
    Background,
    Node(NodeId),
    /// Somewhere outside the surface entirely (toolbox, another widget).
    Outside,
}
