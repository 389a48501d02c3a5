use keymove_core::{ElementKind, NodeId, PortId, PortKind, Rect, Vec2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub id: PortId,
    pub node: NodeId,
    pub kind: PortKind,
    /// Offset from the owning node's top-left corner.
    pub offset: Vec2,
    /// Type tags; `None` accepts anything.
    pub check: Option<Vec<String>>,
    pub target: Option<PortId>,
}

impl Port {
    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }
}

/// True when two optional type-tag sets share at least one tag. A missing set
/// matches everything.
pub fn checks_intersect(a: Option<&[String]>, b: Option<&[String]>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.iter().any(|tag| b.contains(tag)),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: NodeId,
    pub kind: ElementKind,
    pub label: String,

    // Visual properties
    pub position: Vec2,
    pub size: Vec2,

    // Hierarchy
    pub ports: Vec<PortId>,
    pub parent: Option<NodeId>,

    pub movable: bool,
    pub deletable: bool,
}

impl Element {
    pub fn bounds(&self) -> Rect {
        Rect::from_pos_size(self.position, self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortTemplate {
    pub kind: PortKind,
    pub offset: Vec2,
    #[serde(default)]
    pub check: Option<Vec<String>>,
}

/// A palette entry that can be materialized onto a surface on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub label: String,
    #[serde(default)]
    pub kind: ElementKind,
    pub size: Vec2,
    #[serde(default)]
    pub ports: Vec<PortTemplate>,
}

impl NodeTemplate {
    pub fn statement(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ElementKind::Block,
            size: STATEMENT_SIZE,
            ports: vec![
                PortTemplate {
                    kind: PortKind::Previous,
                    offset: Vec2::new(PORT_INSET, 0.0),
                    check: None,
                },
                PortTemplate {
                    kind: PortKind::Next,
                    offset: Vec2::new(PORT_INSET, STATEMENT_SIZE.y),
                    check: None,
                },
            ],
        }
    }

    pub fn value(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ElementKind::Block,
            size: VALUE_SIZE,
            ports: vec![PortTemplate {
                kind: PortKind::Output,
                offset: Vec2::new(0.0, VALUE_SIZE.y * 0.5),
                check: None,
            }],
        }
    }
}

/// Default footprint of a sequential node.
pub const STATEMENT_SIZE: Vec2 = Vec2 { x: 120.0, y: 40.0 };
/// Default footprint of a value node.
pub const VALUE_SIZE: Vec2 = Vec2 { x: 40.0, y: 24.0 };
pub const PORT_INSET: f32 = 16.0;
