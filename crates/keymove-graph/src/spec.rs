//! Serializable description of a surface, used for fixtures, replay scripts
//! and printing results.

use crate::element::{PORT_INSET, STATEMENT_SIZE, VALUE_SIZE};
use crate::surface::Surface;
use crate::workspace::Workspace;
use keymove_core::{
    ElementKind, NodeId, PortId, PortKind, Rect, SurfaceError, SurfaceId, Vec2,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub id: PortId,
    pub kind: PortKind,
    pub offset: Vec2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(default)]
    pub kind: ElementKind,
    #[serde(default)]
    pub label: String,
    pub position: Vec2,
    #[serde(default = "default_node_size")]
    pub size: Vec2,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default = "default_true")]
    pub movable: bool,
    #[serde(default = "default_true")]
    pub deletable: bool,
}

/// A `parent` port (next/input) linked to a `child` port (previous/output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub parent: PortId,
    pub child: PortId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    #[serde(default)]
    pub offset: Vec2,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_viewport")]
    pub viewport: Vec2,
}

impl Default for ViewSpec {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: default_scale(),
            viewport: default_viewport(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSpec {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
    /// Screen-space drop region that deletes a node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trash: Option<Rect>,
    #[serde(default)]
    pub view: ViewSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(default = "default_true")]
    pub editable: bool,
}

fn default_true() -> bool {
    true
}

fn default_scale() -> f32 {
    1.0
}

fn default_viewport() -> Vec2 {
    Vec2::new(800.0, 600.0)
}

fn default_node_size() -> Vec2 {
    STATEMENT_SIZE
}

impl NodeSpec {
    /// A statement node with previous and next ports numbered from `first_port`.
    pub fn statement(id: i64, first_port: i64, position: Vec2) -> Self {
        Self {
            id: NodeId(id),
            kind: ElementKind::Block,
            label: format!("statement {id}"),
            position,
            size: STATEMENT_SIZE,
            ports: vec![
                PortSpec {
                    id: PortId(first_port),
                    kind: PortKind::Previous,
                    offset: Vec2::new(PORT_INSET, 0.0),
                    check: None,
                },
                PortSpec {
                    id: PortId(first_port + 1),
                    kind: PortKind::Next,
                    offset: Vec2::new(PORT_INSET, STATEMENT_SIZE.y),
                    check: None,
                },
            ],
            movable: true,
            deletable: true,
        }
    }

    pub fn value(id: i64, port: i64, position: Vec2) -> Self {
        Self {
            id: NodeId(id),
            kind: ElementKind::Block,
            label: format!("value {id}"),
            position,
            size: VALUE_SIZE,
            ports: vec![PortSpec {
                id: PortId(port),
                kind: PortKind::Output,
                offset: Vec2::new(0.0, VALUE_SIZE.y * 0.5),
                check: None,
            }],
            movable: true,
            deletable: true,
        }
    }
}

impl Workspace {
    /// Build a workspace from a description, validating ids and connections.
    pub fn from_spec(id: SurfaceId, spec: &WorkspaceSpec) -> Result<Self, SurfaceError> {
        let mut workspace = Workspace::new(id);
        let mut node_ids = HashSet::new();
        let mut port_ids = HashSet::new();

        for node in &spec.nodes {
            if !node_ids.insert(node.id) {
                return Err(SurfaceError::InvalidSpec(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            workspace.insert_element(
                node.id,
                node.kind,
                node.label.clone(),
                node.position,
                node.size,
            );
            workspace.set_movable(node.id, node.movable);
            workspace.set_deletable(node.id, node.deletable);
            if node.kind == ElementKind::Comment && !node.ports.is_empty() {
                return Err(SurfaceError::InvalidSpec(format!(
                    "comment {} cannot carry ports",
                    node.id
                )));
            }
            for port in &node.ports {
                if !port_ids.insert(port.id) {
                    return Err(SurfaceError::InvalidSpec(format!(
                        "duplicate port id {}",
                        port.id
                    )));
                }
                workspace.insert_port(port.id, node.id, port.kind, port.offset, port.check.clone());
            }
        }

        for connection in &spec.connections {
            workspace.link_ports(connection.parent, connection.child)?;
        }

        workspace.set_trash(spec.trash);
        workspace.set_capacity(spec.capacity);
        workspace.set_editable(spec.editable);
        workspace.set_view(spec.view.offset, spec.view.scale, spec.view.viewport);
        Ok(workspace)
    }

    /// Describe the current state, suitable for `from_spec`.
    pub fn snapshot(&self) -> WorkspaceSpec {
        let nodes = self
            .elements()
            .map(|element| NodeSpec {
                id: element.id,
                kind: element.kind,
                label: element.label.clone(),
                position: element.position,
                size: element.size,
                ports: element
                    .ports
                    .iter()
                    .filter_map(|id| self.port(*id))
                    .map(|port| PortSpec {
                        id: port.id,
                        kind: port.kind,
                        offset: port.offset,
                        check: port.check.clone(),
                    })
                    .collect(),
                movable: element.movable,
                deletable: element.deletable,
            })
            .collect();

        let connections = self
            .ports()
            .filter(|port| port.kind.is_child_side())
            .filter_map(|port| {
                port.target.map(|parent| ConnectionSpec {
                    parent,
                    child: port.id,
                })
            })
            .collect();

        WorkspaceSpec {
            nodes,
            connections,
            trash: self.trash(),
            view: ViewSpec {
                offset: self.view_offset(),
                scale: self.scale(),
                viewport: self.viewport(),
            },
            capacity: self.capacity(),
            editable: self.is_editable(),
        }
    }
}
