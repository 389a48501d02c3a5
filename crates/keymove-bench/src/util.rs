use keymove_core::{NodeId, PortId, SurfaceId, Vec2};
use keymove_graph::{ConnectionSpec, NodeSpec, Workspace, WorkspaceSpec};

pub const BENCH_SURFACE: SurfaceId = SurfaceId(1);

/// `stacks` columns of `depth` chained statements, each column topped by a
/// value node floating beside it.
pub fn synthetic_spec(stacks: usize, depth: usize) -> WorkspaceSpec {
    let mut nodes = Vec::with_capacity(stacks * (depth + 1));
    let mut connections = Vec::new();
    let mut next_id = 1i64;

    for column in 0..stacks {
        let x = column as f32 * 200.0;
        let mut previous_next: Option<PortId> = None;
        for row in 0..depth {
            let id = next_id;
            next_id += 1;
            let first_port = id * 10;
            nodes.push(NodeSpec::statement(
                id,
                first_port,
                Vec2::new(x, row as f32 * 40.0),
            ));
            if let Some(parent) = previous_next {
                connections.push(ConnectionSpec {
                    parent,
                    child: PortId(first_port),
                });
            }
            previous_next = Some(PortId(first_port + 1));
        }
        let id = next_id;
        next_id += 1;
        nodes.push(NodeSpec::value(id, id * 10, Vec2::new(x + 140.0, -60.0)));
    }

    WorkspaceSpec {
        nodes,
        connections,
        trash: None,
        view: Default::default(),
        capacity: None,
        editable: true,
    }
}

pub fn synthetic_workspace(stacks: usize, depth: usize) -> Workspace {
    match Workspace::from_spec(BENCH_SURFACE, &synthetic_spec(stacks, depth)) {
        Ok(workspace) => workspace,
        Err(e) => panic!("synthetic workspace is invalid: {}", e),
    }
}

/// The last statement of the first stack; a natural node to pick up.
pub fn tail_of_first_stack(depth: usize) -> NodeId {
    NodeId(depth as i64)
}
