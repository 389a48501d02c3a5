//! Gesture scripts: a surface description plus a list of input steps that are
//! replayed against the keymap and sticky controller.

use anyhow::{Context, Result};
use keymove_core::{FocusTarget, KeyCombo, Modifiers, NodeId, SurfaceId, Vec2};
use keymove_events::{Event, EventBus};
use keymove_graph::{NodeTemplate, Surface, Workspace, WorkspaceSpec};
use keymove_mover::{
    ClickTarget, KeyOutcome, MoveKeymap, MoveRequest, Mover, MoverSettings, PointerEvent,
    ShortcutRegistry, StickyController, VisualRole,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

const SCRIPT_SURFACE: SurfaceId = SurfaceId(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub workspace: WorkspaceSpec,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// What a scripted click lands on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptTarget {
    #[default]
    Background,
    Node {
        node: NodeId,
    },
    Palette {
        template: NodeTemplate,
    },
    Handle {
        node: NodeId,
    },
}

impl ScriptTarget {
    fn to_click_target(&self) -> ClickTarget {
        match self {
            ScriptTarget::Background => ClickTarget::Background,
            ScriptTarget::Node { node } => ClickTarget::Node {
                node: *node,
                path: vec![VisualRole::Body(*node)],
            },
            ScriptTarget::Palette { template } => ClickTarget::Palette(template.clone()),
            ScriptTarget::Handle { node } => ClickTarget::Handle(*node),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    StartMove {
        node: NodeId,
        #[serde(default)]
        sticky: bool,
    },
    Key {
        combo: KeyCombo,
        /// Node under the keyboard cursor.
        #[serde(default)]
        cursor: Option<NodeId>,
    },
    PointerMove {
        position: Vec2,
    },
    Click {
        position: Vec2,
        #[serde(default)]
        target: ScriptTarget,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Focus {
        node: NodeId,
    },
    Blur {
        #[serde(default)]
        outside: bool,
    },
    /// Advance the replay clock.
    Wait {
        ms: u64,
    },
    Frame,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse script {}", path.display()))
    }
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub workspace: WorkspaceSpec,
    pub events: Vec<Event>,
    /// Host shortcuts that the script's key presses fell through to.
    pub host_shortcuts: Vec<String>,
}

pub fn replay(script: &Script, settings: MoverSettings) -> Result<ReplayReport> {
    let mut workspace = Workspace::from_spec(SCRIPT_SURFACE, &script.workspace)
        .context("Invalid workspace in script")?;
    let bus = EventBus::new();
    let registry = ShortcutRegistry::new();
    let keymap = MoveKeymap::new(registry.clone()).context("Failed to register move keys")?;
    let mut controller = StickyController::new(Mover::new(bus.clone(), registry, settings));

    let mut clock = Instant::now();
    let mut host_shortcuts = Vec::new();
    for (index, step) in script.steps.iter().enumerate() {
        tracing::debug!("Step {}: {:?}", index, step);
        match step {
            Step::StartMove { node, sticky } => {
                let started = if *sticky {
                    let pointer = workspace
                        .element(*node)
                        .map(|e| workspace.to_screen(e.position))
                        .unwrap_or_default();
                    controller.enter_at(&mut workspace, *node, pointer, clock)
                } else {
                    controller.start(&mut workspace, MoveRequest::existing(*node))
                };
                if !started {
                    tracing::warn!("Step {}: could not start a move on node {}", index, node);
                }
            }
            Step::Key { combo, cursor } => {
                match keymap.handle_key(&mut controller, &mut workspace, *combo, *cursor) {
                    KeyOutcome::Handled(action) => tracing::debug!("{} -> {:?}", combo, action),
                    KeyOutcome::CommittedThen(name) | KeyOutcome::Passthrough(Some(name)) => {
                        host_shortcuts.push(name)
                    }
                    KeyOutcome::Passthrough(None) => {}
                }
            }
            Step::PointerMove { position } => {
                controller.on_pointer_move(&mut workspace, *position, clock);
            }
            Step::Click {
                position,
                target,
                modifiers,
            } => {
                let event = PointerEvent::new(*position, target.to_click_target())
                    .with_modifiers(*modifiers)
                    .at(clock);
                let resolution = controller.on_click(&mut workspace, event);
                tracing::info!("Click at ({}, {}) -> {:?}", position.x, position.y, resolution);
            }
            Step::Focus { node } => {
                controller.on_focus_changed(&mut workspace, FocusTarget::Node(*node));
            }
            Step::Blur { outside } => {
                let target = if *outside {
                    FocusTarget::Outside
                } else {
                    FocusTarget::Background
                };
                controller.on_focus_changed(&mut workspace, target);
            }
            Step::Wait { ms } => clock += Duration::from_millis(*ms),
            Step::Frame => {
                controller.on_frame(&mut workspace, clock);
            }
        }
    }
    // Flush whatever the last step deferred.
    controller.on_frame(&mut workspace, clock);

    Ok(ReplayReport {
        workspace: workspace.snapshot(),
        events: bus.drain(),
        host_shortcuts,
    })
}

/// A short keyboard move followed by a sticky drop.
pub fn demo() -> Script {
    use keymove_core::{Key, PortId};
    use keymove_graph::{ConnectionSpec, NodeSpec, ViewSpec};

    Script {
        workspace: WorkspaceSpec {
            nodes: vec![
                NodeSpec::statement(1, 10, Vec2::new(40.0, 40.0)),
                NodeSpec::statement(2, 20, Vec2::ZERO),
                NodeSpec::statement(3, 30, Vec2::new(40.0, 300.0)),
            ],
            connections: vec![ConnectionSpec {
                parent: PortId(11),
                child: PortId(20),
            }],
            trash: None,
            view: ViewSpec::default(),
            capacity: None,
            editable: true,
        },
        steps: vec![
            Step::Key {
                combo: KeyCombo::new(Key::Char('m')),
                cursor: Some(NodeId(2)),
            },
            Step::Key {
                combo: KeyCombo::new(Key::Down),
                cursor: Some(NodeId(2)),
            },
            Step::Key {
                combo: KeyCombo::new(Key::Enter),
                cursor: Some(NodeId(2)),
            },
            Step::Frame,
            Step::StartMove {
                node: NodeId(1),
                sticky: true,
            },
            Step::PointerMove {
                position: Vec2::new(400.0, 100.0),
            },
            Step::Wait { ms: 150 },
            Step::Click {
                position: Vec2::new(400.0, 100.0),
                target: ScriptTarget::Node { node: NodeId(1) },
                modifiers: Modifiers::NONE,
            },
        ],
    }
}
