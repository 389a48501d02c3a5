//! Default keyboard protocol for moving nodes.

use crate::session::MoveRequest;
use crate::settings::TriggerPolicy;
use crate::shortcuts::{Shortcut, ShortcutRegistry, commit_shortcut_name, is_commit_shortcut};
use crate::sticky::StickyController;
use keymove_core::{Direction, Key, KeyCombo, Modifiers, NodeId, ShortcutError};
use keymove_graph::Surface;
use tracing::{debug, warn};

pub const START_MOVE: &str = "keymove.start_move";
pub const COMMIT: &str = "keymove.finish_move";
pub const ABORT: &str = "keymove.abort_move";

const DIRECTIONS: [(Direction, Key, &str); 4] = [
    (Direction::Up, Key::Up, "up"),
    (Direction::Down, Key::Down, "down"),
    (Direction::Left, Key::Left, "left"),
    (Direction::Right, Key::Right, "right"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveAction {
    StartMove,
    Constrained(Direction),
    Unconstrained(Direction),
    Commit,
    Abort,
}

impl MoveAction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            START_MOVE => return Some(MoveAction::StartMove),
            COMMIT => return Some(MoveAction::Commit),
            ABORT => return Some(MoveAction::Abort),
            _ => {}
        }
        let (prefix, dir) = name.rsplit_once('_')?;
        let direction = DIRECTIONS
            .iter()
            .find(|(_, _, label)| *label == dir)
            .map(|(d, _, _)| *d)?;
        match prefix {
            "keymove.move" => Some(MoveAction::Constrained(direction)),
            "keymove.nudge" => Some(MoveAction::Unconstrained(direction)),
            _ => None,
        }
    }
}

/// What the host should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled(MoveAction),
    /// The open move was committed first; the host should now run the
    /// shortcut that the commit shadowed.
    CommittedThen(String),
    /// Not ours. Carries the host shortcut bound to the key, if any.
    Passthrough(Option<String>),
}

/// Registers the move bindings in a shared registry and dispatches key
/// presses to the sticky controller and its mover.
#[derive(Debug, Clone)]
pub struct MoveKeymap {
    registry: ShortcutRegistry,
}

impl MoveKeymap {
    pub fn new(registry: ShortcutRegistry) -> Result<Self, ShortcutError> {
        for shortcut in default_bindings() {
            registry.register(shortcut)?;
        }
        Ok(Self { registry })
    }

    pub fn registry(&self) -> &ShortcutRegistry {
        &self.registry
    }

    pub fn handle_key(
        &self,
        controller: &mut StickyController,
        surface: &mut dyn Surface,
        combo: KeyCombo,
        cursor: Option<NodeId>,
    ) -> KeyOutcome {
        let id = surface.id();
        let own_commit = commit_shortcut_name(id);
        let names: Vec<String> = self
            .registry
            .resolve_all(&combo)
            .into_iter()
            .filter(|name| !is_commit_shortcut(name) || *name == own_commit)
            .collect();
        let Some(first) = names.first() else {
            return KeyOutcome::Passthrough(None);
        };

        if *first == own_commit {
            controller.finish(surface);
            return match names.get(1) {
                Some(shadowed) => {
                    debug!("Committed move before running {}", shadowed);
                    KeyOutcome::CommittedThen(shadowed.clone())
                }
                None => KeyOutcome::Handled(MoveAction::Commit),
            };
        }

        let Some(action) = MoveAction::from_name(first) else {
            return KeyOutcome::Passthrough(Some(first.clone()));
        };
        let moving = controller.mover().is_moving(id);
        match action {
            MoveAction::StartMove => {
                if controller.settings().trigger_policy == TriggerPolicy::Toggle {
                    let Some(node) = controller.sticky_node(id).or(cursor) else {
                        return KeyOutcome::Passthrough(Some(first.clone()));
                    };
                    let pointer = surface
                        .element(node)
                        .map(|e| surface.to_screen(e.position))
                        .unwrap_or_default();
                    controller.toggle(surface, node, pointer);
                    return KeyOutcome::Handled(action);
                }
                if moving {
                    controller.finish(surface);
                    return KeyOutcome::Handled(MoveAction::Commit);
                }
                match cursor {
                    Some(node) if controller.mover().can_start(surface, node) => {
                        controller.start(surface, MoveRequest::existing(node));
                        KeyOutcome::Handled(action)
                    }
                    _ => KeyOutcome::Passthrough(Some(first.clone())),
                }
            }
            _ if !moving => KeyOutcome::Passthrough(Some(first.clone())),
            MoveAction::Constrained(direction) => {
                if let Err(e) = controller.mover_mut().move_constrained(surface, direction) {
                    warn!("Constrained move failed: {}", e);
                }
                KeyOutcome::Handled(action)
            }
            MoveAction::Unconstrained(direction) => {
                if let Err(e) = controller.mover_mut().move_unconstrained(surface, direction) {
                    warn!("Unconstrained move failed: {}", e);
                }
                KeyOutcome::Handled(action)
            }
            MoveAction::Commit => {
                controller.finish(surface);
                KeyOutcome::Handled(action)
            }
            MoveAction::Abort => {
                controller.abort(surface);
                KeyOutcome::Handled(action)
            }
        }
    }
}

pub fn default_bindings() -> Vec<Shortcut> {
    let mut bindings = vec![
        Shortcut::new(START_MOVE, vec![KeyCombo::new(Key::Char('m'))]),
        Shortcut::new(COMMIT, vec![KeyCombo::new(Key::Enter)]),
        Shortcut::new(ABORT, vec![KeyCombo::new(Key::Escape)]),
    ];
    for (_, key, label) in DIRECTIONS {
        bindings.push(Shortcut::new(
            format!("keymove.move_{label}"),
            vec![KeyCombo::new(key)],
        ));
        bindings.push(Shortcut::new(
            format!("keymove.nudge_{label}"),
            vec![KeyCombo::with(key, Modifiers::ALT)],
        ));
    }
    bindings
}
