pub mod drag_strategy;
pub mod keymap;
pub mod render_queue;
pub mod session;
pub mod settings;
pub mod shortcuts;
pub mod sticky;
pub mod throttle;

pub use drag_strategy::{DragStrategy, FreeDragStrategy, KeyboardDragStrategy, StrategyTable};
pub use keymap::{KeyOutcome, MoveAction, MoveKeymap};
pub use render_queue::RenderQueue;
pub use session::{BlurPolicy, CompletionCallback, MoveOutcome, MoveRequest, MoveSession, Mover};
pub use settings::{MoverSettings, TriggerPolicy};
pub use shortcuts::{Shortcut, ShortcutGuard, ShortcutRegistry};
pub use sticky::{
    ClickResolution, ClickTarget, FieldKind, HandleAffordance, PointerEvent, StickyController,
    VisualRole,
};
pub use throttle::Throttle;
