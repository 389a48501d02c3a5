pub mod connection_search;
pub mod element;
pub mod highlight;
pub mod spec;
pub mod surface;
pub mod workspace;

pub use connection_search::{
    Candidate, ConnectionSearch, all_ports, forced_candidate, local_ports, preview_for,
};
pub use element::{Element, NodeTemplate, Port, PortTemplate, checks_intersect};
pub use highlight::{ConnectionHighlighter, Highlight, LocalPort, Pairing};
pub use spec::{ConnectionSpec, NodeSpec, PortSpec, ViewSpec, WorkspaceSpec};
pub use surface::{CursorTarget, OverlayAnchor, OverlayShape, OverlaySpec, Preview, Surface};
pub use workspace::{SurfaceLog, Workspace};

// Re-export shared geometry for callers that only depend on this crate.
pub use keymove_core::{Rect, Vec2};
