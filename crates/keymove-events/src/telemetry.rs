use keymove_core::{NodeId, SurfaceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "keymove::events::telemetry";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionLifecycle {
    Start,
    Commit,
    Abort,
}

impl fmt::Display for SessionLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "session_start"),
            Self::Commit => write!(f, "session_commit"),
            Self::Abort => write!(f, "session_abort"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTelemetry {
    pub correlation_id: String,
    pub surface: SurfaceId,
    pub node: NodeId,
    pub lifecycle: SessionLifecycle,
    pub sticky: bool,
    pub duration_ms: Option<u128>,
}

impl SessionTelemetry {
    fn new(
        lifecycle: SessionLifecycle,
        surface: SurfaceId,
        node: NodeId,
        correlation_id: &str,
        sticky: bool,
        duration_ms: Option<u128>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            surface,
            node,
            lifecycle,
            sticky,
            duration_ms,
        }
    }

    fn now_unix_ms() -> u128 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    }
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn session_start(
    surface: SurfaceId,
    node: NodeId,
    correlation_id: &str,
    sticky: bool,
) -> SessionTelemetry {
    let telemetry = SessionTelemetry::new(
        SessionLifecycle::Start,
        surface,
        node,
        correlation_id,
        sticky,
        None,
    );
    info!(
        target: TELEMETRY_TARGET,
        surface = %telemetry.surface,
        node = %telemetry.node,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        sticky = telemetry.sticky,
        timestamp_ms = SessionTelemetry::now_unix_ms(),
        "session_start"
    );
    telemetry
}

pub fn session_end(
    surface: SurfaceId,
    node: NodeId,
    correlation_id: &str,
    committed: bool,
    duration_ms: u128,
) -> SessionTelemetry {
    let lifecycle = if committed {
        SessionLifecycle::Commit
    } else {
        SessionLifecycle::Abort
    };
    let telemetry =
        SessionTelemetry::new(lifecycle, surface, node, correlation_id, false, Some(duration_ms));
    info!(
        target: TELEMETRY_TARGET,
        surface = %telemetry.surface,
        node = %telemetry.node,
        correlation_id = %telemetry.correlation_id,
        lifecycle = %telemetry.lifecycle,
        duration_ms = ?telemetry.duration_ms,
        timestamp_ms = SessionTelemetry::now_unix_ms(),
        "session_end"
    );
    telemetry
}

pub fn debug_context(surface: SurfaceId, correlation_id: &str, context: &str) {
    debug!(
        target: TELEMETRY_TARGET,
        surface = %surface,
        correlation_id = %correlation_id,
        context = %context,
        timestamp_ms = SessionTelemetry::now_unix_ms(),
        "session_context"
    );
}
