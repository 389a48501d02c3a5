use anyhow::{Context, Result};
use keymove_core::Modifiers;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which gesture opens a sticky (follow-the-pointer) move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Two clicks on the same node within the double-activate window.
    #[default]
    #[serde(alias = "double_click")]
    DoubleActivate,
    /// A click while holding the trigger modifier.
    #[serde(alias = "shift_click")]
    ModifierActivate,
    /// A click on the node that already holds keyboard focus.
    FocusActivate,
    /// A click on the grip shown beside the focused node.
    HandleActivate,
    /// Only the host's explicit toggle (the move key) enters and leaves.
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoverSettings {
    pub trigger_policy: TriggerPolicy,
    pub follow_pointer: bool,
    pub highlight_connections: bool,
    pub trigger_modifier: Modifiers,
    pub double_activate_ms: u64,
    pub highlight_refresh_ms: u64,
    pub highlight_limit: usize,

    // Movement, in surface units
    pub unconstrained_step: f32,
    pub snap_radius: f32,
    pub connection_preference: f32,

    // Handle affordance
    pub handle_size: f32,
    pub handle_small_size: f32,
    pub small_node_height: f32,
}

impl Default for MoverSettings {
    fn default() -> Self {
        Self {
            trigger_policy: TriggerPolicy::default(),
            follow_pointer: true,
            highlight_connections: true,
            trigger_modifier: Modifiers::SHIFT,
            double_activate_ms: 500,
            highlight_refresh_ms: 100,
            highlight_limit: 50,
            unconstrained_step: 20.0,
            snap_radius: 28.0,
            connection_preference: 8.0,
            handle_size: 24.0,
            handle_small_size: 16.0,
            small_node_height: 30.0,
        }
    }
}

impl MoverSettings {
    pub fn double_activate_window(&self) -> Duration {
        Duration::from_millis(self.double_activate_ms)
    }

    pub fn highlight_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.highlight_refresh_ms)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        tracing::info!("Settings loaded from {:?}: {:?}", path, settings);
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }
}
