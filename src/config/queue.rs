//! Settings applied to newly created queues.

use super::defaults::{
    default_color, default_display_mode, default_grace_period, default_pull_count, default_true,
};
use crate::display::DisplayMode;
use serde::Deserialize;

/// Settings a queue starts out with unless the create request overrides them.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueDefaults {
    /// Members pulled when a pull names no count (default: 1).
    #[serde(default = "default_pull_count")]
    pub pull_count: u32,
    /// Allow pulling fewer members than requested (default: true).
    #[serde(default = "default_true")]
    pub partial_pull: bool,
    /// Seconds a disconnected member keeps their place (default: 0, no grace).
    #[serde(default = "default_grace_period")]
    pub grace_period: u64,
    /// Display color as 0xRRGGBB.
    #[serde(default = "default_color")]
    pub color: u32,
    /// Header text shown above the member list.
    #[serde(default)]
    pub header: Option<String>,
    /// How displays are refreshed (default: edit).
    #[serde(default = "default_display_mode")]
    pub display_mode: DisplayMode,
}

impl Default for QueueDefaults {
    fn default() -> Self {
        Self {
            pull_count: default_pull_count(),
            partial_pull: true,
            grace_period: default_grace_period(),
            color: default_color(),
            header: None,
            display_mode: default_display_mode(),
        }
    }
}
