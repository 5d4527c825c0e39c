//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use crate::display::DisplayMode;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Engine Defaults
// =============================================================================

pub fn default_mailbox_capacity() -> usize {
    100
}

pub fn default_database_path() -> String {
    "lineup.db".to_string()
}

// =============================================================================
// Queue Defaults
// =============================================================================

pub fn default_pull_count() -> u32 {
    1
}

pub fn default_grace_period() -> u64 {
    0
}

pub fn default_color() -> u32 {
    0x5865F2
}

pub fn default_display_mode() -> DisplayMode {
    DisplayMode::Edit
}

// =============================================================================
// Display Defaults
// =============================================================================

pub fn default_coalesce_ms() -> u64 {
    250
}

pub fn default_renders_per_second() -> u32 {
    5
}
