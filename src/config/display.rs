//! Display scheduler configuration.

use super::defaults::{default_coalesce_ms, default_renders_per_second};
use serde::Deserialize;
use std::time::Duration;

/// Display scheduler configuration.
///
/// Mutations arriving within `coalesce_ms` of each other are folded into a
/// single render, and render calls across all queues are throttled to
/// `renders_per_second` so a busy server cannot flood the surface.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Coalescing window in milliseconds (default: 250).
    #[serde(default = "default_coalesce_ms")]
    pub coalesce_ms: u64,
    /// Render calls allowed per second across all surfaces (default: 5).
    #[serde(default = "default_renders_per_second")]
    pub renders_per_second: u32,
}

impl DisplayConfig {
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_ms)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            coalesce_ms: default_coalesce_ms(),
            renders_per_second: default_renders_per_second(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_correct() {
        let config = DisplayConfig::default();
        assert_eq!(config.coalesce_ms, 250);
        assert_eq!(config.renders_per_second, 5);
        assert_eq!(config.coalesce_window(), Duration::from_millis(250));
    }
}
