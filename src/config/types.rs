//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::defaults::default_database_path;
use super::display::DisplayConfig;
use super::engine::EngineConfig;
use super::queue::QueueDefaults;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Engine runtime settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// Settings for newly created queues.
    #[serde(default)]
    pub queue_defaults: QueueDefaults,
    /// Display scheduler tuning.
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Database path, falling back to `lineup.db`.
    pub fn database_path(&self) -> String {
        self.database
            .as_ref()
            .map(|d| d.path.clone())
            .unwrap_or_else(default_database_path)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file (`:memory:` for a throwaway database).
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayMode;

    #[test]
    fn parses_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            controller_id = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.controller_id, 42);
        assert_eq!(config.engine.mailbox_capacity, 100);
        assert_eq!(config.database_path(), "lineup.db");
        assert_eq!(config.queue_defaults.pull_count, 1);
    }

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            controller_id = 7
            mailbox_capacity = 32

            [database]
            path = "data/queues.db"

            [queue_defaults]
            pull_count = 2
            partial_pull = false
            grace_period = 30
            header = "Support line"
            display_mode = "resend_and_delete"

            [display]
            coalesce_ms = 500
            renders_per_second = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path(), "data/queues.db");
        assert_eq!(config.queue_defaults.pull_count, 2);
        assert!(!config.queue_defaults.partial_pull);
        assert_eq!(config.queue_defaults.grace_period, 30);
        assert_eq!(
            config.queue_defaults.display_mode,
            DisplayMode::ResendAndDelete
        );
        assert_eq!(config.display.coalesce_ms, 500);
    }

    #[test]
    fn example_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.engine.controller_id, 1);
        assert_eq!(config.queue_defaults.color, 0x5865F2);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/lineup.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
