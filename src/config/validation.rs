//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("engine.controller_id is required")]
    MissingControllerId,
    #[error("engine.mailbox_capacity must be at least 1")]
    ZeroMailboxCapacity,
    #[error("queue_defaults.pull_count must be at least 1")]
    ZeroPullCount,
    #[error("display.renders_per_second must be at least 1")]
    ZeroRenderRate,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.engine.controller_id == 0 {
        errors.push(ValidationError::MissingControllerId);
    }
    if config.engine.mailbox_capacity == 0 {
        errors.push(ValidationError::ZeroMailboxCapacity);
    }
    if config.queue_defaults.pull_count == 0 {
        errors.push(ValidationError::ZeroPullCount);
    }
    if config.display.renders_per_second == 0 {
        errors.push(ValidationError::ZeroRenderRate);
    }

    // Database path validation
    if let Some(ref db) = config.database
        && db.path != ":memory:"
    {
        let db_path = Path::new(&db.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(db.path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
