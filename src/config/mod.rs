//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Root config struct, loading, and database settings
//! - [`engine`]: Engine runtime configuration (EngineConfig)
//! - [`queue`]: Settings applied to newly created queues (QueueDefaults)
//! - [`display`]: Display scheduler tuning (DisplayConfig)
//! - [`validation`]: Startup validation

mod defaults;
mod display;
mod engine;
mod queue;
mod types;
pub mod validation;

pub use display::DisplayConfig;
pub use engine::EngineConfig;
pub use queue::QueueDefaults;
pub use types::{Config, ConfigError, DatabaseConfig};
