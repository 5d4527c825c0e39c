//! State management module.
//!
//! Contains the queue actors, their registry and the engine that ties them to
//! the platform, the display scheduler and the grace timers.

pub mod actor;
mod engine;
pub mod managers;
pub mod notice;

pub use engine::Engine;
pub use notice::Notice;
