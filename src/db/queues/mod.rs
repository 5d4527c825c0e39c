//! Queue repository.
//!
//! One row per queue, keyed by the channel the queue is bound to.

pub mod models;
pub mod queries;

pub use models::{QueueKind, QueueRecord};
pub use queries::QueueRepository;
