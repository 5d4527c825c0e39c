//! Queue actor event handlers.
//!
//! Each submodule handles a category of [`QueueEvent`](super::QueueEvent)
//! messages processed by [`QueueActor`](super::QueueActor).

pub mod join;
pub mod leave;
pub mod presence;
pub mod pull;
pub mod settings;
pub mod shuffle;
