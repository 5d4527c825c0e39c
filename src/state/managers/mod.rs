//! Domain managers for engine state.

pub mod queue;
