//! Integration test common infrastructure.
//!
//! Provides an in-process engine wired to the local platform and surface,
//! and a platform wrapper whose moves can be made to fail.

#[allow(dead_code)]
pub mod engine;
#[allow(dead_code)]
pub mod platform;

#[allow(unused_imports)]
pub use engine::{CONTROLLER, Setup, TestEngine, eventually};
#[allow(unused_imports)]
pub use platform::FlakyPlatform;
