//! lineup - channel-bound waiting queues.
//!
//! Members line up in queues bound to chat or voice channels; operators pull
//! them out in order, directly or by dragging the bot between voice channels.
//! Queue state lives in SQLite, every queue is serialized through its own
//! actor, and rendered displays are refreshed in debounced batches.

pub mod admission;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod grace;
pub mod platform;
pub mod state;
pub mod telemetry;
pub mod transfer;
