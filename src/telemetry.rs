//! Telemetry utilities for operation timing and span construction.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Operations slower than this are logged at warn level.
const SLOW_OPERATION: Duration = Duration::from_millis(500);

/// Guard for timing a queue operation.
///
/// Logs the latency when dropped.
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed >= SLOW_OPERATION {
            warn!(operation = self.operation, elapsed_ms, "Slow queue operation");
        } else {
            debug!(operation = self.operation, elapsed_ms, "Queue operation finished");
        }
    }
}

/// Standardized span constructors.
pub mod spans {
    use crate::platform::{ChannelId, MemberId};
    use tracing::{Span, info_span};

    /// Span for one event handled by a queue actor.
    pub fn queue(queue: ChannelId, event: &'static str) -> Span {
        info_span!("queue", queue, event)
    }

    /// Span for one intent taken off the inbound stream.
    pub fn intent(name: &'static str, queue: ChannelId) -> Span {
        info_span!("intent", name, queue)
    }

    /// Span for a voice transfer step.
    pub fn transfer(source: ChannelId, destination: Option<ChannelId>) -> Span {
        match destination {
            Some(destination) => info_span!("transfer", source, destination),
            None => info_span!("transfer", source),
        }
    }

    /// Span for a platform voice-state event.
    pub fn voice_state(member: MemberId) -> Span {
        info_span!("voice_state", member)
    }
}
