//! Member database models.

use crate::platform::{ChannelId, MemberId};

/// Lifecycle state of a stored entry. Removed entries have no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Active,
    /// Disconnected from the queue's channel, waiting out the grace period.
    Grace,
}

/// A member's place in a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub channel_id: ChannelId,
    pub member_id: MemberId,
    /// Monotonic per queue, assigned at join.
    pub order_key: i64,
    /// Priority entries sort ahead of everyone else.
    pub priority: bool,
    /// Milliseconds since epoch.
    pub joined_at: i64,
    /// Set while the member is in grace (milliseconds since epoch).
    pub disconnected_at: Option<i64>,
}

impl MemberEntry {
    pub fn state(&self) -> MemberState {
        if self.disconnected_at.is_some() {
            MemberState::Grace
        } else {
            MemberState::Active
        }
    }
}
