//! Queue database models.

use crate::config::QueueDefaults;
use crate::display::DisplayMode;
use crate::platform::{ChannelId, RoleId};
use serde::Deserialize;

/// What kind of channel a queue is bound to.
///
/// Voice queues follow channel presence: entering the channel joins the
/// queue, leaving it starts the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Text,
    Voice,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Text => "text",
            QueueKind::Voice => "voice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(QueueKind::Text),
            "voice" => Some(QueueKind::Voice),
            _ => None,
        }
    }
}

/// A queue and its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub channel_id: ChannelId,
    pub kind: QueueKind,
    pub header: Option<String>,
    pub color: u32,
    /// Maximum number of queued members, `None` when unlimited.
    pub size_limit: Option<usize>,
    /// Members pulled when a pull names no count.
    pub pull_count: u32,
    pub partial_pull: bool,
    /// Grace period in seconds; 0 removes disconnected members immediately.
    pub grace_period: u64,
    pub locked: bool,
    pub mute_on_join: bool,
    pub auto_fill: bool,
    pub role_id: Option<RoleId>,
    /// Destination for auto-fill pulls.
    pub target_channel_id: Option<ChannelId>,
    pub display_mode: DisplayMode,
    pub created_at: i64,
}

impl QueueRecord {
    /// A fresh queue bound to `channel_id`, using the configured defaults.
    pub fn new(channel_id: ChannelId, kind: QueueKind, defaults: &QueueDefaults) -> Self {
        Self {
            channel_id,
            kind,
            header: defaults.header.clone(),
            color: defaults.color,
            size_limit: None,
            pull_count: defaults.pull_count,
            partial_pull: defaults.partial_pull,
            grace_period: defaults.grace_period,
            locked: false,
            mute_on_join: false,
            auto_fill: false,
            role_id: None,
            target_channel_id: None,
            display_mode: defaults.display_mode,
            created_at: crate::db::now_millis(),
        }
    }

    /// Free slots under the size limit, `None` when unlimited.
    pub fn headroom(&self, current_size: usize) -> Option<usize> {
        self.size_limit
            .map(|limit| limit.saturating_sub(current_size))
    }
}
