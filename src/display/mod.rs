//! Queue displays.
//!
//! A display is a rendered view of a queue's line on some surface. The
//! [`DisplayScheduler`] keeps every bound target eventually consistent with the
//! membership store while coalescing bursts of mutations into single renders.

use crate::db::{Database, DbError, DisplayBinding, MemberEntry, QueueRecord};
use crate::platform::ChannelId;
use async_trait::async_trait;
use serde::Deserialize;

pub mod render;
mod scheduler;

pub use render::{RenderedDisplay, render};
pub use scheduler::DisplayScheduler;

/// How a display is refreshed when its queue changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Keep one target per queue and edit it in place.
    Edit,
    /// Post a fresh target and delete the previous one.
    ResendAndDelete,
    /// Post a fresh target and leave the old ones as history.
    Resend,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Edit => "edit",
            DisplayMode::ResendAndDelete => "resend_and_delete",
            DisplayMode::Resend => "resend",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "edit" => Some(DisplayMode::Edit),
            "resend_and_delete" => Some(DisplayMode::ResendAndDelete),
            "resend" => Some(DisplayMode::Resend),
            _ => None,
        }
    }
}

/// Queue state as of one read of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub queue: QueueRecord,
    /// Entries in line order.
    pub entries: Vec<MemberEntry>,
}

/// Storage the display scheduler reads snapshots from and records bindings in.
#[async_trait]
pub trait DisplayStore: Send + Sync {
    /// Current state of a queue, `None` if the queue no longer exists.
    async fn snapshot(&self, queue: ChannelId) -> Result<Option<QueueSnapshot>, DbError>;

    async fn save_binding(&self, binding: &DisplayBinding) -> Result<(), DbError>;

    async fn drop_binding(&self, queue: ChannelId, surface: ChannelId) -> Result<(), DbError>;
}

#[async_trait]
impl DisplayStore for Database {
    async fn snapshot(&self, queue: ChannelId) -> Result<Option<QueueSnapshot>, DbError> {
        let Some(record) = self.queues().find(queue).await? else {
            return Ok(None);
        };
        let entries = self.members().list_ordered(queue).await?;
        Ok(Some(QueueSnapshot {
            queue: record,
            entries,
        }))
    }

    async fn save_binding(&self, binding: &DisplayBinding) -> Result<(), DbError> {
        self.displays().upsert(binding).await
    }

    async fn drop_binding(&self, queue: ChannelId, surface: ChannelId) -> Result<(), DbError> {
        self.displays().delete(queue, surface).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_text() {
        for mode in [
            DisplayMode::Edit,
            DisplayMode::ResendAndDelete,
            DisplayMode::Resend,
        ] {
            assert_eq!(DisplayMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(DisplayMode::parse("EDIT"), None);
    }
}
