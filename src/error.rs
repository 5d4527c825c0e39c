//! Unified error handling for lineup.
//!
//! Every failure a queue operation can report lives in [`QueueError`]. All of
//! them are recoverable: the dispatcher hands them back to whoever issued the
//! intent so they can be turned into a user-facing message.

use crate::db::DbError;
use crate::platform::PlatformError;
use thiserror::Error;

// ============================================================================
// Queue Errors (actor operations)
// ============================================================================

/// Queue operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("member is already queued")]
    AlreadyQueued,

    #[error("member is not queued")]
    NotQueued,

    #[error("queue is empty")]
    Empty,

    #[error("not enough members queued: {available} available, {requested} requested")]
    InsufficientMembers { available: usize, requested: usize },

    #[error("destination is full")]
    DestinationFull,

    #[error("queue is locked")]
    Locked,

    #[error("queue is full")]
    Full,

    #[error("target is gone")]
    Gone,

    #[error("no queue is bound to channel {0}")]
    NoSuchQueue(i64),

    #[error("a queue is already bound to channel {0}")]
    QueueExists(i64),

    #[error("queue {0} is not a voice queue")]
    NotVoice(i64),

    #[error("platform error: {0}")]
    Platform(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyQueued => "already_queued",
            Self::NotQueued => "not_queued",
            Self::Empty => "empty",
            Self::InsufficientMembers { .. } => "insufficient_members",
            Self::DestinationFull => "destination_full",
            Self::Locked => "locked",
            Self::Full => "full",
            Self::Gone => "gone",
            Self::NoSuchQueue(_) => "no_such_queue",
            Self::QueueExists(_) => "queue_exists",
            Self::NotVoice(_) => "not_voice",
            Self::Platform(_) => "platform_error",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Text suitable for showing to the member or operator who caused the error.
    ///
    /// Returns `None` for failures that are not the caller's business (storage
    /// and internal errors); those are logged instead.
    pub fn user_message(&self) -> Option<String> {
        let text = match self {
            Self::AlreadyQueued => "You are already in this queue.".to_string(),
            Self::NotQueued => "You are not in this queue.".to_string(),
            Self::Empty => "The queue is empty.".to_string(),
            Self::InsufficientMembers {
                available,
                requested,
            } => format!(
                "Cannot pull {requested}: only {available} queued and partial pulls are disabled."
            ),
            Self::DestinationFull => "The destination channel is full.".to_string(),
            Self::Locked => "The queue is locked.".to_string(),
            Self::Full => "The queue is full.".to_string(),
            Self::Gone => "That channel or message no longer exists.".to_string(),
            Self::NoSuchQueue(_) => "There is no queue in that channel.".to_string(),
            Self::QueueExists(_) => "That channel already has a queue.".to_string(),
            Self::NotVoice(_) => "Voice transfers need a voice queue.".to_string(),
            Self::Platform(_) => "Could not move members, nothing was changed.".to_string(),

            Self::Storage(_) => return None,
            Self::Internal(_) => return None,
        };
        Some(text)
    }

    /// Whether the error reflects queue state rather than a broken collaborator.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Self::Platform(_) | Self::Storage(_) | Self::Internal(_)
        )
    }
}

impl From<DbError> for QueueError {
    fn from(err: DbError) -> Self {
        QueueError::Storage(err.to_string())
    }
}

impl From<PlatformError> for QueueError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Gone => QueueError::Gone,
            PlatformError::Failed(reason) => QueueError::Platform(reason),
        }
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
