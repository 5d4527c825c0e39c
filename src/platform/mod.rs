//! Chat-platform collaborator abstractions.
//!
//! The engine never talks to a chat client directly. It sees channels, members
//! and roles as plain identifiers and asks the platform to act on them through
//! [`ChannelPlatform`] and [`RenderSurface`].

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

pub mod local;

/// Identifier of a channel (queues are keyed by their bound channel).
pub type ChannelId = i64;

/// Identifier of a member (a user on the chat platform).
pub type MemberId = i64;

/// Identifier of a role.
pub type RoleId = i64;

/// Identifier of a rendered message or other display target.
pub type TargetId = i64;

/// Failures reported by platform collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The channel, member or target no longer exists.
    #[error("gone")]
    Gone,
    /// Anything else: permissions, timeouts, transport errors.
    #[error("{0}")]
    Failed(String),
}

/// Channel-membership collaborator.
#[async_trait]
pub trait ChannelPlatform: Send + Sync {
    /// Members currently present in a channel.
    async fn list_occupants(&self, channel: ChannelId) -> Result<HashSet<MemberId>, PlatformError>;

    /// Move a member between voice channels.
    async fn move_member(
        &self,
        member: MemberId,
        from: ChannelId,
        to: ChannelId,
    ) -> Result<(), PlatformError>;

    /// Bring the controller (the bot itself) into a channel.
    async fn connect_controller(&self, channel: ChannelId) -> Result<(), PlatformError>;

    /// User limit of a channel, `None` when unlimited.
    async fn channel_capacity(&self, _channel: ChannelId) -> Result<Option<usize>, PlatformError> {
        Ok(None)
    }

    async fn set_muted(&self, _member: MemberId, _muted: bool) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn add_role(&self, _member: MemberId, _role: RoleId) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn remove_role(&self, _member: MemberId, _role: RoleId) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// Render-surface collaborator.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Post new content on a surface (a text channel), returning the target id.
    async fn create_target(
        &self,
        surface: ChannelId,
        content: &str,
    ) -> Result<TargetId, PlatformError>;

    /// Replace the content of an existing target.
    async fn update_target(&self, target: TargetId, content: &str) -> Result<(), PlatformError>;

    async fn delete_target(&self, target: TargetId) -> Result<(), PlatformError>;
}
