//! Platform wrapper whose moves can be made to fail.

use async_trait::async_trait;
use dashmap::DashSet;
use lineup::platform::local::LocalPlatform;
use lineup::platform::{ChannelId, ChannelPlatform, MemberId, PlatformError, RoleId};
use std::collections::HashSet;
use std::sync::Arc;

pub struct FlakyPlatform {
    inner: Arc<LocalPlatform>,
    refuse_moves: DashSet<MemberId>,
}

impl FlakyPlatform {
    pub fn new(inner: Arc<LocalPlatform>) -> Self {
        Self {
            inner,
            refuse_moves: DashSet::new(),
        }
    }

    /// Every move of `member` fails from now on.
    pub fn refuse_moves_of(&self, member: MemberId) {
        self.refuse_moves.insert(member);
    }
}

#[async_trait]
impl ChannelPlatform for FlakyPlatform {
    async fn list_occupants(&self, channel: ChannelId) -> Result<HashSet<MemberId>, PlatformError> {
        self.inner.list_occupants(channel).await
    }

    async fn move_member(
        &self,
        member: MemberId,
        from: ChannelId,
        to: ChannelId,
    ) -> Result<(), PlatformError> {
        if self.refuse_moves.contains(&member) {
            return Err(PlatformError::Failed("missing permissions".into()));
        }
        self.inner.move_member(member, from, to).await
    }

    async fn connect_controller(&self, channel: ChannelId) -> Result<(), PlatformError> {
        self.inner.connect_controller(channel).await
    }

    async fn channel_capacity(&self, channel: ChannelId) -> Result<Option<usize>, PlatformError> {
        self.inner.channel_capacity(channel).await
    }

    async fn set_muted(&self, member: MemberId, muted: bool) -> Result<(), PlatformError> {
        self.inner.set_muted(member, muted).await
    }

    async fn add_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError> {
        self.inner.add_role(member, role).await
    }

    async fn remove_role(&self, member: MemberId, role: RoleId) -> Result<(), PlatformError> {
        self.inner.remove_role(member, role).await
    }
}
