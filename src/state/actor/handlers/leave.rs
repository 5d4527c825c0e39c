//! Leave, kick and clear handling.
//!
//! All three remove entries immediately, without grace and without any
//! ordering or partial-pull logic.

use super::super::QueueActor;
use crate::db::MemberEntry;
use crate::error::{QueueError, QueueResult};
use crate::platform::MemberId;
use tracing::info;

impl QueueActor {
    pub(crate) async fn handle_leave(&mut self, member: MemberId) -> QueueResult<MemberEntry> {
        let entry = self
            .remove_member(member)
            .await?
            .ok_or(QueueError::NotQueued)?;
        info!(queue = self.channel_id, member, "Member left queue");
        Ok(entry)
    }

    /// Remove the named members. Names that are not queued are skipped; if none
    /// of them is, the kick reports `NotQueued`.
    pub(crate) async fn handle_kick(&mut self, members: Vec<MemberId>) -> QueueResult<Vec<MemberId>> {
        let removed = self
            .ctx
            .db
            .members()
            .delete_present(self.channel_id, &members)
            .await?;
        if removed.is_empty() {
            return Err(QueueError::NotQueued);
        }

        for &member in &removed {
            self.release_effects(member).await;
        }
        self.touch();
        info!(queue = self.channel_id, kicked = ?removed, "Members kicked");
        Ok(removed)
    }

    /// Remove everyone, returning who was removed in line order.
    pub(crate) async fn handle_clear(&mut self) -> QueueResult<Vec<MemberId>> {
        let cleared = self.ctx.db.members().clear(self.channel_id).await?;
        let members: Vec<MemberId> = cleared.iter().map(|e| e.member_id).collect();

        for &member in &members {
            self.release_effects(member).await;
        }
        self.touch();
        info!(queue = self.channel_id, cleared = members.len(), "Queue cleared");
        Ok(members)
    }
}
