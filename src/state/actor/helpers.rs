use super::QueueActor;
use crate::db::{MemberEntry, QueueKind};
use crate::display::QueueSnapshot;
use crate::error::QueueResult;
use crate::platform::MemberId;
use tracing::{debug, warn};

impl QueueActor {
    /// Schedule a display refresh for this queue.
    pub(crate) fn touch(&self) {
        self.ctx.display.touch(self.channel_id);
    }

    /// Platform side effects of starting to wait: mute and waiting role.
    ///
    /// Best effort. The entry exists either way.
    pub(crate) async fn apply_waiting_effects(&self, member: MemberId) {
        if self.record.kind == QueueKind::Voice
            && self.record.mute_on_join
            && let Err(e) = self.ctx.platform.set_muted(member, true).await
        {
            warn!(queue = self.channel_id, member, error = %e, "Failed to mute queued member");
        }
        if let Some(role) = self.record.role_id
            && let Err(e) = self.ctx.platform.add_role(member, role).await
        {
            warn!(queue = self.channel_id, member, role, error = %e, "Failed to add queue role");
        }
    }

    /// Undo [`Self::apply_waiting_effects`] for a member who left the queue.
    pub(crate) async fn release_effects(&self, member: MemberId) {
        self.ctx.grace.cancel(self.channel_id, member);
        if self.record.kind == QueueKind::Voice
            && self.record.mute_on_join
            && let Err(e) = self.ctx.platform.set_muted(member, false).await
        {
            debug!(queue = self.channel_id, member, error = %e, "Failed to unmute member");
        }
        if let Some(role) = self.record.role_id
            && let Err(e) = self.ctx.platform.remove_role(member, role).await
        {
            debug!(queue = self.channel_id, member, role, error = %e, "Failed to remove queue role");
        }
    }

    /// Delete one entry and release it. `None` if the member was not queued.
    pub(crate) async fn remove_member(&self, member: MemberId) -> QueueResult<Option<MemberEntry>> {
        let removed = self.ctx.db.members().delete(self.channel_id, member).await?;
        if removed.is_some() {
            self.release_effects(member).await;
            self.touch();
        }
        Ok(removed)
    }

    pub(crate) async fn snapshot(&self) -> QueueResult<QueueSnapshot> {
        let entries = self.ctx.db.members().list_ordered(self.channel_id).await?;
        Ok(QueueSnapshot {
            queue: self.record.clone(),
            entries,
        })
    }
}
