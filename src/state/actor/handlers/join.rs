//! Join handling.
//!
//! Appends a member to the line, honouring the lock and size limit.

use super::super::QueueActor;
use crate::db::{DbError, MemberEntry};
use crate::error::{QueueError, QueueResult};
use crate::platform::MemberId;
use tracing::info;

impl QueueActor {
    pub(crate) async fn handle_join(
        &mut self,
        member: MemberId,
        priority: bool,
    ) -> QueueResult<MemberEntry> {
        if member == self.ctx.controller_id {
            return Err(QueueError::Internal("the controller cannot queue".into()));
        }
        if self.record.locked {
            return Err(QueueError::Locked);
        }
        if let Some(limit) = self.record.size_limit {
            let size = self.ctx.db.members().count(self.channel_id).await?;
            if size >= limit {
                return Err(QueueError::Full);
            }
        }

        let entry = self
            .ctx
            .db
            .members()
            .insert(self.channel_id, member, priority)
            .await
            .map_err(|e| match e {
                DbError::MemberExists(_) => QueueError::AlreadyQueued,
                other => other.into(),
            })?;

        self.apply_waiting_effects(member).await;
        self.touch();
        info!(
            queue = self.channel_id,
            member,
            priority,
            order_key = entry.order_key,
            "Member joined queue"
        );
        Ok(entry)
    }
}
