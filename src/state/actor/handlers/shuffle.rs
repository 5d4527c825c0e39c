//! Shuffle handling.
//!
//! Permutes the members over the queue's existing order keys. Priority
//! entries still sort ahead, so each tier ends up uniformly shuffled within
//! itself.

use super::super::QueueActor;
use crate::error::QueueResult;
use crate::platform::MemberId;
use rand::seq::SliceRandom;
use tracing::info;

impl QueueActor {
    pub(crate) async fn handle_shuffle(&mut self) -> QueueResult<()> {
        let entries = self.ctx.db.members().list_ordered(self.channel_id).await?;
        if entries.len() < 2 {
            return Ok(());
        }

        let mut keys: Vec<i64> = entries.iter().map(|e| e.order_key).collect();
        keys.sort_unstable();
        let mut members: Vec<MemberId> = entries.iter().map(|e| e.member_id).collect();
        members.shuffle(&mut rand::thread_rng());

        let assignment: Vec<(MemberId, i64)> = members.into_iter().zip(keys).collect();
        self.ctx
            .db
            .members()
            .reorder(self.channel_id, &assignment)
            .await?;

        self.touch();
        info!(queue = self.channel_id, size = assignment.len(), "Queue shuffled");
        Ok(())
    }
}
