//! Queue settings and teardown.

use super::super::{ActorState, QueueActor, QueueSetting};
use crate::db::QueueRecord;
use crate::display::DisplayMode;
use crate::error::{QueueError, QueueResult};
use tracing::info;

impl QueueActor {
    pub(crate) async fn handle_configure(&mut self, setting: QueueSetting) -> QueueResult<QueueRecord> {
        let name = setting.name();
        let fills = matches!(setting, QueueSetting::AutoFill(true) | QueueSetting::Target(Some(_)));
        let to_edit = matches!(setting, QueueSetting::DisplayMode(DisplayMode::Edit))
            && self.record.display_mode != DisplayMode::Edit;

        let mut updated = self.record.clone();
        setting.apply(&mut updated);
        if !self.ctx.db.queues().update(&updated).await? {
            return Err(QueueError::NoSuchQueue(self.channel_id));
        }
        self.record = updated;
        self.touch();
        info!(queue = self.channel_id, setting = name, "Queue setting changed");

        if to_edit {
            self.ctx.display.collapse(self.channel_id).await;
        }

        if fills {
            self.handle_auto_fill().await;
        }
        Ok(self.record.clone())
    }

    /// Delete the queue with all of its entries and stop accepting events.
    pub(crate) async fn handle_destroy(&mut self) -> QueueResult<()> {
        let entries = self.ctx.db.members().list_ordered(self.channel_id).await?;
        if !self.ctx.db.queues().delete(self.channel_id).await? {
            return Err(QueueError::NoSuchQueue(self.channel_id));
        }
        self.state = ActorState::Draining;

        self.ctx.grace.cancel_queue(self.channel_id);
        for entry in &entries {
            self.release_effects(entry.member_id).await;
        }
        self.ctx.display.forget(self.channel_id).await;
        info!(queue = self.channel_id, dropped = entries.len(), "Queue deleted");
        Ok(())
    }
}
