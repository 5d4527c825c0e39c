//! Queue repository for database queries.

use super::models::{QueueKind, QueueRecord};
use crate::db::DbError;
use crate::display::DisplayMode;
use crate::platform::ChannelId;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const COLUMNS: &str = "channel_id, kind, header, color, size_limit, pull_count, partial_pull, \
     grace_period, locked, mute_on_join, auto_fill, role_id, target_channel_id, display_mode, \
     created_at";

/// Repository for queue operations.
pub struct QueueRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> QueueRepository<'a> {
    /// Create a new queue repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a queue.
    pub async fn insert(&self, record: &QueueRecord) -> Result<(), DbError> {
        sqlx::query(&format!(
            "INSERT INTO queues ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.channel_id)
        .bind(record.kind.as_str())
        .bind(&record.header)
        .bind(record.color as i64)
        .bind(record.size_limit.map(|l| l as i64))
        .bind(record.pull_count as i64)
        .bind(record.partial_pull)
        .bind(record.grace_period as i64)
        .bind(record.locked)
        .bind(record.mute_on_join)
        .bind(record.auto_fill)
        .bind(record.role_id)
        .bind(record.target_channel_id)
        .bind(record.display_mode.as_str())
        .bind(record.created_at)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return DbError::QueueExists(record.channel_id);
            }
            DbError::from(e)
        })?;
        Ok(())
    }

    /// Overwrite every setting of an existing queue.
    ///
    /// Returns `false` when no queue is bound to the channel.
    pub async fn update(&self, record: &QueueRecord) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE queues
            SET kind = ?, header = ?, color = ?, size_limit = ?, pull_count = ?,
                partial_pull = ?, grace_period = ?, locked = ?, mute_on_join = ?,
                auto_fill = ?, role_id = ?, target_channel_id = ?, display_mode = ?
            WHERE channel_id = ?
            "#,
        )
        .bind(record.kind.as_str())
        .bind(&record.header)
        .bind(record.color as i64)
        .bind(record.size_limit.map(|l| l as i64))
        .bind(record.pull_count as i64)
        .bind(record.partial_pull)
        .bind(record.grace_period as i64)
        .bind(record.locked)
        .bind(record.mute_on_join)
        .bind(record.auto_fill)
        .bind(record.role_id)
        .bind(record.target_channel_id)
        .bind(record.display_mode.as_str())
        .bind(record.channel_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find the queue bound to a channel.
    pub async fn find(&self, channel_id: ChannelId) -> Result<Option<QueueRecord>, DbError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM queues WHERE channel_id = ?"
        ))
        .bind(channel_id)
        .fetch_optional(self.pool)
        .await?;

        row.as_ref().map(queue_from_row).transpose()
    }

    /// Load every queue.
    pub async fn load_all(&self) -> Result<Vec<QueueRecord>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM queues ORDER BY channel_id"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(queue_from_row).collect()
    }

    /// Queues using `channel_id` as their auto-fill target.
    pub async fn find_by_target(&self, channel_id: ChannelId) -> Result<Vec<QueueRecord>, DbError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM queues WHERE target_channel_id = ? AND auto_fill = 1"
        ))
        .bind(channel_id)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(queue_from_row).collect()
    }

    /// Delete a queue along with its members and display bindings.
    pub async fn delete(&self, channel_id: ChannelId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM queues WHERE channel_id = ?")
            .bind(channel_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn queue_from_row(row: &SqliteRow) -> Result<QueueRecord, DbError> {
    let kind: String = row.try_get("kind")?;
    let mode: String = row.try_get("display_mode")?;
    let size_limit: Option<i64> = row.try_get("size_limit")?;

    Ok(QueueRecord {
        channel_id: row.try_get("channel_id")?,
        kind: QueueKind::parse(&kind)
            .ok_or_else(|| DbError::Corrupt(format!("unknown queue kind {kind}")))?,
        header: row.try_get("header")?,
        color: row.try_get::<i64, _>("color")? as u32,
        size_limit: size_limit.map(|l| l.max(0) as usize),
        pull_count: row.try_get::<i64, _>("pull_count")?.max(1) as u32,
        partial_pull: row.try_get("partial_pull")?,
        grace_period: row.try_get::<i64, _>("grace_period")?.max(0) as u64,
        locked: row.try_get("locked")?,
        mute_on_join: row.try_get("mute_on_join")?,
        auto_fill: row.try_get("auto_fill")?,
        role_id: row.try_get("role_id")?,
        target_channel_id: row.try_get("target_channel_id")?,
        display_mode: DisplayMode::parse(&mode)
            .ok_or_else(|| DbError::Corrupt(format!("unknown display mode {mode}")))?,
        created_at: row.try_get("created_at")?,
    })
}
