//! Member repository for database queries.

use super::models::MemberEntry;
use crate::db::{DbError, now_millis};
use crate::platform::{ChannelId, MemberId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const COLUMNS: &str = "channel_id, member_id, order_key, priority, joined_at, disconnected_at";

/// Repository for queue member operations.
pub struct MemberRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MemberRepository<'a> {
    /// Create a new member repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a member to a queue, assigning the next order key.
    ///
    /// Keys come from the queue row's counter, so a key is never handed out
    /// twice for the same queue, even after the tail leaves or a clear.
    pub async fn insert(
        &self,
        channel_id: ChannelId,
        member_id: MemberId,
        priority: bool,
    ) -> Result<MemberEntry, DbError> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let order_key: i64 = sqlx::query_scalar(
            r#"
            UPDATE queues SET next_order_key = next_order_key + 1
            WHERE channel_id = ?
            RETURNING next_order_key - 1
            "#,
        )
        .bind(channel_id)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO members (channel_id, member_id, order_key, priority, joined_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(channel_id)
        .bind(member_id)
        .bind(order_key)
        .bind(priority)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return DbError::MemberExists(member_id);
            }
            DbError::from(e)
        })?;

        let entry = entry_from_row(&row)?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Find a member's entry.
    pub async fn find(
        &self,
        channel_id: ChannelId,
        member_id: MemberId,
    ) -> Result<Option<MemberEntry>, DbError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM members WHERE channel_id = ? AND member_id = ?"
        ))
        .bind(channel_id)
        .bind(member_id)
        .fetch_optional(self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// Remove one entry, returning it if it existed.
    pub async fn delete(
        &self,
        channel_id: ChannelId,
        member_id: MemberId,
    ) -> Result<Option<MemberEntry>, DbError> {
        let row = sqlx::query(&format!(
            "DELETE FROM members WHERE channel_id = ? AND member_id = ? RETURNING {COLUMNS}"
        ))
        .bind(channel_id)
        .bind(member_id)
        .fetch_optional(self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// Entries in line order: priority first, then by order key, then join time.
    pub async fn list_ordered(&self, channel_id: ChannelId) -> Result<Vec<MemberEntry>, DbError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM members
            WHERE channel_id = ?
            ORDER BY priority DESC, order_key ASC, joined_at ASC
            "#
        ))
        .bind(channel_id)
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn count(&self, channel_id: ChannelId) -> Result<usize, DbError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE channel_id = ?")
            .bind(channel_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Remove exactly the given members in one transaction.
    ///
    /// If any of them is missing nothing is removed.
    pub async fn delete_exact(
        &self,
        channel_id: ChannelId,
        members: &[MemberId],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        for &member_id in members {
            let result = sqlx::query("DELETE FROM members WHERE channel_id = ? AND member_id = ?")
                .bind(channel_id)
                .bind(member_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(DbError::Corrupt(format!(
                    "member {member_id} vanished from queue {channel_id}"
                )));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove whichever of the given members are queued, in one transaction.
    ///
    /// Returns the members actually removed, in the order given.
    pub async fn delete_present(
        &self,
        channel_id: ChannelId,
        members: &[MemberId],
    ) -> Result<Vec<MemberId>, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut removed = Vec::with_capacity(members.len());

        for &member_id in members {
            let result = sqlx::query("DELETE FROM members WHERE channel_id = ? AND member_id = ?")
                .bind(channel_id)
                .bind(member_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 1 {
                removed.push(member_id);
            }
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Assign new order keys in one transaction.
    pub async fn reorder(
        &self,
        channel_id: ChannelId,
        keys: &[(MemberId, i64)],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        for &(member_id, order_key) in keys {
            sqlx::query("UPDATE members SET order_key = ? WHERE channel_id = ? AND member_id = ?")
                .bind(order_key)
                .bind(channel_id)
                .bind(member_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove every entry of a queue, returning the removed members in line order.
    pub async fn clear(&self, channel_id: ChannelId) -> Result<Vec<MemberEntry>, DbError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM members
            WHERE channel_id = ?
            ORDER BY priority DESC, order_key ASC, joined_at ASC
            "#
        ))
        .bind(channel_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM members WHERE channel_id = ?")
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// Put an entry into grace, recording when the member disconnected.
    pub async fn mark_disconnected(
        &self,
        channel_id: ChannelId,
        member_id: MemberId,
        at: i64,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE members SET disconnected_at = ? WHERE channel_id = ? AND member_id = ?",
        )
        .bind(at)
        .bind(channel_id)
        .bind(member_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bring an entry back from grace. The order key is untouched.
    pub async fn mark_connected(
        &self,
        channel_id: ChannelId,
        member_id: MemberId,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE members SET disconnected_at = NULL WHERE channel_id = ? AND member_id = ?",
        )
        .bind(channel_id)
        .bind(member_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<MemberEntry, DbError> {
    Ok(MemberEntry {
        channel_id: row.try_get("channel_id")?,
        member_id: row.try_get("member_id")?,
        order_key: row.try_get("order_key")?,
        priority: row.try_get("priority")?,
        joined_at: row.try_get("joined_at")?,
        disconnected_at: row.try_get("disconnected_at")?,
    })
}
