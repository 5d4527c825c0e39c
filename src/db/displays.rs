//! Display binding repository.
//!
//! A binding records which rendered target currently shows a queue on a given
//! surface, together with the hash of the content last rendered there.

use crate::db::DbError;
use crate::platform::{ChannelId, TargetId};
use sqlx::SqlitePool;

/// A queue display on one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBinding {
    pub channel_id: ChannelId,
    pub surface_id: ChannelId,
    pub target_id: TargetId,
    pub content_hash: Option<String>,
}

/// Repository for display bindings.
pub struct DisplayRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DisplayRepository<'a> {
    /// Create a new display repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create or replace the binding for (queue, surface).
    pub async fn upsert(&self, binding: &DisplayBinding) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO displays (channel_id, surface_id, target_id, content_hash)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (channel_id, surface_id)
            DO UPDATE SET target_id = excluded.target_id, content_hash = excluded.content_hash
            "#,
        )
        .bind(binding.channel_id)
        .bind(binding.surface_id)
        .bind(binding.target_id)
        .bind(&binding.content_hash)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Bindings of one queue.
    pub async fn list(&self, channel_id: ChannelId) -> Result<Vec<DisplayBinding>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, Option<String>)>(
            r#"
            SELECT channel_id, surface_id, target_id, content_hash
            FROM displays
            WHERE channel_id = ?
            ORDER BY surface_id
            "#,
        )
        .bind(channel_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(binding_from_tuple).collect())
    }

    /// Every binding, for loading at startup.
    pub async fn load_all(&self) -> Result<Vec<DisplayBinding>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, Option<String>)>(
            r#"
            SELECT channel_id, surface_id, target_id, content_hash
            FROM displays
            ORDER BY channel_id, surface_id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(binding_from_tuple).collect())
    }

    /// Drop the binding for (queue, surface).
    pub async fn delete(&self, channel_id: ChannelId, surface_id: ChannelId) -> Result<(), DbError> {
        sqlx::query("DELETE FROM displays WHERE channel_id = ? AND surface_id = ?")
            .bind(channel_id)
            .bind(surface_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

fn binding_from_tuple(
    (channel_id, surface_id, target_id, content_hash): (i64, i64, i64, Option<String>),
) -> DisplayBinding {
    DisplayBinding {
        channel_id,
        surface_id,
        target_id,
        content_hash,
    }
}
