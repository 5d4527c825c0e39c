//! Database module for persistent storage.
//!
//! Provides async SQLite database access using SQLx for:
//! - Queue settings, keyed by bound channel
//! - Queue member entries with order keys and grace timestamps
//! - Display bindings (which rendered target shows which queue)
//!
//! The schema is bootstrapped with `CREATE TABLE IF NOT EXISTS` on connect;
//! there is no migration machinery.

mod displays;
mod members;
mod queues;

pub use displays::{DisplayBinding, DisplayRepository};
pub use members::{MemberEntry, MemberRepository, MemberState};
pub use queues::{QueueKind, QueueRecord, QueueRepository};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS queues (
        channel_id INTEGER PRIMARY KEY,
        kind TEXT NOT NULL,
        header TEXT,
        color INTEGER NOT NULL,
        size_limit INTEGER,
        pull_count INTEGER NOT NULL,
        partial_pull INTEGER NOT NULL,
        grace_period INTEGER NOT NULL,
        locked INTEGER NOT NULL DEFAULT 0,
        mute_on_join INTEGER NOT NULL DEFAULT 0,
        auto_fill INTEGER NOT NULL DEFAULT 0,
        role_id INTEGER,
        target_channel_id INTEGER,
        display_mode TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        next_order_key INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS members (
        channel_id INTEGER NOT NULL REFERENCES queues(channel_id) ON DELETE CASCADE,
        member_id INTEGER NOT NULL,
        order_key INTEGER NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        joined_at INTEGER NOT NULL,
        disconnected_at INTEGER,
        PRIMARY KEY (channel_id, member_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS members_by_order
        ON members (channel_id, priority DESC, order_key ASC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS displays (
        channel_id INTEGER NOT NULL REFERENCES queues(channel_id) ON DELETE CASCADE,
        surface_id INTEGER NOT NULL,
        target_id INTEGER NOT NULL,
        content_hash TEXT,
        PRIMARY KEY (channel_id, surface_id)
    )
    "#,
];

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("queue already exists: {0}")]
    QueueExists(i64),
    #[error("member already queued: {0}")]
    MemberExists(i64),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, creating tables if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:lineup-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .foreign_keys(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .foreign_keys(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        // WAL lets display reads proceed while an actor is writing
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        Self::bootstrap(&pool).await?;

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create any missing tables.
    async fn bootstrap(pool: &SqlitePool) -> Result<(), DbError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        info!("Database schema checked");
        Ok(())
    }

    /// Get queue repository.
    pub fn queues(&self) -> QueueRepository<'_> {
        QueueRepository::new(&self.pool)
    }

    /// Get member repository.
    pub fn members(&self) -> MemberRepository<'_> {
        MemberRepository::new(&self.pool)
    }

    /// Get display binding repository.
    pub fn displays(&self) -> DisplayRepository<'_> {
        DisplayRepository::new(&self.pool)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Sqlx(err)
    }
}

/// Milliseconds since the Unix epoch, the unit of every stored timestamp.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
