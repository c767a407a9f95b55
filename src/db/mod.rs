//! Database layer (SQLite).
//!
//! One pool backs both the run table and the pending-sync tables so a single
//! file holds everything the device has durably recorded.

pub mod pending;
pub mod runs;

pub use pending::{RunPendingSyncStore, SqlitePendingSyncStore};
pub use runs::{LocalRunDataSource, SqliteRunStore};

use crate::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Table names as constants.
pub mod tables {
    pub const RUNS: &str = "runs";
    pub const RUN_PENDING_SYNC: &str = "run_pending_sync";
    pub const DELETED_RUN_SYNC: &str = "deleted_run_sync";
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY NOT NULL,
        duration_millis INTEGER NOT NULL,
        distance_meters INTEGER NOT NULL,
        location_lat REAL NOT NULL,
        location_long REAL NOT NULL,
        max_speed_kmh REAL NOT NULL,
        total_elevation_meters INTEGER NOT NULL,
        date_time_utc TEXT NOT NULL,
        map_picture_url TEXT,
        avg_heart_rate INTEGER,
        max_heart_rate INTEGER,
        path TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE INDEX IF NOT EXISTS idx_runs_date ON runs (date_time_utc DESC)",
    "CREATE TABLE IF NOT EXISTS run_pending_sync (
        run_id TEXT PRIMARY KEY NOT NULL,
        run TEXT NOT NULL,
        map_picture BLOB NOT NULL,
        user_id TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_run_pending_sync_user ON run_pending_sync (user_id)",
    "CREATE TABLE IF NOT EXISTS deleted_run_sync (
        run_id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_deleted_run_sync_user ON deleted_run_sync (user_id)",
];

/// SQLite database handle.
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Database(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        tracing::info!(path = %path.display(), "Opened local database");

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Open a private in-memory database (tests and benchmarks).
    ///
    /// Every pooled connection to `:memory:` would see its own empty database,
    /// so the pool is pinned to one connection that never expires.
    pub async fn open_in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::Database(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(format!("Schema init failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
