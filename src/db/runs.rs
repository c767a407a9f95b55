// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local run store.
//!
//! The store is the authoritative source for what the user sees. Every
//! successful mutation republishes the full run list (newest first) on a
//! watch channel, so subscribers always start from the latest snapshot.

use crate::db::{tables, Database};
use crate::error::{DataResult, EmptyResult, LocalError};
use crate::models::{Location, Run, RunId};
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;

/// Durable CRUD for runs plus a reactive "all runs" stream.
#[async_trait]
pub trait LocalRunDataSource: Send + Sync {
    /// Stream of the full run list, newest first.
    ///
    /// Yields the current snapshot immediately, then one item per change.
    fn get_runs(&self) -> BoxStream<'static, Vec<Run>>;

    /// Insert or replace a run, assigning a uuid when it has no id.
    async fn upsert_run(&self, run: &Run) -> DataResult<RunId, LocalError>;

    /// Insert or replace many runs in one transaction.
    async fn upsert_runs(&self, runs: &[Run]) -> EmptyResult<LocalError>;

    async fn delete_run(&self, id: &str) -> EmptyResult<LocalError>;

    async fn delete_all_runs(&self) -> EmptyResult<LocalError>;
}

/// SQLite-backed run store.
pub struct SqliteRunStore {
    pool: SqlitePool,
    snapshot: watch::Sender<Vec<Run>>,
    /// Serializes reload+publish so a stale snapshot never overwrites a newer one.
    publish_lock: Mutex<()>,
}

impl SqliteRunStore {
    /// Create the store and load the initial snapshot.
    pub async fn new(db: &Database) -> DataResult<Self, LocalError> {
        let pool = db.pool().clone();
        let initial = load_all(&pool).await?;
        let (snapshot, _) = watch::channel(initial);

        Ok(Self {
            pool,
            snapshot,
            publish_lock: Mutex::new(()),
        })
    }

    /// Reload the run list and publish it to subscribers.
    async fn publish(&self) {
        let _guard = self.publish_lock.lock().await;
        match load_all(&self.pool).await {
            Ok(runs) => {
                self.snapshot.send_replace(runs);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload runs after write");
            }
        }
    }
}

#[async_trait]
impl LocalRunDataSource for SqliteRunStore {
    fn get_runs(&self) -> BoxStream<'static, Vec<Run>> {
        WatchStream::new(self.snapshot.subscribe()).boxed()
    }

    async fn upsert_run(&self, run: &Run) -> DataResult<RunId, LocalError> {
        let id = run
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        upsert_query(&run.with_id(id.clone()))?
            .execute(&self.pool)
            .await?;

        tracing::debug!(run_id = %id, "Run stored locally");
        self.publish().await;
        Ok(id)
    }

    async fn upsert_runs(&self, runs: &[Run]) -> EmptyResult<LocalError> {
        let mut tx = self.pool.begin().await?;
        for run in runs {
            let run = match run.id {
                Some(_) => run.clone(),
                None => run.with_id(uuid::Uuid::new_v4().to_string()),
            };
            upsert_query(&run)?.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::debug!(count = runs.len(), "Runs stored locally");
        self.publish().await;
        Ok(())
    }

    async fn delete_run(&self, id: &str) -> EmptyResult<LocalError> {
        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", tables::RUNS))
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.publish().await;
        Ok(())
    }

    async fn delete_all_runs(&self) -> EmptyResult<LocalError> {
        let result = sqlx::query(&format!("DELETE FROM {}", tables::RUNS))
            .execute(&self.pool)
            .await?;

        tracing::info!(deleted = result.rows_affected(), "Cleared local runs");
        self.publish().await;
        Ok(())
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn upsert_query(run: &Run) -> DataResult<SqliteQuery<'static>, LocalError> {
    let path = serde_json::to_string(&run.path).map_err(|e| {
        tracing::error!(error = %e, "Failed to encode run path");
        LocalError::Unknown
    })?;

    let query = sqlx::query(
        "INSERT OR REPLACE INTO runs (
            id, duration_millis, distance_meters, location_lat, location_long,
            max_speed_kmh, total_elevation_meters, date_time_utc, map_picture_url,
            avg_heart_rate, max_heart_rate, path
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(run.id.clone())
    .bind(run.duration.as_millis() as i64)
    .bind(run.distance_meters)
    .bind(run.location.lat)
    .bind(run.location.long)
    .bind(run.max_speed_kmh)
    .bind(run.total_elevation_meters)
    .bind(format_utc_rfc3339(run.date_time_utc))
    .bind(run.map_picture_url.clone())
    .bind(run.avg_heart_rate.map(i64::from))
    .bind(run.max_heart_rate.map(i64::from))
    .bind(path);

    Ok(query)
}

async fn load_all(pool: &SqlitePool) -> DataResult<Vec<Run>, LocalError> {
    let rows = sqlx::query(&format!(
        "SELECT * FROM {} ORDER BY date_time_utc DESC",
        tables::RUNS
    ))
    .fetch_all(pool)
    .await?;

    let mut runs = Vec::with_capacity(rows.len());
    for row in rows {
        match run_from_row(&row) {
            Ok(run) => runs.push(run),
            // Skip malformed rows rather than hiding every run
            Err(e) => tracing::warn!(error = %e, "Skipping unreadable run row"),
        }
    }
    Ok(runs)
}

fn run_from_row(row: &SqliteRow) -> anyhow::Result<Run> {
    let date: String = row.try_get("date_time_utc")?;
    let path: String = row.try_get("path")?;
    let avg_heart_rate: Option<i64> = row.try_get("avg_heart_rate")?;
    let max_heart_rate: Option<i64> = row.try_get("max_heart_rate")?;
    let duration_millis: i64 = row.try_get("duration_millis")?;

    Ok(Run {
        id: Some(row.try_get("id")?),
        duration: Duration::from_millis(duration_millis.max(0) as u64),
        date_time_utc: parse_utc_rfc3339(&date)?,
        distance_meters: row.try_get("distance_meters")?,
        location: Location {
            lat: row.try_get("location_lat")?,
            long: row.try_get("location_long")?,
        },
        max_speed_kmh: row.try_get("max_speed_kmh")?,
        total_elevation_meters: row.try_get("total_elevation_meters")?,
        map_picture_url: row.try_get("map_picture_url")?,
        avg_heart_rate: avg_heart_rate.map(u32::try_from).transpose()?,
        max_heart_rate: max_heart_rate.map(u32::try_from).transpose()?,
        path: serde_json::from_str(&path)?,
    })
}
