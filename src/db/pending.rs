// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pending-sync queue.
//!
//! Holds creates and deletes that have not been confirmed by the backend,
//! keyed by run id and tagged with the owning user. A run never has both a
//! pending create and a pending delete: writing one kind removes the other
//! inside the same transaction.

use crate::db::{tables, Database};
use crate::error::{DataResult, EmptyResult, LocalError};
use crate::models::{DeletedRunSyncEntity, RunPendingSyncEntity};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Durable queue of operations owed to the backend.
#[async_trait]
pub trait RunPendingSyncStore: Send + Sync {
    async fn get_all_create_pending(
        &self,
        user_id: &str,
    ) -> DataResult<Vec<RunPendingSyncEntity>, LocalError>;

    async fn get_create_pending_by_id(
        &self,
        run_id: &str,
    ) -> DataResult<Option<RunPendingSyncEntity>, LocalError>;

    async fn upsert_create_pending(&self, entity: &RunPendingSyncEntity)
        -> EmptyResult<LocalError>;

    async fn delete_create_pending_by_id(&self, run_id: &str) -> EmptyResult<LocalError>;

    async fn get_all_delete_pending(
        &self,
        user_id: &str,
    ) -> DataResult<Vec<DeletedRunSyncEntity>, LocalError>;

    async fn get_delete_pending_by_id(
        &self,
        run_id: &str,
    ) -> DataResult<Option<DeletedRunSyncEntity>, LocalError>;

    async fn upsert_delete_pending(&self, entity: &DeletedRunSyncEntity)
        -> EmptyResult<LocalError>;

    async fn delete_delete_pending_by_id(&self, run_id: &str) -> EmptyResult<LocalError>;
}

/// SQLite-backed pending-sync queue.
#[derive(Clone)]
pub struct SqlitePendingSyncStore {
    pool: SqlitePool,
}

impl SqlitePendingSyncStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl RunPendingSyncStore for SqlitePendingSyncStore {
    async fn get_all_create_pending(
        &self,
        user_id: &str,
    ) -> DataResult<Vec<RunPendingSyncEntity>, LocalError> {
        let rows = sqlx::query(&format!(
            "SELECT run_id, run, map_picture, user_id FROM {} WHERE user_id = ?",
            tables::RUN_PENDING_SYNC
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            entities.push(create_pending_from_row(&row)?);
        }
        Ok(entities)
    }

    async fn get_create_pending_by_id(
        &self,
        run_id: &str,
    ) -> DataResult<Option<RunPendingSyncEntity>, LocalError> {
        let row = sqlx::query(&format!(
            "SELECT run_id, run, map_picture, user_id FROM {} WHERE run_id = ?",
            tables::RUN_PENDING_SYNC
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(create_pending_from_row).transpose()
    }

    async fn upsert_create_pending(
        &self,
        entity: &RunPendingSyncEntity,
    ) -> EmptyResult<LocalError> {
        let run = serde_json::to_string(&entity.run).map_err(|e| {
            tracing::error!(run_id = %entity.run_id, error = %e, "Failed to encode pending run");
            LocalError::Unknown
        })?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "DELETE FROM {} WHERE run_id = ?",
            tables::DELETED_RUN_SYNC
        ))
        .bind(&entity.run_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {} (run_id, run, map_picture, user_id) VALUES (?, ?, ?, ?)",
            tables::RUN_PENDING_SYNC
        ))
        .bind(&entity.run_id)
        .bind(run)
        .bind(&entity.map_picture)
        .bind(&entity.user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_create_pending_by_id(&self, run_id: &str) -> EmptyResult<LocalError> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE run_id = ?",
            tables::RUN_PENDING_SYNC
        ))
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_all_delete_pending(
        &self,
        user_id: &str,
    ) -> DataResult<Vec<DeletedRunSyncEntity>, LocalError> {
        let rows = sqlx::query(&format!(
            "SELECT run_id, user_id FROM {} WHERE user_id = ?",
            tables::DELETED_RUN_SYNC
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(delete_pending_from_row).collect()
    }

    async fn get_delete_pending_by_id(
        &self,
        run_id: &str,
    ) -> DataResult<Option<DeletedRunSyncEntity>, LocalError> {
        let row = sqlx::query(&format!(
            "SELECT run_id, user_id FROM {} WHERE run_id = ?",
            tables::DELETED_RUN_SYNC
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(delete_pending_from_row).transpose()
    }

    async fn upsert_delete_pending(
        &self,
        entity: &DeletedRunSyncEntity,
    ) -> EmptyResult<LocalError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "DELETE FROM {} WHERE run_id = ?",
            tables::RUN_PENDING_SYNC
        ))
        .bind(&entity.run_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {} (run_id, user_id) VALUES (?, ?)",
            tables::DELETED_RUN_SYNC
        ))
        .bind(&entity.run_id)
        .bind(&entity.user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_delete_pending_by_id(&self, run_id: &str) -> EmptyResult<LocalError> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE run_id = ?",
            tables::DELETED_RUN_SYNC
        ))
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn create_pending_from_row(row: &SqliteRow) -> DataResult<RunPendingSyncEntity, LocalError> {
    let run_id: String = row.try_get("run_id")?;
    let run: String = row.try_get("run")?;
    let run = serde_json::from_str(&run).map_err(|e| {
        tracing::error!(run_id = %run_id, error = %e, "Failed to decode pending run");
        LocalError::Unknown
    })?;

    Ok(RunPendingSyncEntity {
        run_id,
        run,
        map_picture: row.try_get("map_picture")?,
        user_id: row.try_get("user_id")?,
    })
}

fn delete_pending_from_row(row: &SqliteRow) -> DataResult<DeletedRunSyncEntity, LocalError> {
    Ok(DeletedRunSyncEntity {
        run_id: row.try_get("run_id")?,
        user_id: row.try_get("user_id")?,
    })
}
