// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Offline-first run repository.
//!
//! The local store is authoritative for reads. Writes go to the local store
//! first and then to the backend; a backend failure is turned into a
//! pending-sync entry instead of an error, so saving or deleting a run only
//! fails when the device itself cannot record it.
//!
//! Operations on the same run id are serialized with a per-run lock, and
//! sync passes are serialized with a pass lock.

use crate::db::{LocalRunDataSource, RunPendingSyncStore};
use crate::error::{DataError, DataResult, EmptyResult, LocalError, NetworkError};
use crate::models::{Run, RunId};
use crate::remote::{RemoteRunDataSource, RemoteSession};
use crate::scope::ApplicationScope;
use crate::services::scheduler::{SyncRunScheduler, SyncType};
use crate::session::SessionStorage;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::stream::BoxStream;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-run-id locks shared by writes and replays of the same run.
pub type RunLocks = DashMap<RunId, Arc<Mutex<()>>>;

/// Run operations exposed to the rest of the application.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Current run list, newest first. Emits the latest snapshot on subscribe.
    fn get_runs(&self) -> BoxStream<'static, Vec<Run>>;

    /// Pull all runs from the backend into the local store.
    async fn fetch_runs(&self) -> EmptyResult<DataError>;

    /// Save a run. Succeeds once the run and, if needed, its sync intent are stored locally.
    async fn upsert_run(&self, run: &Run, map_picture: &[u8]) -> EmptyResult<DataError>;

    async fn delete_run(&self, id: &str) -> EmptyResult<LocalError>;

    /// Replay every pending entry of the signed-in user once.
    async fn sync_pending_runs(&self) -> DataResult<SyncReport, LocalError>;

    /// Log out at the backend. The bearer credential is cleared either way.
    async fn logout(&self) -> EmptyResult<NetworkError>;

    async fn delete_all_runs(&self) -> EmptyResult<LocalError>;
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pending creates acknowledged by the backend.
    pub created: u32,
    /// Pending deletes acknowledged by the backend.
    pub deleted: u32,
    /// Run ids whose create is still queued.
    pub failed_creates: Vec<RunId>,
    /// Run ids whose delete is still queued.
    pub failed_deletes: Vec<RunId>,
    /// True if any attempt was rejected as unauthorized.
    pub requires_reauth: bool,
}

impl SyncReport {
    /// Returns true if nothing is left queued after the pass.
    pub fn is_complete_success(&self) -> bool {
        self.failed_creates.is_empty() && self.failed_deletes.is_empty()
    }

    /// Returns true if there was work and none of it succeeded.
    pub fn is_complete_failure(&self) -> bool {
        self.created == 0 && self.deleted == 0 && self.remaining() > 0
    }

    /// Returns true if some entries synced and some are still queued.
    pub fn is_partial_failure(&self) -> bool {
        (self.created > 0 || self.deleted > 0) && self.remaining() > 0
    }

    /// Number of entries still queued.
    pub fn remaining(&self) -> usize {
        self.failed_creates.len() + self.failed_deletes.len()
    }
}

/// Drop the lock entry for a run nobody else is waiting on.
fn release_run_lock(locks: &RunLocks, run_id: &str) {
    locks.remove_if(run_id, |_, lock| Arc::strong_count(lock) == 1);
}

/// Outcome of replaying a single pending entry.
enum Replay {
    Synced,
    /// Entry vanished (deleted or superseded) before the lock was taken.
    Skipped,
    Failed(NetworkError),
}

/// Repository combining the local store, pending queue and backend.
pub struct OfflineFirstRunRepository {
    local: Arc<dyn LocalRunDataSource>,
    remote: Arc<dyn RemoteRunDataSource>,
    remote_session: Arc<dyn RemoteSession>,
    pending: Arc<dyn RunPendingSyncStore>,
    session: Arc<dyn SessionStorage>,
    scheduler: Arc<dyn SyncRunScheduler>,
    scope: Arc<ApplicationScope>,
    run_locks: Arc<RunLocks>,
    sync_pass: Mutex<()>,
}

impl OfflineFirstRunRepository {
    pub fn new(
        local: Arc<dyn LocalRunDataSource>,
        remote: Arc<dyn RemoteRunDataSource>,
        remote_session: Arc<dyn RemoteSession>,
        pending: Arc<dyn RunPendingSyncStore>,
        session: Arc<dyn SessionStorage>,
        scheduler: Arc<dyn SyncRunScheduler>,
        scope: Arc<ApplicationScope>,
    ) -> Self {
        Self {
            local,
            remote,
            remote_session,
            pending,
            session,
            scheduler,
            scope,
            run_locks: Arc::new(DashMap::new()),
            sync_pass: Mutex::new(()),
        }
    }

    fn run_lock(&self, run_id: &str) -> Arc<Mutex<()>> {
        self.run_locks
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of run ids that currently have a lock entry.
    pub fn tracked_run_locks(&self) -> usize {
        self.run_locks.len()
    }

    fn release_run_lock(&self, run_id: &str) {
        release_run_lock(&self.run_locks, run_id);
    }

    /// Run `op` while holding the lock for `run_id`.
    async fn with_run_lock<T>(&self, run_id: &str, op: impl Future<Output = T>) -> T {
        let lock = self.run_lock(run_id);
        let output = {
            let _guard = lock.lock().await;
            op.await
        };
        drop(lock);
        self.release_run_lock(run_id);
        output
    }

    /// Store the backend's canonical run, replacing the local copy under `local_id`.
    async fn store_canonical(&self, local_id: &str, canonical: Run) -> EmptyResult<LocalError> {
        let canonical = match canonical.id.as_deref() {
            Some(server_id) if server_id != local_id => {
                tracing::info!(local_id, server_id, "Backend assigned a new run id");
                self.local.delete_run(local_id).await?;
                canonical
            }
            Some(_) => canonical,
            None => canonical.with_id(local_id),
        };
        self.local.upsert_run(&canonical).await?;
        Ok(())
    }

    async fn save_and_push(&self, run: &Run, map_picture: &[u8]) -> EmptyResult<DataError> {
        let run_id = run.id.clone().unwrap_or_default();

        // ─────────────────────────────────────────────────────────────
        // STEP 1: Local write (visible to subscribers immediately)
        // ─────────────────────────────────────────────────────────────
        if let Err(e) = self.local.upsert_run(run).await {
            tracing::error!(run_id = %run_id, error = %e, "Failed to store run locally");
            return Err(e.into());
        }

        // ─────────────────────────────────────────────────────────────
        // STEP 2: Remote write
        // ─────────────────────────────────────────────────────────────
        let error = match self.remote.post_run(run, map_picture).await {
            Ok(canonical) => {
                self.store_canonical(&run_id, canonical).await?;
                // Older queued intents for this run are now stale
                self.pending.delete_create_pending_by_id(&run_id).await?;
                self.pending.delete_delete_pending_by_id(&run_id).await?;
                tracing::info!(run_id = %run_id, "Run saved and synced");
                return Ok(());
            }
            Err(e) => e,
        };

        // ─────────────────────────────────────────────────────────────
        // STEP 3: Queue the create and wait until it is durable
        // ─────────────────────────────────────────────────────────────
        tracing::info!(run_id = %run_id, error = %error, "Backend unavailable, queueing run for sync");
        let scheduler = Arc::clone(&self.scheduler);
        let sync = SyncType::CreateRun {
            run: run.clone(),
            map_picture: map_picture.to_vec(),
        };
        let queued = match self
            .scope
            .run_to_completion(async move { scheduler.schedule_sync(sync).await })
            .await
        {
            Some(result) => result,
            None => {
                tracing::error!(run_id = %run_id, "Application scope shut down while queueing run");
                Err(LocalError::Unknown)
            }
        };

        // An unconfirmed run must not stay visible without a queued create
        if let Err(e) = queued {
            if let Err(rollback) = self.local.delete_run(&run_id).await {
                tracing::error!(run_id = %run_id, error = %rollback, "Failed to roll back unqueued run");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Delete locally and at the backend while holding the run's lock.
    ///
    /// The guard moves into the background enqueue of a failed delete, so a
    /// later write of the same run only proceeds once the delete is queued.
    async fn remove_and_push(
        &self,
        id: &str,
        guard: OwnedMutexGuard<()>,
    ) -> EmptyResult<LocalError> {
        // Created and deleted without ever reaching the backend
        if self.pending.get_create_pending_by_id(id).await?.is_some() {
            self.pending.delete_create_pending_by_id(id).await?;
            self.local.delete_run(id).await?;
            tracing::info!(run_id = %id, "Dropped unsynced run without contacting backend");
            return Ok(());
        }

        self.local.delete_run(id).await?;

        if let Err(e) = self.remote.delete_run(id).await {
            tracing::info!(run_id = %id, error = %e, "Backend unavailable, queueing run delete");
            let scheduler = Arc::clone(&self.scheduler);
            let run_locks = Arc::clone(&self.run_locks);
            let run_id = id.to_string();
            self.scope.launch(async move {
                let sync = SyncType::DeleteRun {
                    run_id: run_id.clone(),
                };
                if let Err(e) = scheduler.schedule_sync(sync).await {
                    tracing::error!(run_id = %run_id, error = %e, "Failed to queue run delete");
                }
                drop(guard);
                release_run_lock(&run_locks, &run_id);
            });
        }
        Ok(())
    }

    async fn replay_create(&self, run_id: &str) -> DataResult<Replay, LocalError> {
        // A delete or a newer write may have replaced the entry while we waited
        let Some(entity) = self.pending.get_create_pending_by_id(run_id).await? else {
            return Ok(Replay::Skipped);
        };

        match self.remote.post_run(&entity.run, &entity.map_picture).await {
            Ok(canonical) => {
                self.store_canonical(run_id, canonical).await?;
                self.pending.delete_create_pending_by_id(run_id).await?;
                tracing::info!(run_id, "Replayed pending run create");
                Ok(Replay::Synced)
            }
            Err(e) => {
                tracing::warn!(run_id, error = %e, "Pending run create failed, keeping it queued");
                Ok(Replay::Failed(e))
            }
        }
    }

    async fn replay_delete(&self, run_id: &str) -> DataResult<Replay, LocalError> {
        if self.pending.get_delete_pending_by_id(run_id).await?.is_none() {
            return Ok(Replay::Skipped);
        }

        match self.remote.delete_run(run_id).await {
            Ok(()) => {
                self.pending.delete_delete_pending_by_id(run_id).await?;
                tracing::info!(run_id, "Replayed pending run delete");
                Ok(Replay::Synced)
            }
            Err(e) => {
                tracing::warn!(run_id, error = %e, "Pending run delete failed, keeping it queued");
                Ok(Replay::Failed(e))
            }
        }
    }
}

#[async_trait]
impl RunRepository for OfflineFirstRunRepository {
    fn get_runs(&self) -> BoxStream<'static, Vec<Run>> {
        self.local.get_runs()
    }

    async fn fetch_runs(&self) -> EmptyResult<DataError> {
        let runs = self.remote.get_runs().await?;

        // Runs deleted here but not yet at the backend must stay hidden
        let hidden: HashSet<RunId> = match self.session.get().await {
            Some(auth) => self
                .pending
                .get_all_delete_pending(&auth.user_id)
                .await?
                .into_iter()
                .map(|entity| entity.run_id)
                .collect(),
            None => HashSet::new(),
        };

        let fetched = runs.len();
        let runs: Vec<Run> = runs
            .into_iter()
            .filter(|run| !run.id.as_ref().is_some_and(|id| hidden.contains(id)))
            .collect();

        self.local.upsert_runs(&runs).await?;
        tracing::info!(fetched, stored = runs.len(), "Fetched runs from backend");
        Ok(())
    }

    async fn upsert_run(&self, run: &Run, map_picture: &[u8]) -> EmptyResult<DataError> {
        let run_id = run
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let run = run.with_id(run_id.clone());

        self.with_run_lock(&run_id, self.save_and_push(&run, map_picture))
            .await
    }

    async fn delete_run(&self, id: &str) -> EmptyResult<LocalError> {
        let guard = self.run_lock(id).lock_owned().await;
        let result = self.remove_and_push(id, guard).await;
        self.release_run_lock(id);
        result
    }

    async fn sync_pending_runs(&self) -> DataResult<SyncReport, LocalError> {
        let _pass = self.sync_pass.lock().await;

        let Some(auth) = self.session.get().await else {
            tracing::debug!("No session, skipping sync pass");
            return Ok(SyncReport::default());
        };

        let (creates, deletes) = tokio::try_join!(
            self.pending.get_all_create_pending(&auth.user_id),
            self.pending.get_all_delete_pending(&auth.user_id),
        )?;

        if creates.is_empty() && deletes.is_empty() {
            return Ok(SyncReport::default());
        }

        tracing::info!(
            creates = creates.len(),
            deletes = deletes.len(),
            "Starting sync pass"
        );

        let create_ids: Vec<RunId> = creates.into_iter().map(|e| e.run_id).collect();
        let delete_ids: Vec<RunId> = deletes.into_iter().map(|e| e.run_id).collect();

        let (create_results, delete_results) = tokio::join!(
            join_all(
                create_ids
                    .iter()
                    .map(|id| self.with_run_lock(id, self.replay_create(id)))
            ),
            join_all(
                delete_ids
                    .iter()
                    .map(|id| self.with_run_lock(id, self.replay_delete(id)))
            ),
        );

        let mut report = SyncReport::default();
        let mut local_failure = None;

        for (run_id, result) in create_ids.into_iter().zip(create_results) {
            match result {
                Ok(Replay::Synced) => report.created += 1,
                Ok(Replay::Skipped) => {}
                Ok(Replay::Failed(e)) => {
                    report.requires_reauth |= e.requires_reauth();
                    report.failed_creates.push(run_id);
                }
                Err(e) => {
                    report.failed_creates.push(run_id);
                    local_failure.get_or_insert(e);
                }
            }
        }
        for (run_id, result) in delete_ids.into_iter().zip(delete_results) {
            match result {
                Ok(Replay::Synced) => report.deleted += 1,
                Ok(Replay::Skipped) => {}
                Ok(Replay::Failed(e)) => {
                    report.requires_reauth |= e.requires_reauth();
                    report.failed_deletes.push(run_id);
                }
                Err(e) => {
                    report.failed_deletes.push(run_id);
                    local_failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = local_failure {
            tracing::error!(error = %e, "Sync pass hit a local storage failure");
            return Err(e);
        }

        tracing::info!(
            created = report.created,
            deleted = report.deleted,
            remaining = report.remaining(),
            "Sync pass finished"
        );
        Ok(report)
    }

    async fn logout(&self) -> EmptyResult<NetworkError> {
        let result = self.remote_session.logout().await;
        self.remote_session.clear_credential();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Backend logout failed, credential cleared anyway");
        }
        result
    }

    async fn delete_all_runs(&self) -> EmptyResult<LocalError> {
        self.local.delete_all_runs().await?;
        tracing::info!("Deleted all local runs");
        Ok(())
    }
}
