// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync scheduling.
//!
//! `RunSyncScheduler` turns "please sync this eventually" requests into
//! durable pending-sync entries and wakes the `SyncWorker`, which owns the
//! timing policy:
//! - Debounce bursts of requests into one sync pass
//! - Retry with exponential backoff while entries remain queued
//! - Periodic remote fetches

use crate::db::RunPendingSyncStore;
use crate::error::{DataResult, EmptyResult, LocalError};
use crate::models::{DeletedRunSyncEntity, Run, RunId, RunPendingSyncEntity};
use crate::services::run_repository::RunRepository;
use crate::session::SessionStorage;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Operation to be synced with the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncType {
    /// Refresh the local store from the backend every `interval`.
    FetchRuns { interval: Duration },
    CreateRun { run: Run, map_picture: Vec<u8> },
    DeleteRun { run_id: RunId },
}

/// Accepts sync requests.
///
/// A successful `schedule_sync` means the intent is durably queued,
/// independent of when it actually runs.
#[async_trait]
pub trait SyncRunScheduler: Send + Sync {
    async fn schedule_sync(&self, sync_type: SyncType) -> EmptyResult<LocalError>;

    /// Stop all future background sync work (pending wakeups and periodic fetch).
    async fn cancel_all_syncs(&self);
}

/// Signals sent from the scheduler to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSignal {
    SyncPending,
    StartPeriodicFetch(Duration),
    CancelAll,
}

/// Scheduler backed by the pending-sync store and a background worker.
pub struct RunSyncScheduler {
    pending: Arc<dyn RunPendingSyncStore>,
    session: Arc<dyn SessionStorage>,
    signals: mpsc::UnboundedSender<SyncSignal>,
}

impl RunSyncScheduler {
    /// Create a scheduler and the receiving end for its worker.
    pub fn new(
        pending: Arc<dyn RunPendingSyncStore>,
        session: Arc<dyn SessionStorage>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncSignal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        (
            Self {
                pending,
                session,
                signals,
            },
            receiver,
        )
    }

    /// Owner for a new queue entry. Without a session nothing can be queued.
    async fn session_user(&self, run_id: &str) -> DataResult<String, LocalError> {
        match self.session.get().await {
            Some(auth) => Ok(auth.user_id),
            None => {
                tracing::warn!(run_id, "No session, cannot queue sync request");
                Err(LocalError::NoSession)
            }
        }
    }

    fn signal(&self, signal: SyncSignal) {
        if self.signals.send(signal).is_err() {
            // Entries stay queued and are picked up by the next pass
            tracing::debug!("Sync worker not running, signal dropped");
        }
    }
}

#[async_trait]
impl SyncRunScheduler for RunSyncScheduler {
    async fn schedule_sync(&self, sync_type: SyncType) -> EmptyResult<LocalError> {
        match sync_type {
            SyncType::FetchRuns { interval } => {
                tracing::info!(interval_secs = interval.as_secs(), "Scheduling periodic fetch");
                self.signal(SyncSignal::StartPeriodicFetch(interval));
                return Ok(());
            }
            SyncType::CreateRun { run, map_picture } => {
                let Some(run_id) = run.id.clone() else {
                    tracing::error!("Cannot queue a run without an id");
                    return Err(LocalError::Unknown);
                };
                let user_id = self.session_user(&run_id).await?;
                self.pending
                    .upsert_create_pending(&RunPendingSyncEntity {
                        run_id: run_id.clone(),
                        run,
                        map_picture,
                        user_id,
                    })
                    .await?;
                tracing::info!(run_id = %run_id, "Queued run create for sync");
            }
            SyncType::DeleteRun { run_id } => {
                let user_id = self.session_user(&run_id).await?;
                self.pending
                    .upsert_delete_pending(&DeletedRunSyncEntity {
                        run_id: run_id.clone(),
                        user_id,
                    })
                    .await?;
                tracing::info!(run_id = %run_id, "Queued run delete for sync");
            }
        }

        self.signal(SyncSignal::SyncPending);
        Ok(())
    }

    async fn cancel_all_syncs(&self) {
        tracing::info!("Cancelling all scheduled syncs");
        self.signal(SyncSignal::CancelAll);
    }
}

/// Background executor of sync passes and periodic fetches.
pub struct SyncWorker {
    repository: Arc<dyn RunRepository>,
    signals: mpsc::UnboundedReceiver<SyncSignal>,
    debounce: Duration,
    backoff_initial: Duration,
    backoff_max: Duration,
}

impl SyncWorker {
    pub fn new(
        repository: Arc<dyn RunRepository>,
        signals: mpsc::UnboundedReceiver<SyncSignal>,
        config: &crate::config::Config,
    ) -> Self {
        Self {
            repository,
            signals,
            debounce: config.sync_debounce,
            backoff_initial: config.sync_backoff_initial,
            backoff_max: config.sync_backoff_max.max(config.sync_backoff_initial),
        }
    }

    fn new_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.backoff_initial)
            .with_multiplier(2.0)
            .with_randomization_factor(0.2)
            .with_max_interval(self.backoff_max)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Process signals until every scheduler handle is dropped.
    pub async fn run(mut self) {
        let mut sync_due: Option<Instant> = None;
        let mut fetch_timer: Option<Interval> = None;
        let mut backoff = self.new_backoff();

        tracing::info!("Sync worker started");

        loop {
            tokio::select! {
                signal = self.signals.recv() => match signal {
                    Some(SyncSignal::SyncPending) => {
                        // Later requests push the pass back (debounce)
                        sync_due = Some(Instant::now() + self.debounce);
                        backoff.reset();
                    }
                    Some(SyncSignal::StartPeriodicFetch(interval)) => {
                        let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
                        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        fetch_timer = Some(timer);
                    }
                    Some(SyncSignal::CancelAll) => {
                        sync_due = None;
                        fetch_timer = None;
                        backoff.reset();
                    }
                    None => break,
                },
                _ = sleep_until(sync_due) => {
                    sync_due = None;
                    if self.run_sync_pass().await {
                        backoff.reset();
                    } else {
                        sync_due = backoff.next_backoff().map(|delay| {
                            tracing::info!(retry_in_ms = delay.as_millis() as u64, "Scheduling sync retry");
                            Instant::now() + delay
                        });
                    }
                },
                _ = tick(&mut fetch_timer) => {
                    if let Err(e) = self.repository.fetch_runs().await {
                        tracing::warn!(error = %e, "Periodic fetch failed");
                    }
                },
            }
        }

        tracing::info!("Sync worker stopped");
    }

    /// Run one pass; returns true when nothing is left queued.
    async fn run_sync_pass(&self) -> bool {
        match self.repository.sync_pending_runs().await {
            Ok(report) => {
                if report.requires_reauth {
                    tracing::warn!("Sync rejected as unauthorized, waiting for sign-in");
                }
                report.is_complete_success()
            }
            Err(e) => {
                tracing::error!(error = %e, "Sync pass failed on local storage");
                false
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
