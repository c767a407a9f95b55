// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Runique sync: offline-first storage and backend sync for recorded runs
//!
//! This crate keeps the local run store consistent with the run backend
//! under unreliable connectivity. Writes land locally first; anything the
//! backend did not acknowledge is queued and replayed later.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod scope;
pub mod services;
pub mod session;
pub mod time_utils;

use config::Config;
use db::{Database, SqlitePendingSyncStore, SqliteRunStore};
use error::AppError;
use remote::{HttpRunClient, RemoteRunDataSource, RemoteSession};
use scope::ApplicationScope;
use services::{OfflineFirstRunRepository, RunSyncScheduler, SessionGate, SyncWorker};
use session::{BearerCredential, SessionStorage};
use std::sync::Arc;

/// Shared application state.
pub struct SyncApp {
    pub config: Config,
    pub scope: Arc<ApplicationScope>,
    pub session: Arc<dyn SessionStorage>,
    pub credential: Arc<BearerCredential>,
    pub repository: Arc<OfflineFirstRunRepository>,
    pub scheduler: Arc<RunSyncScheduler>,
    pub gate: SessionGate,
}

impl SyncApp {
    /// Wire the app against the HTTP backend.
    ///
    /// The returned worker must be spawned for scheduled syncs to run.
    pub async fn build(
        config: Config,
        db: &Database,
        session: Arc<dyn SessionStorage>,
    ) -> Result<(Self, SyncWorker), AppError> {
        let credential = Arc::new(BearerCredential::new(Arc::clone(&session)));
        let client = Arc::new(HttpRunClient::new(&config, Arc::clone(&credential))?);
        Self::build_with_remote(config, db, session, credential, client.clone(), client).await
    }

    /// Wire the app against an arbitrary backend.
    pub async fn build_with_remote(
        config: Config,
        db: &Database,
        session: Arc<dyn SessionStorage>,
        credential: Arc<BearerCredential>,
        remote: Arc<dyn RemoteRunDataSource>,
        remote_session: Arc<dyn RemoteSession>,
    ) -> Result<(Self, SyncWorker), AppError> {
        let local = Arc::new(
            SqliteRunStore::new(db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?,
        );
        let pending = Arc::new(SqlitePendingSyncStore::new(db));
        let scope = Arc::new(ApplicationScope::new());

        let (scheduler, signals) = RunSyncScheduler::new(pending.clone(), Arc::clone(&session));
        let scheduler = Arc::new(scheduler);

        let repository = Arc::new(OfflineFirstRunRepository::new(
            local,
            remote,
            remote_session,
            pending,
            Arc::clone(&session),
            scheduler.clone(),
            Arc::clone(&scope),
        ));

        let worker = SyncWorker::new(repository.clone(), signals, &config);
        let gate = SessionGate::new(
            Arc::clone(&session),
            Arc::clone(&credential),
            repository.clone(),
            scheduler.clone(),
        );

        Ok((
            Self {
                config,
                scope,
                session,
                credential,
                repository,
                scheduler,
                gate,
            },
            worker,
        ))
    }
}
