// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use runique_sync::config::Config;
use runique_sync::db::{Database, LocalRunDataSource, SqlitePendingSyncStore, SqliteRunStore};
use runique_sync::error::{DataResult, EmptyResult, NetworkError};
use runique_sync::models::{AuthInfo, Location, Run, RunId};
use runique_sync::remote::{RemoteRunDataSource, RemoteSession};
use runique_sync::scope::ApplicationScope;
use runique_sync::services::{
    OfflineFirstRunRepository, RunRepository, RunSyncScheduler, SyncSignal,
};
use runique_sync::session::{MemorySessionStorage, SessionStorage};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TEST_USER: &str = "user-1";

/// Session for the default test user.
#[allow(dead_code)]
pub fn test_auth() -> AuthInfo {
    AuthInfo {
        access_token: "access-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        user_id: TEST_USER.to_string(),
    }
}

/// A run on the given day of June 2024 without an id.
#[allow(dead_code)]
pub fn sample_run(day: u32) -> Run {
    Run {
        id: None,
        duration: Duration::from_secs(1800 + day as u64),
        date_time_utc: Utc.with_ymd_and_hms(2024, 6, day, 7, 0, 0).unwrap(),
        distance_meters: 5000 + day as i32,
        location: Location {
            lat: 37.39,
            long: -122.08,
        },
        max_speed_kmh: 14.5,
        total_elevation_meters: 40,
        map_picture_url: None,
        avg_heart_rate: Some(150),
        max_heart_rate: Some(172),
        path: vec![],
    }
}

/// In-memory backend with an online switch and call recording.
#[allow(dead_code)]
pub struct FakeRemote {
    online: AtomicBool,
    /// Error returned while offline
    failure: Mutex<NetworkError>,
    /// When set, created runs get a `srv-` prefixed id
    assign_server_ids: AtomicBool,
    post_delay: Mutex<Duration>,
    server_runs: Mutex<Vec<Run>>,
    post_calls: Mutex<Vec<RunId>>,
    delete_calls: Mutex<Vec<RunId>>,
    logout_result: Mutex<EmptyResult<NetworkError>>,
    logout_calls: AtomicU32,
    credential_cleared: AtomicBool,
    /// Session observed when the backend logout arrives
    watched_session: Mutex<Option<Arc<MemorySessionStorage>>>,
    signed_in_at_logout: Mutex<Option<bool>>,
}

#[allow(dead_code)]
impl FakeRemote {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            failure: Mutex::new(NetworkError::NoInternet),
            assign_server_ids: AtomicBool::new(false),
            post_delay: Mutex::new(Duration::ZERO),
            server_runs: Mutex::new(Vec::new()),
            post_calls: Mutex::new(Vec::new()),
            delete_calls: Mutex::new(Vec::new()),
            logout_result: Mutex::new(Ok(())),
            logout_calls: AtomicU32::new(0),
            credential_cleared: AtomicBool::new(false),
            watched_session: Mutex::new(None),
            signed_in_at_logout: Mutex::new(None),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_failure(&self, error: NetworkError) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn set_assign_server_ids(&self, assign: bool) {
        self.assign_server_ids.store(assign, Ordering::SeqCst);
    }

    pub fn set_post_delay(&self, delay: Duration) {
        *self.post_delay.lock().unwrap() = delay;
    }

    pub fn set_logout_result(&self, result: EmptyResult<NetworkError>) {
        *self.logout_result.lock().unwrap() = result;
    }

    pub fn seed_server_runs(&self, runs: Vec<Run>) {
        *self.server_runs.lock().unwrap() = runs;
    }

    pub fn server_runs(&self) -> Vec<Run> {
        self.server_runs.lock().unwrap().clone()
    }

    pub fn post_calls(&self) -> Vec<RunId> {
        self.post_calls.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> Vec<RunId> {
        self.delete_calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.post_calls().iter().filter(|c| c.as_str() == id).count()
            + self.delete_calls().iter().filter(|c| c.as_str() == id).count()
    }

    pub fn logout_calls(&self) -> u32 {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn credential_cleared(&self) -> bool {
        self.credential_cleared.load(Ordering::SeqCst)
    }

    pub fn watch_session(&self, session: Arc<MemorySessionStorage>) {
        *self.watched_session.lock().unwrap() = Some(session);
    }

    /// Whether a session was still stored when logout reached the backend.
    pub fn signed_in_at_logout(&self) -> Option<bool> {
        *self.signed_in_at_logout.lock().unwrap()
    }

    fn check_online(&self) -> EmptyResult<NetworkError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(*self.failure.lock().unwrap())
        }
    }
}

#[async_trait]
impl RemoteRunDataSource for FakeRemote {
    async fn get_runs(&self) -> DataResult<Vec<Run>, NetworkError> {
        self.check_online()?;
        Ok(self.server_runs())
    }

    async fn post_run(&self, run: &Run, _map_picture: &[u8]) -> DataResult<Run, NetworkError> {
        let id = run.id.clone().unwrap_or_default();
        self.post_calls.lock().unwrap().push(id.clone());

        let delay = *self.post_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_online()?;

        let canonical = if self.assign_server_ids.load(Ordering::SeqCst) {
            run.with_id(format!("srv-{}", id))
        } else {
            run.clone()
        };
        let mut runs = self.server_runs.lock().unwrap();
        runs.retain(|r| r.id != canonical.id);
        runs.push(canonical.clone());
        Ok(canonical)
    }

    async fn delete_run(&self, id: &str) -> EmptyResult<NetworkError> {
        self.delete_calls.lock().unwrap().push(id.to_string());
        self.check_online()?;
        self.server_runs
            .lock()
            .unwrap()
            .retain(|r| r.id.as_deref() != Some(id));
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for FakeRemote {
    async fn logout(&self) -> EmptyResult<NetworkError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let watched = self.watched_session.lock().unwrap().clone();
        if let Some(session) = watched {
            let signed_in = session.get().await.is_some();
            *self.signed_in_at_logout.lock().unwrap() = Some(signed_in);
        }
        *self.logout_result.lock().unwrap()
    }

    fn clear_credential(&self) {
        self.credential_cleared.store(true, Ordering::SeqCst);
    }
}

/// Repository wired to in-memory SQLite, a memory session and a fake backend.
#[allow(dead_code)]
pub struct TestHarness {
    pub config: Config,
    pub db: Database,
    pub remote: Arc<FakeRemote>,
    pub session: Arc<MemorySessionStorage>,
    pub pending: Arc<SqlitePendingSyncStore>,
    pub scheduler: Arc<RunSyncScheduler>,
    pub scope: Arc<ApplicationScope>,
    pub repository: Arc<OfflineFirstRunRepository>,
    pub signals: Option<mpsc::UnboundedReceiver<SyncSignal>>,
}

#[allow(dead_code)]
impl TestHarness {
    pub async fn new() -> Self {
        let db = Database::open_in_memory()
            .await
            .expect("Failed to open in-memory database");
        let local = Arc::new(
            SqliteRunStore::new(&db)
                .await
                .expect("Failed to create run store"),
        );
        Self::with_local(db, local)
    }

    /// Harness with a custom local run store.
    pub fn with_local(db: Database, local: Arc<dyn LocalRunDataSource>) -> Self {
        let config = Config::test_default();
        let remote = Arc::new(FakeRemote::new());
        let session = Arc::new(MemorySessionStorage::new(Some(test_auth())));
        let pending = Arc::new(SqlitePendingSyncStore::new(&db));
        let scope = Arc::new(ApplicationScope::new());

        let (scheduler, signals) = RunSyncScheduler::new(pending.clone(), session.clone());
        let scheduler = Arc::new(scheduler);

        let repository = Arc::new(OfflineFirstRunRepository::new(
            local,
            remote.clone(),
            remote.clone(),
            pending.clone(),
            session.clone(),
            scheduler.clone(),
            scope.clone(),
        ));

        Self {
            config,
            db,
            remote,
            session,
            pending,
            scheduler,
            scope,
            repository,
            signals: Some(signals),
        }
    }

    /// Latest run snapshot as seen by a fresh subscriber.
    pub async fn runs(&self) -> Vec<Run> {
        self.repository
            .get_runs()
            .next()
            .await
            .expect("Run stream ended")
    }

    pub async fn run_ids(&self) -> Vec<RunId> {
        self.runs()
            .await
            .into_iter()
            .filter_map(|run| run.id)
            .collect()
    }

    pub async fn sign_out_locally(&self) {
        self.session.set(None).await.unwrap();
    }
}
