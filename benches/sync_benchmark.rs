use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use runique_sync::db::{Database, RunPendingSyncStore, SqlitePendingSyncStore, SqliteRunStore};
use runique_sync::error::{DataResult, EmptyResult, NetworkError};
use runique_sync::models::{AuthInfo, Location, Run, RunPendingSyncEntity};
use runique_sync::remote::{RemoteRunDataSource, RemoteSession};
use runique_sync::scope::ApplicationScope;
use runique_sync::services::{OfflineFirstRunRepository, RunRepository, RunSyncScheduler};
use runique_sync::session::MemorySessionStorage;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

const USER_ID: &str = "bench-user";

/// Backend that acknowledges everything immediately.
struct AckRemote {
    runs: Vec<Run>,
}

#[async_trait]
impl RemoteRunDataSource for AckRemote {
    async fn get_runs(&self) -> DataResult<Vec<Run>, NetworkError> {
        Ok(self.runs.clone())
    }

    async fn post_run(&self, run: &Run, _map_picture: &[u8]) -> DataResult<Run, NetworkError> {
        Ok(run.clone())
    }

    async fn delete_run(&self, _id: &str) -> EmptyResult<NetworkError> {
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for AckRemote {
    async fn logout(&self) -> EmptyResult<NetworkError> {
        Ok(())
    }

    fn clear_credential(&self) {}
}

fn run(i: u32) -> Run {
    Run {
        id: Some(format!("run-{}", i)),
        duration: Duration::from_secs(1800),
        date_time_utc: Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap()
            + chrono::Duration::minutes(i as i64),
        distance_meters: 5000,
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

async fn setup(
    server_runs: Vec<Run>,
) -> (Arc<OfflineFirstRunRepository>, Arc<SqlitePendingSyncStore>) {
    let db = Database::open_in_memory()
        .await
        .expect("Failed to open database");
    let local = Arc::new(SqliteRunStore::new(&db).await.expect("Failed to open store"));
    let pending = Arc::new(SqlitePendingSyncStore::new(&db));
    let session = Arc::new(MemorySessionStorage::new(Some(AuthInfo {
        access_token: "token".to_string(),
        refresh_token: "refresh".to_string(),
        user_id: USER_ID.to_string(),
    })));
    let remote = Arc::new(AckRemote { runs: server_runs });
    // Worker is not started; queued signals are simply dropped with the receiver
    let (scheduler, _signals) = RunSyncScheduler::new(pending.clone(), session.clone());

    let repository = Arc::new(OfflineFirstRunRepository::new(
        local,
        remote.clone(),
        remote,
        pending.clone(),
        session,
        Arc::new(scheduler),
        Arc::new(ApplicationScope::new()),
    ));
    (repository, pending)
}

fn benchmark_sync_pass(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let (repository, pending) = rt.block_on(setup(Vec::new()));

    let mut group = c.benchmark_group("reconciliation");

    group.bench_function("replay_50_pending_creates", |b| {
        b.iter(|| {
            rt.block_on(async {
                for i in 0..50 {
                    let run = run(i);
                    pending
                        .upsert_create_pending(&RunPendingSyncEntity {
                            run_id: run.id.clone().unwrap_or_default(),
                            run,
                            map_picture: vec![0u8; 1024],
                            user_id: USER_ID.to_string(),
                        })
                        .await
                        .expect("Failed to queue");
                }
                black_box(repository.sync_pending_runs().await.expect("Sync failed"))
            })
        })
    });

    group.finish();
}

fn benchmark_fetch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let server_runs: Vec<Run> = (0..200).map(run).collect();
    let (repository, _pending) = rt.block_on(setup(server_runs));

    c.bench_function("fetch_200_runs", |b| {
        b.iter(|| rt.block_on(async { black_box(repository.fetch_runs().await) }))
    });
}

criterion_group!(benches, benchmark_sync_pass, benchmark_fetch);
criterion_main!(benches);
