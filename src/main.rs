// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Runique sync daemon
//!
//! Keeps the local run database in step with the run backend: pulls runs
//! periodically and replays queued writes until interrupted.

use runique_sync::{
    config::Config,
    db::Database,
    services::{RunRepository, SyncRunScheduler, SyncType},
    session::{FileSessionStorage, SessionStorage},
    SyncApp,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        base_url = %config.base_url,
        data_dir = %config.data_dir.display(),
        "Starting Runique sync"
    );

    // Open local database
    let db = Database::open(&config.database_path()).await?;
    tracing::info!(path = %config.database_path().display(), "Local database ready");

    // Load stored session
    let session: Arc<dyn SessionStorage> =
        Arc::new(FileSessionStorage::new(config.session_path()));
    match session.get().await {
        Some(info) => tracing::info!(user_id = %info.user_id, "Session loaded"),
        None => tracing::warn!("No stored session, queued runs will not be replayed"),
    }

    let fetch_interval = config.fetch_interval;
    let (app, worker) = SyncApp::build(config, &db, session).await?;
    let worker = tokio::spawn(worker.run());

    // Initial pull and replay
    if let Err(e) = app.repository.fetch_runs().await {
        tracing::warn!(error = %e, "Initial fetch failed");
    }
    match app.repository.sync_pending_runs().await {
        Ok(report) => tracing::info!(
            created = report.created,
            deleted = report.deleted,
            remaining = report.remaining(),
            "Initial sync pass done"
        ),
        Err(e) => tracing::error!(error = %e, "Initial sync pass failed"),
    }

    app.scheduler
        .schedule_sync(SyncType::FetchRuns {
            interval: fetch_interval,
        })
        .await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    app.scheduler.cancel_all_syncs().await;
    worker.abort();
    app.scope.shutdown();
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runique_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .try_init()?;
    Ok(())
}
