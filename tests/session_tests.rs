// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session storage and sign-in/logout flow tests.

use runique_sync::db::RunPendingSyncStore;
use runique_sync::error::{LocalError, NetworkError};
use runique_sync::models::AuthInfo;
use runique_sync::services::{
    RunRepository, SessionGate, SyncRunScheduler, SyncSignal, SyncType,
};
use runique_sync::session::{BearerCredential, FileSessionStorage, SessionStorage};
use std::sync::Arc;

mod common;
use common::{sample_run, test_auth, TestHarness, TEST_USER};

fn gate_for(h: &TestHarness) -> (SessionGate, Arc<BearerCredential>) {
    let credential = Arc::new(BearerCredential::new(h.session.clone()));
    let gate = SessionGate::new(
        h.session.clone(),
        credential.clone(),
        h.repository.clone(),
        h.scheduler.clone(),
    );
    (gate, credential)
}

#[tokio::test]
async fn test_file_session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileSessionStorage::new(dir.path().join("session.json"));

    assert_eq!(storage.get().await, None);

    storage.set(Some(test_auth())).await.unwrap();
    assert_eq!(storage.get().await, Some(test_auth()));

    // A second handle on the same file sees the stored session
    let reopened = FileSessionStorage::new(dir.path().join("session.json"));
    assert_eq!(reopened.get().await.map(|a| a.user_id), Some(TEST_USER.to_string()));

    storage.set(None).await.unwrap();
    assert_eq!(storage.get().await, None);
    assert!(!dir.path().join("session.json").exists());
}

#[tokio::test]
async fn test_file_session_uses_camel_case() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let storage = FileSessionStorage::new(&path);

    storage.set(Some(test_auth())).await.unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"accessToken\""));
    assert!(raw.contains("\"userId\""));
}

#[tokio::test]
async fn test_corrupt_session_file_reads_as_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert_eq!(FileSessionStorage::new(&path).get().await, None);
}

#[tokio::test]
async fn test_sign_in_arms_credential() {
    let h = TestHarness::new().await;
    h.sign_out_locally().await;
    let (gate, credential) = gate_for(&h);

    let info = AuthInfo {
        access_token: "fresh-token".to_string(),
        refresh_token: "fresh-refresh".to_string(),
        user_id: "user-2".to_string(),
    };
    gate.sign_in(info).await.unwrap();

    assert_eq!(gate.current_user_id().await.as_deref(), Some("user-2"));
    assert_eq!(credential.access_token().await.as_deref(), Some("fresh-token"));
}

#[tokio::test]
async fn test_logout_stops_sync_and_wipes_local_state() {
    let mut h = TestHarness::new().await;
    h.remote.set_online(false);
    h.repository
        .upsert_run(&sample_run(1), b"jpeg")
        .await
        .unwrap();
    let (gate, _credential) = gate_for(&h);

    gate.logout().await.unwrap();

    assert!(h.runs().await.is_empty());
    assert_eq!(gate.current_user_id().await, None);
    assert!(h.remote.credential_cleared());
    assert_eq!(h.remote.logout_calls(), 1);

    // Queued work survives for the next sign-in of the same user
    assert_eq!(h.pending.get_all_create_pending(TEST_USER).await.unwrap().len(), 1);

    let signals = h.signals.as_mut().unwrap();
    let mut received = Vec::new();
    while let Ok(signal) = signals.try_recv() {
        received.push(signal);
    }
    assert_eq!(received.last(), Some(&SyncSignal::CancelAll));
}

#[tokio::test]
async fn test_logout_forgets_session_before_backend_and_blocks_new_syncs() {
    let h = TestHarness::new().await;
    h.remote.watch_session(h.session.clone());
    let (gate, credential) = gate_for(&h);

    gate.logout().await.unwrap();

    assert_eq!(h.remote.signed_in_at_logout(), Some(false));
    // The token was loaded before the session went away
    assert_eq!(credential.access_token().await.as_deref(), Some("access-token"));

    let late = h
        .scheduler
        .schedule_sync(SyncType::DeleteRun {
            run_id: "late-run".to_string(),
        })
        .await;
    assert_eq!(late, Err(LocalError::NoSession));
    assert!(h.pending.get_delete_pending_by_id("late-run").await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_finishes_locally_when_backend_fails() {
    let h = TestHarness::new().await;
    h.remote.set_logout_result(Err(NetworkError::ServerError));
    let (gate, _credential) = gate_for(&h);

    let result = gate.logout().await;

    assert_eq!(result, Err(NetworkError::ServerError));
    assert!(h.remote.credential_cleared());
    assert_eq!(gate.current_user_id().await, None);
}
