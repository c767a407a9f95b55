// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in and logout flow.

use crate::error::{AppError, EmptyResult, NetworkError};
use crate::models::AuthInfo;
use crate::services::run_repository::RunRepository;
use crate::services::scheduler::SyncRunScheduler;
use crate::session::{BearerCredential, SessionStorage};
use std::sync::Arc;

/// Owns the transitions between signed-in and signed-out.
pub struct SessionGate {
    session: Arc<dyn SessionStorage>,
    credential: Arc<BearerCredential>,
    repository: Arc<dyn RunRepository>,
    scheduler: Arc<dyn SyncRunScheduler>,
}

impl SessionGate {
    pub fn new(
        session: Arc<dyn SessionStorage>,
        credential: Arc<BearerCredential>,
        repository: Arc<dyn RunRepository>,
        scheduler: Arc<dyn SyncRunScheduler>,
    ) -> Self {
        Self {
            session,
            credential,
            repository,
            scheduler,
        }
    }

    /// Persist a new session and arm the bearer credential with it.
    pub async fn sign_in(&self, info: AuthInfo) -> Result<(), AppError> {
        let user_id = info.user_id.clone();
        self.credential.set(info.access_token.clone());
        self.session.set(Some(info)).await?;
        tracing::info!(user_id = %user_id, "Signed in");
        Ok(())
    }

    pub async fn current_user_id(&self) -> Option<String> {
        self.session.get().await.map(|info| info.user_id)
    }

    /// Log out: forget the session, stop background sync, wipe local runs
    /// and log out at the backend.
    ///
    /// The session is cleared first so no new sync work can be queued while
    /// the rest of the logout runs. Local cleanup happens even when the
    /// backend call fails; the returned value is the backend logout result.
    /// Pending entries stay queued and are replayed if the same user signs in
    /// again.
    pub async fn logout(&self) -> EmptyResult<NetworkError> {
        let user_id = self.current_user_id().await;

        // Load the token now, the backend logout still needs it
        let _ = self.credential.access_token().await;

        if let Err(e) = self.session.set(None).await {
            tracing::error!(error = %e, "Failed to clear stored session on logout");
        }

        self.scheduler.cancel_all_syncs().await;

        if let Err(e) = self.repository.delete_all_runs().await {
            tracing::error!(error = %e, "Failed to wipe local runs on logout");
        }

        let result = self.repository.logout().await;

        tracing::info!(user_id = ?user_id, remote_ok = result.is_ok(), "Logged out");
        result
    }
}
