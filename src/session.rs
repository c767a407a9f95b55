// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session storage and the bearer credential used for backend calls.

use crate::error::AppError;
use crate::models::AuthInfo;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Persisted sign-in state.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Current session, `None` when signed out.
    async fn get(&self) -> Option<AuthInfo>;

    /// Store a session, or clear it with `None`.
    async fn set(&self, info: Option<AuthInfo>) -> Result<(), AppError>;
}

/// Session stored as a JSON file in the data directory.
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn get(&self) -> Option<AuthInfo> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read session");
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable session file");
                None
            }
        }
    }

    async fn set(&self, info: Option<AuthInfo>) -> Result<(), AppError> {
        let Some(info) = info else {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(AppError::Session(format!("Failed to remove session: {}", e))),
            };
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Session(e.to_string()))?;
        }

        let json = serde_json::to_vec(&info).map_err(|e| AppError::Session(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written session
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| AppError::Session(format!("Failed to write session: {}", e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::Session(format!("Failed to write session: {}", e)))?;

        Ok(())
    }
}

/// Session kept in memory only (tests, benchmarks, ephemeral clients).
#[derive(Default)]
pub struct MemorySessionStorage {
    info: Mutex<Option<AuthInfo>>,
}

impl MemorySessionStorage {
    pub fn new(info: Option<AuthInfo>) -> Self {
        Self {
            info: Mutex::new(info),
        }
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn get(&self) -> Option<AuthInfo> {
        self.info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn set(&self, info: Option<AuthInfo>) -> Result<(), AppError> {
        *self.info.lock().unwrap_or_else(PoisonError::into_inner) = info;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CredentialState {
    /// Not read from session storage yet
    Unloaded,
    Loaded(String),
    /// Explicitly cleared; stays empty until a new sign-in
    Cleared,
}

/// Bearer token held in memory for backend calls.
///
/// Loaded lazily from session storage on first use. Once cleared (logout),
/// no token is handed out again until [`BearerCredential::set`] is called.
pub struct BearerCredential {
    session: Arc<dyn SessionStorage>,
    state: Mutex<CredentialState>,
}

impl BearerCredential {
    pub fn new(session: Arc<dyn SessionStorage>) -> Self {
        Self {
            session,
            state: Mutex::new(CredentialState::Unloaded),
        }
    }

    /// Current access token, if any.
    pub async fn access_token(&self) -> Option<String> {
        match &*self.lock_state() {
            CredentialState::Loaded(token) => return Some(token.clone()),
            CredentialState::Cleared => return None,
            CredentialState::Unloaded => {}
        }

        let token = self.session.get().await.map(|info| info.access_token);

        let mut state = self.lock_state();
        // A clear or set that raced with the load wins
        if *state == CredentialState::Unloaded {
            if let Some(token) = &token {
                *state = CredentialState::Loaded(token.clone());
            }
            return token;
        }
        match &*state {
            CredentialState::Loaded(token) => Some(token.clone()),
            _ => None,
        }
    }

    /// Install a fresh token after sign-in.
    pub fn set(&self, access_token: impl Into<String>) {
        *self.lock_state() = CredentialState::Loaded(access_token.into());
    }

    /// Drop the held token so no further authenticated calls are made.
    pub fn clear(&self) {
        *self.lock_state() = CredentialState::Cleared;
        tracing::info!("Bearer credential cleared");
    }

    pub fn is_cleared(&self) -> bool {
        *self.lock_state() == CredentialState::Cleared
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CredentialState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
