// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error classification for data operations.
//!
//! Every failed operation is reduced to a classified cause rather than a raw
//! transport or storage error. Remote causes are all recoverable by queueing
//! and retrying; local causes are fatal to the operation in progress.

/// Failure of a call against the run backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum NetworkError {
    #[error("Request timed out")]
    RequestTimeout,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict")]
    Conflict,

    #[error("Too many requests")]
    TooManyRequests,

    #[error("No internet connection")]
    NoInternet,

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Server error")]
    ServerError,

    #[error("Serialization error")]
    Serialization,

    #[error("Unknown network error")]
    Unknown,
}

impl NetworkError {
    /// Classify an HTTP status code that is not a success.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => NetworkError::Unauthorized,
            408 => NetworkError::RequestTimeout,
            409 => NetworkError::Conflict,
            413 => NetworkError::PayloadTooLarge,
            429 => NetworkError::TooManyRequests,
            500..=599 => NetworkError::ServerError,
            _ => NetworkError::Unknown,
        }
    }

    /// Unauthorized failures need the user to sign in again before a retry
    /// can succeed.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, NetworkError::Unauthorized)
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::RequestTimeout
        } else if err.is_connect() {
            NetworkError::NoInternet
        } else if err.is_decode() {
            NetworkError::Serialization
        } else if let Some(status) = err.status() {
            NetworkError::from_status(status.as_u16())
        } else {
            NetworkError::Unknown
        }
    }
}

/// Failure of the device-local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum LocalError {
    #[error("Disk full")]
    DiskFull,

    /// A sync intent could not be queued because nobody is signed in.
    #[error("No signed-in user")]
    NoSession,

    #[error("Local storage failure")]
    Unknown,
}

/// SQLite primary result code for a full database or disk.
const SQLITE_FULL: &str = "13";

impl From<sqlx::Error> for LocalError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(SQLITE_FULL) => {
                LocalError::DiskFull
            }
            sqlx::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::StorageFull => {
                LocalError::DiskFull
            }
            _ => {
                tracing::error!(error = %err, "Local storage failure");
                LocalError::Unknown
            }
        }
    }
}

/// Classified failure of a single data operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum DataError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Local error: {0}")]
    Local(#[from] LocalError),
}

impl DataError {
    pub fn is_local(&self) -> bool {
        matches!(self, DataError::Local(_))
    }
}

/// Outcome of a data operation: success payload or classified error.
pub type DataResult<T, E = DataError> = std::result::Result<T, E>;

/// Outcome of a data operation that carries no payload.
pub type EmptyResult<E = DataError> = std::result::Result<(), E>;

/// Startup and wiring errors (outside the per-operation data path).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session storage error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for startup and wiring code.
pub type Result<T> = std::result::Result<T, AppError>;
