// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote run source (the run backend).

pub mod dto;
pub mod http;

pub use http::HttpRunClient;

use crate::error::{DataResult, EmptyResult, NetworkError};
use crate::models::Run;
use async_trait::async_trait;

/// Run calls against the backend.
#[async_trait]
pub trait RemoteRunDataSource: Send + Sync {
    async fn get_runs(&self) -> DataResult<Vec<Run>, NetworkError>;

    /// Create or update a run together with its map snapshot.
    ///
    /// Returns the backend's canonical version of the run.
    async fn post_run(&self, run: &Run, map_picture: &[u8]) -> DataResult<Run, NetworkError>;

    async fn delete_run(&self, id: &str) -> EmptyResult<NetworkError>;
}

/// Authenticated-session calls against the backend.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn logout(&self) -> EmptyResult<NetworkError>;

    /// Forget the bearer credential held for backend calls.
    fn clear_credential(&self);
}
