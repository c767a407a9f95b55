// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod pending;
pub mod run;
pub mod session;

pub use pending::{DeletedRunSyncEntity, RunPendingSyncEntity};
pub use run::{Location, LocationTimestamp, Run, RunId};
pub use session::AuthInfo;
