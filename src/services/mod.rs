// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - sync logic layer.

pub mod run_repository;
pub mod scheduler;
pub mod session;

pub use run_repository::{OfflineFirstRunRepository, RunRepository, SyncReport};
pub use scheduler::{RunSyncScheduler, SyncRunScheduler, SyncSignal, SyncType, SyncWorker};
pub use session::SessionGate;
