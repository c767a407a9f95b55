// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application-lifetime task scope.
//!
//! Work launched here is owned by the application root rather than by the
//! caller, so it keeps running when the caller goes away.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

/// Long-lived scope for fire-and-forget work.
pub struct ApplicationScope {
    handle: Handle,
    tasks: Mutex<JoinSet<()>>,
}

impl ApplicationScope {
    /// Create a scope bound to the current tokio runtime.
    ///
    /// Panics when called outside a runtime.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Launch a task that outlives the caller.
    pub fn launch<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock_tasks();
        // Reap finished tasks so the set does not grow without bound
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }
        tasks.spawn_on(task, &self.handle);
    }

    /// Run `task` in the scope and wait for its result.
    ///
    /// The task completes even if the caller stops waiting. Returns `None`
    /// only when the scope was shut down before the task finished.
    pub async fn run_to_completion<F>(&self, task: F) -> Option<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.launch(async move {
            let _ = tx.send(task.await);
        });
        rx.await.ok()
    }

    /// Wait until every launched task (including ones launched meanwhile) has finished.
    pub async fn join_all(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.lock_tasks());
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                log_join_result(result);
            }
        }
    }

    /// Abort all outstanding tasks.
    pub fn shutdown(&self) {
        let mut tasks = self.lock_tasks();
        tracing::info!(outstanding = tasks.len(), "Shutting down application scope");
        tasks.abort_all();
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ApplicationScope {
    fn default() -> Self {
        Self::new()
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Application task panicked");
        }
    }
}
