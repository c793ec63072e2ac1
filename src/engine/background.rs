//! Detached work that must outlive the response it was spawned for.
//!
//! Stale revalidation and tee capture are spawned here instead of with a bare
//! `tokio::spawn` so shutdown can wait for them. Failures are logged and
//! counted at the task boundary; nothing is reported back to the request.

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinSet;

use crate::error::KasumiError;
use crate::metrics::KasumiMetrics;

#[derive(Default)]
pub struct BackgroundTasks {
    set: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a detached task. Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, task: &'static str, fut: F)
    where
        F: Future<Output = Result<(), KasumiError>> + Send + 'static,
    {
        let mut set = self.set.lock();
        // Reap whatever already finished so the set does not grow unbounded
        while let Some(done) = set.try_join_next() {
            log_join_error(done);
        }
        set.spawn(async move {
            if let Err(e) = fut.await {
                tracing::warn!(task, error = %e, "Background task failed");
                KasumiMetrics::global().record_background_failure(task);
            }
        });
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.set.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every task spawned so far. Tasks spawned while draining are
    /// picked up on the next call.
    pub async fn drain(&self) {
        let mut set = std::mem::take(&mut *self.set.lock());
        while let Some(done) = set.join_next().await {
            log_join_error(done);
        }
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Background task panicked or was cancelled");
    }
}
