//! Tracked fire-and-forget work that shutdown waits for.

use futures::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::middleware::recover::panic_message;

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` under the tracker. Errors and panics are logged here and go no further.
    pub fn spawn<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        debug!(task = name, "spawning background task");
        self.tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(task = name, error = %e, "background task failed"),
                Err(panic) => error!(
                    task = name,
                    panic = %panic_message(panic.as_ref()),
                    "background task panicked"
                ),
            }
        });
    }

    /// Cancelled once shutdown starts waiting on background work. Long-running
    /// loops watch it; one-shot tasks such as emails simply run to completion.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Cancel long-running loops, then wait for every spawned task without a bound.
    pub async fn close_and_wait(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
