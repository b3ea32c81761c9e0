//! Handle to a spawned streaming task.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use limestream_core::types::Direction;

/// A running worker: its cancellation token and join handle.
#[derive(Debug)]
pub(crate) struct Worker {
    direction: Direction,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Worker {
    /// Spawn `body`, handing it a token that is cancelled on stop.
    pub(crate) fn spawn<F, Fut>(direction: Direction, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(body(cancel.clone()));
        Worker {
            direction,
            cancel,
            task,
        }
    }

    /// Whether the task has exited on its own.
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task and wait for it to exit.
    pub(crate) async fn stop(mut self) {
        self.cancel.cancel();
        match (&mut self.task).await {
            Err(e) if e.is_panic() => {
                tracing::error!(direction = %self.direction, "streaming worker panicked");
            }
            _ => {}
        }
        debug!(direction = %self.direction, "worker joined");
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
