//! Affinity executor: one serialized context for session-state mutations.
//!
//! Generator completions arrive on arbitrary worker tasks; anything that
//! touches the session's hazard records is submitted here and runs in
//! submission order on a single task.

use crate::error::OrchestrationError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct AffinityExecutor {
    sender: mpsc::UnboundedSender<Job>,
}

impl AffinityExecutor {
    /// Spawn the executor task on the current runtime.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let handle = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job();
            }
            debug!("Affinity executor drained");
        });
        (Self { sender }, handle)
    }

    /// Queue a job without waiting for it.
    pub fn submit<F>(&self, job: F) -> Result<(), OrchestrationError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Box::new(job))
            .map_err(|_| OrchestrationError::Shutdown)
    }

    /// Run a job on the affinity context and wait for its result.
    pub async fn run<F, R>(&self, job: F) -> Result<R, OrchestrationError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(move || {
            let _ = tx.send(job());
        })?;
        rx.await.map_err(|_| OrchestrationError::Shutdown)
    }
}
