/*!
 * Background tasks with cooperative cancellation
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::error::{NavError, Result};

/// Shared cancellation flag
///
/// Cloning yields a handle to the same flag. Workers poll it between steps;
/// nothing is interrupted preemptively.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fails with [`NavError::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(NavError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Handle to a task running on its own named thread
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: String,
    token: CancellationToken,
    thread: Option<thread::JoinHandle<T>>,
}

impl<T> TaskHandle<T> {
    /// Request cancellation without waiting
    pub fn cancel(&self) {
        debug!("Cancelling task {}", self.name);
        self.token.cancel();
    }

    /// The task's cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the task to finish and return its result
    pub fn join(mut self) -> Result<T> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| NavError::ExecutionError(format!("task {} already joined", self.name)))?;
        thread
            .join()
            .map_err(|_| NavError::ExecutionError(format!("task {} panicked", self.name)))
    }
}

/// Run `work` on a new named thread
pub fn spawn<T, F>(name: &str, work: F) -> Result<TaskHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> T + Send + 'static,
{
    let token = CancellationToken::new();
    let worker_token = token.clone();
    let thread = thread::Builder::new()
        .name(format!("filenav-{}", name))
        .spawn(move || work(worker_token))
        .map_err(|e| NavError::ExecutionError(format!("Failed to spawn task {}: {}", name, e)))?;
    debug!("Spawned task {}", name);

    Ok(TaskHandle {
        name: name.to_string(),
        token,
        thread: Some(thread),
    })
}
