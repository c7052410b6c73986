//! Common types for the environment abstraction.

use crate::error::EnvError;
use tokio::task::JoinHandle;

/// Owning handle to a spawned background task.
///
/// Periodic timers must not outlive the engine that scheduled them, so the
/// handle aborts its task when dropped. Use [`TaskHandle::shutdown`] to
/// cancel and wait for the task to be gone.
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    inner: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Wraps a tokio join handle.
    pub fn new(name: impl Into<String>, inner: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            inner: Some(inner),
        }
    }

    /// Returns the task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once the task has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Requests cancellation without waiting.
    pub fn abort(&self) {
        if let Some(handle) = &self.inner {
            handle.abort();
        }
    }

    /// Cancels the task and waits until it has stopped.
    ///
    /// # Returns
    /// * `Ok(())` - The task finished or was cancelled
    /// * `Err(EnvError::TaskPanicked)` - The task panicked
    pub async fn shutdown(mut self) -> Result<(), EnvError> {
        let Some(handle) = self.inner.take() else {
            return Ok(());
        };
        handle.abort();
        match handle.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(_) => Err(EnvError::panicked(self.name.clone())),
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.take() {
            handle.abort();
        }
    }
}
