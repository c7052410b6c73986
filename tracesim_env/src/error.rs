//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A background task panicked instead of finishing or being cancelled
    #[error("Task '{0}' panicked")]
    TaskPanicked(String),

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
}

impl EnvError {
    /// Creates a panicked-task error.
    pub fn panicked(task: impl Into<String>) -> Self {
        Self::TaskPanicked(task.into())
    }
}
