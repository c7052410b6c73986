//! Error types for the traceability core.
//!
//! Derivation, perturbation and controller transitions are total; errors only
//! surface while loading configuration or registries, and while tearing the
//! engine down.

use tracesim_env::EnvError;
use thiserror::Error;

/// Errors raised at the edges of the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration value out of its valid domain
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// JSON registry or config could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two records of the same collection share an identifier
    #[error("Duplicate identifier: {0}")]
    DuplicateId(String),

    /// Environment failure (task shutdown)
    #[error("Environment error: {0}")]
    Env(#[from] EnvError),
}

impl CoreError {
    /// Creates an invalid-config error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
