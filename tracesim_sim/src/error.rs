//! Error types for the simulation harness.

use thiserror::Error;
use tracesim_core::CoreError;

/// Errors surfaced by the harness and the CLI.
#[derive(Debug, Error)]
pub enum SimError {
    /// Engine construction or JSON parsing failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Reading an override or writing an export failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scenario name did not parse
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// Conflicting command-line options
    #[error("invalid arguments: {0}")]
    Usage(String),
}
