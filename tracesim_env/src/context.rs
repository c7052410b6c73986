//! Core environment context trait for the traceability engine.

use crate::types::TaskHandle;
use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::time::Duration;

/// RNG stream used for flow metric jitter.
pub const METRICS_STREAM: u64 = 1;

/// RNG stream used for active-flow-set flicker.
pub const ACTIVE_SET_STREAM: u64 = 2;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the engine can run
/// against real timers or against a virtual clock.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, OS entropy
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// All methods that would normally introduce non-determinism
/// (time, randomness) are controlled by the implementation.
#[async_trait]
pub trait TraceContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task.
    ///
    /// The returned handle owns the task: dropping it aborts the task.
    fn spawn<F>(&self, name: &str, future: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns an RNG for an independent randomness stream.
    ///
    /// Streams keep consumers isolated: drawing more jitter values must not
    /// shift the active-set flicker sequence, and vice versa.
    ///
    /// # Arguments
    /// * `stream` - Stream identifier, combined with the global seed
    fn derive_rng(&self, stream: u64) -> ChaCha8Rng;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
