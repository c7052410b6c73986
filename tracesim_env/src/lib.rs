//! Tracesim Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the traceability
//! engine to run in both **Production** (tokio) and **Simulation** (virtual
//! clock) environments.
//!
//! # Core Concept: The Reactor Pattern
//!
//! For Deterministic Simulation Testing (DST), we intercept every source of
//! non-determinism the engine touches:
//! - Time (`now()`, `sleep()`)
//! - Timer tasks (`spawn()`)
//! - Randomness (`derive_rng()`)
//!
//! By deriving all entropy from a single 64-bit seed, any failing run
//! becomes reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use tracesim_env::TraceContext;
//!
//! async fn ticker<Ctx: TraceContext>(ctx: &Ctx) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(1700)).await;
//!         tick();
//!     }
//! }
//! ```

mod context;
mod types;
mod error;
mod tokio_impl;

pub use context::{TraceContext, ACTIVE_SET_STREAM, METRICS_STREAM};
pub use types::TaskHandle;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
