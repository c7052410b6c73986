//! TraceSim Deterministic Simulation Testing (DST) Harness
//!
//! This crate provides a controlled environment in which the traceability
//! engine runs deterministically.
//!
//! # Core Principle: The Reactor Pattern
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only from one timer deadline to the next
//! - **Timers**: The two periodic tasks become an explicit event queue
//! - **Randomness**: Jitter and flicker streams derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Seeded Streams)          │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │     metrics deadline │          │ active-set deadline       │
//! │                 ┌────▼──────────▼────┐                      │
//! │                 │     Simulation     │                      │
//! │                 └─────────┬──────────┘                      │
//! │                           │ every step                      │
//! │                 ┌─────────▼──────────┐                      │
//! │                 │       Oracle       │                      │
//! │                 │ (Invariant Checks) │                      │
//! │                 └────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::time::Duration;
//! use tracesim_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(Duration::from_secs(30))
//!     .run(ScenarioId::PauseResume)?;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod oracle;
mod runner;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{SimExport, SimFrame};
pub use oracle::{Invariant, Oracle, Violation};
pub use runner::{duration_from_secs, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimWorld, StepEvent, TimerKind};
