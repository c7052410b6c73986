//! TraceSim Core - Multi-cloud data-flow traceability simulation
//!
//! This library drives a small model of a multi-cloud estate:
//! 1. **Registry**: immutable nodes, flows and audit events
//! 2. **Perturbation**: bounded jitter on per-flow latency/throughput
//! 3. **Aggregation**: pure derivation of issues, anomalies and compliance rollups
//! 4. **Controller**: Running / Paused / Failover gating of the tick timers

pub mod aggregation;
pub mod audit;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod perturbation;
pub mod registry;
pub mod topology;

// Re-export key types for convenience
pub use aggregation::{Aggregator, Anomaly, AnomalyKind, AnomalySeverity, Derived, FlowFilter, Rollup};
pub use audit::{AuditEvent, AuditLog, EventSeverity, SeverityFilter};
pub use config::EngineConfig;
pub use controller::{SimulationController, SimulationState, Transition};
pub use engine::{Simulation, Snapshot, TickOutcome, TraceEngine};
pub use error::CoreError;
pub use perturbation::{FlowMetrics, FlowMetricsState, PerturbationEngine};
pub use registry::{DataFlow, InfraNode, Registry};
pub use topology::EdgeView;
