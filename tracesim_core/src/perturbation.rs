//! Perturbation Engine
//! ===================
//!
//! Owns the only mutable per-flow state, [`FlowMetricsState`], and advances
//! it by bounded uniform jitter on every tick:
//!
//! ```text
//! latency'    = max(0, latency    + U(-j_lat, +j_lat))
//! throughput' = max(0, throughput + U(-j_tp,  +j_tp))
//! ```
//!
//! The engine never reads or writes the simulation state; the caller decides
//! whether a tick happens.

use crate::error::CoreError;
use crate::registry::DataFlow;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current telemetry of a single flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub latency_ms: f64,
    pub throughput: f64,
}

impl FlowMetrics {
    /// Base metrics of a flow record.
    pub fn base(flow: &DataFlow) -> Self {
        Self {
            latency_ms: flow.latency_ms,
            throughput: flow.throughput,
        }
    }
}

/// Flow id → current metrics. Ordered so snapshots are reproducible.
pub type FlowMetricsState = BTreeMap<String, FlowMetrics>;

/// Half-widths of the uniform jitter ranges.
///
/// Both widths are finite and non-negative; the only way to build one is
/// [`JitterBounds::new`] (or `Default`), so `Uniform::new_inclusive` never
/// sees an empty or NaN range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterBounds {
    latency_ms: f64,
    throughput: f64,
}

impl JitterBounds {
    /// Validates and builds jitter half-widths.
    pub fn new(latency_ms: f64, throughput: f64) -> Result<Self, CoreError> {
        for (name, value) in [("latency", latency_ms), ("throughput", throughput)] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::invalid(format!(
                    "{name} jitter must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(Self {
            latency_ms,
            throughput,
        })
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    pub fn throughput(&self) -> f64 {
        self.throughput
    }
}

impl Default for JitterBounds {
    fn default() -> Self {
        Self {
            latency_ms: 3.0,
            throughput: 60.0,
        }
    }
}

/// Seeds a metrics state with each flow's base latency/throughput.
pub fn seed_state(flows: &[DataFlow]) -> FlowMetricsState {
    flows
        .iter()
        .map(|f| (f.id.clone(), FlowMetrics::base(f)))
        .collect()
}

/// Applies one jitter step to every flow and returns the new state.
///
/// Flows missing from `current` start from their base values. Entries for
/// flows no longer in `flows` are dropped.
pub fn perturb<R: Rng + ?Sized>(
    current: &FlowMetricsState,
    flows: &[DataFlow],
    bounds: JitterBounds,
    rng: &mut R,
) -> FlowMetricsState {
    let latency_jitter = Uniform::new_inclusive(-bounds.latency_ms, bounds.latency_ms);
    let throughput_jitter = Uniform::new_inclusive(-bounds.throughput, bounds.throughput);

    flows
        .iter()
        .map(|flow| {
            let prev = current
                .get(&flow.id)
                .copied()
                .unwrap_or_else(|| FlowMetrics::base(flow));
            let next = FlowMetrics {
                latency_ms: (prev.latency_ms + latency_jitter.sample(rng)).max(0.0),
                throughput: (prev.throughput + throughput_jitter.sample(rng)).max(0.0),
            };
            (flow.id.clone(), next)
        })
        .collect()
}

/// Holds the live metrics state and the number of ticks applied to it.
#[derive(Debug, Clone)]
pub struct PerturbationEngine {
    state: FlowMetricsState,
    bounds: JitterBounds,
    ticks: u64,
}

impl PerturbationEngine {
    /// Creates an engine with empty state.
    pub fn new(bounds: JitterBounds) -> Self {
        Self {
            state: FlowMetricsState::new(),
            bounds,
            ticks: 0,
        }
    }

    /// Seeds the state from base flow values.
    ///
    /// Calling it again with the same flows yields the same state.
    pub fn initialize(&mut self, flows: &[DataFlow]) {
        self.state = seed_state(flows);
        self.ticks = 0;
    }

    /// Advances every flow by one jitter step.
    pub fn tick<R: Rng + ?Sized>(&mut self, flows: &[DataFlow], rng: &mut R) -> &FlowMetricsState {
        self.state = perturb(&self.state, flows, self.bounds, rng);
        self.ticks += 1;
        &self.state
    }

    pub fn state(&self) -> &FlowMetricsState {
        &self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn bounds(&self) -> JitterBounds {
        self.bounds
    }
}
