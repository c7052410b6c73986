//! Invariant oracle for simulation.
//!
//! The Oracle holds the "God's eye view" of what must always be true about a
//! [`Simulation`], independent of the random draws that produced it:
//! - Metrics never go negative
//! - Derivation is a pure function of its inputs
//! - Blocked flows and unencrypted PII always surface as anomalies
//! - Paused state freezes metrics and the active set

use serde::Serialize;
use std::time::Duration;
use tracesim_core::aggregation::AnomalyKind;
use tracesim_core::controller::{ActiveFlowSet, SimulationState};
use tracesim_core::perturbation::FlowMetricsState;
use tracesim_core::registry::{FlowStatus, Sensitivity};
use tracesim_core::{AnomalySeverity, Simulation};
use tracing::warn;

/// Which property was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Invariant {
    NonNegativeMetrics,
    PureDerivation,
    BlockedFlowFlagged,
    UnencryptedPiiFlagged,
    PercentageRange,
    PausedMetricsFrozen,
    ActiveSetFrozen,
    ActiveSetWellFormed,
}

/// A single failed check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub at_ms: u64,
    pub invariant: Invariant,
    pub detail: String,
}

/// State carried between observations.
#[derive(Debug, Clone)]
struct Observation {
    state: SimulationState,
    metrics: FlowMetricsState,
    metrics_ticks: u64,
    active: ActiveFlowSet,
}

/// The Oracle - checks every observed simulation state.
#[derive(Debug, Default)]
pub struct Oracle {
    previous: Option<Observation>,
    violations: Vec<Violation>,
    checks: u64,
}

impl Oracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every check against the current state of `sim`.
    ///
    /// Returns the number of new violations.
    pub fn observe(&mut self, sim: &Simulation, at: Duration) -> usize {
        let before = self.violations.len();
        let at_ms = at.as_millis() as u64;

        self.check_metrics(sim, at_ms);
        self.check_derivation(sim, at_ms);
        self.check_active_set(sim, at_ms);
        self.check_frozen(sim, at_ms);

        self.previous = Some(Observation {
            state: sim.state(),
            metrics: sim.metrics().clone(),
            metrics_ticks: sim.metrics_ticks(),
            active: sim.active_flows().clone(),
        });
        self.checks += 1;

        let new = self.violations.len() - before;
        if new > 0 {
            for v in &self.violations[before..] {
                warn!(at_ms, invariant = ?v.invariant, detail = %v.detail, "invariant violated");
            }
        }
        new
    }

    fn fail(&mut self, at_ms: u64, invariant: Invariant, detail: String) {
        self.violations.push(Violation {
            at_ms,
            invariant,
            detail,
        });
    }

    fn check_metrics(&mut self, sim: &Simulation, at_ms: u64) {
        let negatives: Vec<String> = sim
            .metrics()
            .iter()
            .filter(|(_, m)| m.latency_ms < 0.0 || m.throughput < 0.0)
            .map(|(id, m)| format!("{id}: latency={} throughput={}", m.latency_ms, m.throughput))
            .collect();
        for detail in negatives {
            self.fail(at_ms, Invariant::NonNegativeMetrics, detail);
        }
    }

    fn check_derivation(&mut self, sim: &Simulation, at_ms: u64) {
        let derived = sim.derived();
        let fresh = sim
            .aggregator()
            .derive(sim.registry(), sim.metrics(), sim.active_flows());
        if &fresh != derived {
            self.fail(
                at_ms,
                Invariant::PureDerivation,
                "re-derivation from identical inputs differs".to_string(),
            );
        }

        let mut failures = Vec::new();
        for flow in sim.registry().flows() {
            if flow.status == FlowStatus::Blocked {
                let critical = derived.anomalies_for(&flow.id).any(|a| {
                    a.kind == AnomalyKind::Blocked && a.severity == AnomalySeverity::Critical
                });
                if !derived.issues.contains(&flow.id) || !critical {
                    failures.push((Invariant::BlockedFlowFlagged, flow.id.clone()));
                }
            }
            if flow.sensitivity == Sensitivity::Pii && flow.status != FlowStatus::Encrypted {
                let gap = derived
                    .anomalies_for(&flow.id)
                    .any(|a| a.kind == AnomalyKind::ComplianceGap);
                if !gap {
                    failures.push((Invariant::UnencryptedPiiFlagged, flow.id.clone()));
                }
            }
        }
        for (invariant, flow_id) in failures {
            self.fail(at_ms, invariant, flow_id);
        }

        let rollup = &derived.rollup;
        for (name, pct) in [
            ("encrypted_sensitive_pct", rollup.encrypted_sensitive_pct),
            ("gdpr_covered_pct", rollup.gdpr_covered_pct),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                self.fail(at_ms, Invariant::PercentageRange, format!("{name}={pct}"));
            }
        }
    }

    fn check_active_set(&mut self, sim: &Simulation, at_ms: u64) {
        let registry = sim.registry();
        let bad: Vec<String> = sim
            .active_flows()
            .iter()
            .filter(|id| {
                registry
                    .flow(id)
                    .map_or(true, |f| f.status == FlowStatus::Blocked)
            })
            .cloned()
            .collect();
        for id in bad {
            self.fail(at_ms, Invariant::ActiveSetWellFormed, id);
        }
    }

    fn check_frozen(&mut self, sim: &Simulation, at_ms: u64) {
        let Some(prev) = &self.previous else {
            return;
        };
        let state = sim.state();

        let mut failures = Vec::new();
        if state == SimulationState::Paused
            && (sim.metrics() != &prev.metrics || sim.metrics_ticks() != prev.metrics_ticks)
        {
            failures.push((
                Invariant::PausedMetricsFrozen,
                format!("metrics moved while paused (tick {})", sim.metrics_ticks()),
            ));
        }
        if !state.refreshes_active_set() && sim.active_flows() != &prev.active {
            failures.push((
                Invariant::ActiveSetFrozen,
                format!("active set changed in {state} (was {})", prev.state),
            ));
        }
        for (invariant, detail) in failures {
            self.fail(at_ms, invariant, detail);
        }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of observations made.
    pub fn checks(&self) -> u64 {
        self.checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{SimConfig, SimWorld};
    use proptest::prelude::*;
    use tracesim_core::{EngineConfig, Registry};

    fn observe_run(world: &mut SimWorld, oracle: &mut Oracle, steps: usize) {
        for _ in 0..steps {
            let event = world.step();
            oracle.observe(world.simulation(), event.at);
        }
    }

    #[test]
    fn test_sample_run_is_clean() {
        let mut world = SimWorld::new(SimConfig::default(), Registry::sample()).unwrap();
        let mut oracle = Oracle::new();
        oracle.observe(world.simulation(), Duration::ZERO);
        observe_run(&mut world, &mut oracle, 50);

        assert!(oracle.is_clean(), "{:?}", oracle.violations());
        assert_eq!(oracle.checks(), 51);
    }

    #[test]
    fn test_paused_and_failover_runs_are_clean() {
        let mut world = SimWorld::new(SimConfig::default(), Registry::sample()).unwrap();
        let mut oracle = Oracle::new();
        observe_run(&mut world, &mut oracle, 6);

        world.toggle_pause();
        observe_run(&mut world, &mut oracle, 6);
        world.toggle_pause();
        world.trigger_failover();
        observe_run(&mut world, &mut oracle, 6);

        assert!(oracle.is_clean(), "{:?}", oracle.violations());
    }

    #[test]
    fn test_detects_stale_previous_metrics() {
        // A paused observation after metrics moved must be flagged
        let mut world = SimWorld::new(SimConfig::default(), Registry::sample()).unwrap();
        let mut oracle = Oracle::new();
        oracle.observe(world.simulation(), Duration::ZERO);

        // Metrics tick at 1700 happens unobserved, then pause
        world.run_for(Duration::from_millis(1800));
        world.toggle_pause();

        assert!(oracle.observe(world.simulation(), Duration::from_millis(1800)) > 0);
        assert_eq!(oracle.violations()[0].invariant, Invariant::PausedMetricsFrozen);
    }

    proptest! {
        #[test]
        fn test_invariants_hold_for_any_seed_and_bounds(
            seed in any::<u64>(),
            latency_jitter in 0.0f64..200.0,
            throughput_jitter in 0.0f64..5000.0,
            probability in 0.0f64..=1.0,
        ) {
            let config = SimConfig {
                seed,
                engine: EngineConfig {
                    latency_jitter_ms: latency_jitter,
                    throughput_jitter,
                    active_probability: probability,
                    ..EngineConfig::default()
                },
            };
            let mut world = SimWorld::new(config, Registry::sample()).unwrap();
            let mut oracle = Oracle::new();
            observe_run(&mut world, &mut oracle, 40);

            prop_assert!(oracle.is_clean(), "{:?}", oracle.violations());
        }
    }
}
