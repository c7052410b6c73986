//! Scenario runner - executes deterministic engine scenarios.

use crate::error::SimError;
use crate::oracle::{Oracle, Violation};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use std::time::Duration;
use tracesim_core::aggregation::AnomalyKind;
use tracesim_core::registry::{DataFlow, FlowStatus, InfraNode, NodeKind, Provider, Sensitivity};
use tracesim_core::{EngineConfig, Registry, SimulationState};
use tracing::{debug, info};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Timer events processed
    pub total_steps: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Invariant violations reported by the oracle
    pub violations: Vec<Violation>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Perturbation ticks applied
    pub metrics_ticks: u64,

    /// Perturbation ticks skipped while paused
    pub skipped_ticks: u64,

    /// Active-set refreshes applied
    pub active_ticks: u64,

    /// Largest anomaly list seen
    pub peak_anomalies: usize,

    /// Highest flow latency seen (ms)
    pub peak_latency_ms: f64,

    /// Oracle observations
    pub invariant_checks: u64,
}

/// A running scenario: world, oracle and the step observer.
struct Run<'a> {
    world: SimWorld,
    oracle: Oracle,
    metrics: ScenarioMetrics,
    on_step: &'a mut dyn FnMut(&SimWorld),
}

impl Run<'_> {
    fn advance(&mut self, duration: Duration) {
        let end = self.world.now() + duration;
        while self.world.next_deadline() <= end {
            let event = self.world.step();
            self.oracle.observe(self.world.simulation(), event.at);
            self.record();
            (self.on_step)(&self.world);
        }
        self.world.context.set_time(end);
    }

    fn record(&mut self) {
        let sim = self.world.simulation();
        self.metrics.peak_anomalies = self.metrics.peak_anomalies.max(sim.derived().anomalies.len());
        let peak = sim
            .metrics()
            .values()
            .map(|m| m.latency_ms)
            .fold(self.metrics.peak_latency_ms, f64::max);
        self.metrics.peak_latency_ms = peak;
    }

    fn finish(mut self, scenario: ScenarioId, seed: u64, check: Result<(), String>) -> ScenarioResult {
        let snapshot = self.world.snapshot();
        self.metrics.metrics_ticks = snapshot.metrics_ticks;
        self.metrics.skipped_ticks = snapshot.skipped_ticks;
        self.metrics.active_ticks = snapshot.active_ticks;
        self.metrics.invariant_checks = self.oracle.checks();

        let violations = self.oracle.violations().to_vec();
        let failure_reason = match (check, violations.first()) {
            (Err(reason), _) => Some(reason),
            (Ok(()), Some(v)) => Some(format!(
                "{} invariant violation(s), first: {:?} at {}ms ({})",
                violations.len(),
                v.invariant,
                v.at_ms,
                v.detail
            )),
            (Ok(()), None) => None,
        };

        ScenarioResult {
            scenario,
            seed,
            passed: failure_reason.is_none(),
            total_steps: self.world.step_count(),
            final_time_secs: self.world.time(),
            failure_reason,
            violations,
            metrics: self.metrics,
        }
    }
}

/// Runs engine scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Simulated duration of each scenario
    duration: Duration,

    /// Base engine configuration (scenarios may override parts of it)
    engine: EngineConfig,

    /// Registry used instead of the built-in sample
    registry: Option<Registry>,
}

/// Converts a user-supplied number of seconds into a [`Duration`].
///
/// Negative, NaN, infinite and out-of-range values are rejected.
pub fn duration_from_secs(secs: f64) -> Result<Duration, SimError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| SimError::Usage(format!("invalid duration {secs}s: {e}")))
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration: Duration::from_secs(60),
            engine: EngineConfig::default(),
            registry: None,
        }
    }

    /// Sets the simulated duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the base engine configuration.
    pub fn with_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Replaces the built-in sample registry.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        self.run_observed(scenario, &mut |_| {})
    }

    /// Runs a scenario, calling `on_step` after every timer event.
    pub fn run_observed(
        &self,
        scenario: ScenarioId,
        on_step: &mut dyn FnMut(&SimWorld),
    ) -> Result<ScenarioResult, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let (engine, registry) = self.setup(scenario)?;
        let world = SimWorld::new(
            SimConfig {
                seed: self.seed,
                engine,
            },
            registry,
        )?;
        let mut run = Run {
            world,
            oracle: Oracle::new(),
            metrics: ScenarioMetrics::default(),
            on_step,
        };
        run.oracle.observe(run.world.simulation(), Duration::ZERO);

        let check = match scenario {
            ScenarioId::SteadyState | ScenarioId::LatencyStorm => self.run_free(&mut run),
            ScenarioId::PauseResume => self.run_pause_resume(&mut run),
            ScenarioId::Failover => self.run_failover(&mut run),
            ScenarioId::EmptyRegistry => self.run_empty(&mut run),
            ScenarioId::DanglingRefs => self.run_dangling(&mut run),
        };

        let result = run.finish(scenario, self.seed, check);
        debug!(
            scenario = scenario.name(),
            steps = result.total_steps,
            passed = result.passed,
            "scenario finished"
        );
        Ok(result)
    }

    fn setup(&self, scenario: ScenarioId) -> Result<(EngineConfig, Registry), SimError> {
        let base = || self.registry.clone().unwrap_or_else(Registry::sample);
        let setup = match scenario {
            ScenarioId::LatencyStorm => (
                EngineConfig {
                    latency_jitter_ms: 40.0,
                    throughput_jitter: 500.0,
                    ..self.engine.clone()
                },
                base(),
            ),
            ScenarioId::EmptyRegistry => (self.engine.clone(), Registry::empty()),
            ScenarioId::DanglingRefs => (self.engine.clone(), with_dangling_refs(&base())?),
            _ => (self.engine.clone(), base()),
        };
        Ok(setup)
    }

    /// TS-001 / TS-004: run untouched and rely on the oracle.
    fn run_free(&self, run: &mut Run<'_>) -> Result<(), String> {
        run.advance(self.duration);
        let ticks = run.world.simulation().metrics_ticks();
        if self.duration >= run.world.config.engine.metrics_period() && ticks == 0 {
            return Err("no perturbation tick fired".to_string());
        }
        Ok(())
    }

    /// TS-002: thirds of running, paused, running.
    fn run_pause_resume(&self, run: &mut Run<'_>) -> Result<(), String> {
        let third = self.duration / 3;
        run.advance(third);

        run.world.toggle_pause();
        let frozen = run.world.simulation().metrics().clone();
        let ticks_at_pause = run.world.simulation().metrics_ticks();
        run.advance(third);

        if run.world.simulation().metrics() != &frozen {
            return Err("metrics changed while paused".to_string());
        }

        let t = run.world.toggle_pause();
        if t.to != SimulationState::Running {
            return Err(format!("second toggle landed in {}", t.to));
        }
        run.advance(self.duration - third * 2);

        let sim = run.world.simulation();
        if self.duration >= run.world.config.engine.metrics_period() * 3
            && sim.metrics_ticks() <= ticks_at_pause
        {
            return Err("perturbation did not resume".to_string());
        }
        Ok(())
    }

    /// TS-003: failover at half time, reset for the last quarter.
    fn run_failover(&self, run: &mut Run<'_>) -> Result<(), String> {
        let half = self.duration / 2;
        let quarter = self.duration / 4;
        run.advance(half);

        run.world.trigger_failover();
        if run.world.toggle_pause().changed() {
            return Err("toggle_pause left failover".to_string());
        }
        let ticks_at_failover = run.world.simulation().metrics_ticks();
        run.advance(quarter);

        let engine = &run.world.config.engine;
        if quarter >= engine.metrics_period()
            && run.world.simulation().metrics_ticks() == ticks_at_failover
        {
            return Err("metrics stopped in failover".to_string());
        }

        let t = run.world.reset_from_failover();
        if t.to != SimulationState::Running {
            return Err(format!("reset landed in {}", t.to));
        }
        run.advance(self.duration - half - quarter);
        Ok(())
    }

    /// TS-005: empty outputs, 100% rollups.
    fn run_empty(&self, run: &mut Run<'_>) -> Result<(), String> {
        run.advance(self.duration);
        let derived = run.world.simulation().derived();
        if !derived.anomalies.is_empty() || !derived.issues.is_empty() || !derived.flows.is_empty() {
            return Err("empty registry produced derived output".to_string());
        }
        let rollup = &derived.rollup;
        if rollup.encrypted_sensitive_pct != 100.0 || rollup.gdpr_covered_pct != 100.0 {
            return Err(format!(
                "empty rollups not 100: {} / {}",
                rollup.encrypted_sensitive_pct, rollup.gdpr_covered_pct
            ));
        }
        Ok(())
    }

    /// TS-006: flows to unknown nodes flagged as compliance gaps.
    fn run_dangling(&self, run: &mut Run<'_>) -> Result<(), String> {
        run.advance(self.duration);
        let sim = run.world.simulation();
        if sim.registry().dangling_references().is_empty() {
            return Err("registry has no dangling references".to_string());
        }
        let flagged = sim
            .derived()
            .anomalies_for(DANGLING_FLOW)
            .any(|a| a.kind == AnomalyKind::ComplianceGap);
        if !flagged {
            return Err(format!("{DANGLING_FLOW} to unknown node not flagged"));
        }
        Ok(())
    }
}

const DANGLING_FLOW: &str = "flow-orphan";

/// Adds a sensitive encrypted flow and a connection that both point at a
/// node missing from the registry.
fn with_dangling_refs(base: &Registry) -> Result<Registry, SimError> {
    let mut nodes = base.nodes().to_vec();
    nodes.push(
        InfraNode::new("legacy-gw", NodeKind::Gateway, "Legacy Gateway", Provider::OnPrem, "dc-1")
            .connects(&["decommissioned-db"]),
    );
    let mut flows = base.flows().to_vec();
    flows.push(DataFlow::new(
        DANGLING_FLOW,
        "legacy-gw",
        "decommissioned-db",
        FlowStatus::Encrypted,
        Sensitivity::Confidential,
        12.0,
        80.0,
    ));
    Ok(Registry::new(nodes, flows, base.events().to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_scenarios_pass_default_seed() {
        let runner = ScenarioRunner::new(42).with_duration(Duration::from_secs(30));
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario).unwrap();
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }

    #[test]
    fn test_pause_resume_counts_skipped_ticks() {
        let result = ScenarioRunner::new(7)
            .with_duration(Duration::from_secs(30))
            .run(ScenarioId::PauseResume)
            .unwrap();

        assert!(result.passed);
        // 10s paused window covers at least five 1.7s ticks
        assert!(result.metrics.skipped_ticks >= 5);
        assert!(result.metrics.metrics_ticks > 0);
    }

    #[test]
    fn test_failover_freezes_active_ticks() {
        let free = ScenarioRunner::new(3)
            .with_duration(Duration::from_secs(40))
            .run(ScenarioId::SteadyState)
            .unwrap();
        let failover = ScenarioRunner::new(3)
            .with_duration(Duration::from_secs(40))
            .run(ScenarioId::Failover)
            .unwrap();

        assert!(failover.passed);
        assert_eq!(free.metrics.metrics_ticks, failover.metrics.metrics_ticks);
        assert!(failover.metrics.active_ticks < free.metrics.active_ticks);
    }

    #[test]
    fn test_results_are_reproducible() {
        let runner = ScenarioRunner::new(99).with_duration(Duration::from_secs(20));
        let a = runner.run(ScenarioId::LatencyStorm).unwrap();
        let b = runner.run(ScenarioId::LatencyStorm).unwrap();

        assert_eq!(a.total_steps, b.total_steps);
        assert_eq!(a.metrics.peak_latency_ms, b.metrics.peak_latency_ms);
        assert_eq!(a.metrics.peak_anomalies, b.metrics.peak_anomalies);
    }

    #[test]
    fn test_observer_sees_every_step() {
        let runner = ScenarioRunner::new(1).with_duration(Duration::from_secs(10));
        let mut seen = 0u64;
        let result = runner
            .run_observed(ScenarioId::SteadyState, &mut |_| seen += 1)
            .unwrap();
        assert_eq!(seen, result.total_steps);
        assert_eq!(result.metrics.invariant_checks, seen + 1);
    }

    #[test]
    fn test_duration_from_secs_rejects_unrepresentable() {
        assert_eq!(duration_from_secs(1.5).unwrap(), Duration::from_millis(1500));
        assert_eq!(duration_from_secs(0.0).unwrap(), Duration::ZERO);

        for secs in [f64::INFINITY, f64::NAN, -1.0, 1e300] {
            assert!(
                matches!(duration_from_secs(secs), Err(SimError::Usage(_))),
                "{secs} accepted"
            );
        }
    }

    #[test]
    fn test_custom_registry_used() {
        let runner = ScenarioRunner::new(1)
            .with_duration(Duration::from_secs(5))
            .with_registry(Registry::empty());
        let result = runner.run(ScenarioId::SteadyState).unwrap();
        assert!(result.passed);
        assert_eq!(result.metrics.peak_anomalies, 0);
    }
}
