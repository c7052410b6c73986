//! Engine Runtime - Orchestrates the simulation components with an environment context.
//!
//! This module provides the integration layer between the pure components
//! (perturbation, aggregation, controller) and the environment abstraction
//! (TraceContext).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TraceEngine                           │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Context: TraceContext                   │   │
//! │  │  • sleep() → tick cadence                            │   │
//! │  │  • spawn() → cancellable timer tasks                 │   │
//! │  │  • derive_rng() → jitter / flicker streams           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │        metrics task │              │ active-set task        │
//! │  ┌──────────────────▼──────────────▼───────────────────┐    │
//! │  │                   Simulation                        │    │
//! │  │  Perturbation ─► Aggregation     Controller         │    │
//! │  └─────────────────────────┬───────────────────────────┘    │
//! │                            ▼ watch::Sender<Arc<Snapshot>>   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Simulation`] is the timer-free core, usable directly by a
//! deterministic harness; [`TraceEngine`] drives it from two periodic tasks
//! and publishes a [`Snapshot`] after every change.
//!
//! # Usage
//!
//! ```ignore
//! use tracesim_core::{EngineConfig, Registry, TraceEngine};
//! use tracesim_env::TokioContext;
//!
//! let engine = TraceEngine::create(TokioContext::shared(), Registry::sample(), EngineConfig::default())?;
//! let mut rx = engine.subscribe();
//! rx.changed().await?;
//! engine.dispose().await?;
//! ```

use crate::aggregation::{Aggregator, Derived, Thresholds};
use crate::config::EngineConfig;
use crate::controller::{ActiveFlowSet, SimulationController, SimulationState, Transition};
use crate::error::CoreError;
use crate::perturbation::{FlowMetricsState, JitterBounds, PerturbationEngine};
use crate::registry::Registry;
use crate::topology::{edge_views, EdgeView};

use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracesim_env::{TaskHandle, TraceContext, ACTIVE_SET_STREAM, METRICS_STREAM};
use tracing::{debug, warn};

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Read-only view of everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Perturbation ticks applied
    pub metrics_ticks: u64,
    /// Perturbation ticks skipped while paused
    pub skipped_ticks: u64,
    /// Active-set refreshes applied
    pub active_ticks: u64,
    pub state: SimulationState,
    pub metrics: FlowMetricsState,
    pub active_flows: ActiveFlowSet,
    pub derived: Derived,
    pub edges: Vec<EdgeView>,
}

/// What a metrics tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced,
    Skipped,
}

// =============================================================================
// SIMULATION (timer-free core)
// =============================================================================

/// Registry, metrics, controller and latest derivation, advanced by explicit calls.
#[derive(Debug)]
pub struct Simulation {
    registry: Arc<Registry>,
    config: EngineConfig,
    perturbation: PerturbationEngine,
    controller: SimulationController,
    aggregator: Aggregator,
    derived: Derived,
    metrics_rng: ChaCha8Rng,
    active_rng: ChaCha8Rng,
    skipped_ticks: u64,
    active_ticks: u64,
}

impl Simulation {
    /// Validates the config, seeds metrics from the registry and runs the
    /// first derivation.
    pub fn new(
        registry: Arc<Registry>,
        config: EngineConfig,
        metrics_rng: ChaCha8Rng,
        active_rng: ChaCha8Rng,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        for dangling in registry.dangling_references() {
            warn!(
                holder = %dangling.holder,
                target = %dangling.target,
                "unresolved node reference; treated as absent"
            );
        }

        let mut perturbation = PerturbationEngine::new(JitterBounds::new(
            config.latency_jitter_ms,
            config.throughput_jitter,
        )?);
        perturbation.initialize(registry.flows());

        let controller = SimulationController::new(config.active_probability);
        let aggregator = Aggregator::new(Thresholds::from(&config));
        let derived = aggregator.derive(&registry, perturbation.state(), controller.active_flows());

        Ok(Self {
            registry,
            config,
            perturbation,
            controller,
            aggregator,
            derived,
            metrics_rng,
            active_rng,
            skipped_ticks: 0,
            active_ticks: 0,
        })
    }

    /// Builds a simulation whose RNG streams come from the context.
    pub fn with_context<Ctx: TraceContext>(
        ctx: &Ctx,
        registry: Arc<Registry>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        Self::new(
            registry,
            config,
            ctx.derive_rng(METRICS_STREAM),
            ctx.derive_rng(ACTIVE_SET_STREAM),
        )
    }

    /// Perturbation tick: jitter metrics unless paused, then re-derive.
    pub fn on_metrics_tick(&mut self) -> TickOutcome {
        if !self.controller.state().advances_metrics() {
            self.skipped_ticks += 1;
            debug!(skipped = self.skipped_ticks, "metrics tick skipped while paused");
            return TickOutcome::Skipped;
        }

        self.perturbation.tick(self.registry.flows(), &mut self.metrics_rng);
        self.rederive();
        debug!(
            tick = self.perturbation.ticks(),
            issues = self.derived.rollup.issue_count,
            anomalies = self.derived.rollup.anomaly_count,
            "metrics tick"
        );
        TickOutcome::Advanced
    }

    /// Active-set tick: refresh the flicker set while running.
    pub fn on_active_tick(&mut self) -> bool {
        let refreshed = self
            .controller
            .refresh_active_set(self.registry.flows(), &mut self.active_rng);
        if refreshed {
            self.active_ticks += 1;
            self.rederive();
        }
        refreshed
    }

    pub fn toggle_pause(&mut self) -> Transition {
        self.controller.toggle_pause()
    }

    pub fn trigger_failover(&mut self) -> Transition {
        self.controller.trigger_failover()
    }

    pub fn reset_from_failover(&mut self) -> Transition {
        self.controller.reset_from_failover()
    }

    fn rederive(&mut self) {
        self.derived = self.aggregator.derive(
            &self.registry,
            self.perturbation.state(),
            self.controller.active_flows(),
        );
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn state(&self) -> SimulationState {
        self.controller.state()
    }

    pub fn metrics(&self) -> &FlowMetricsState {
        self.perturbation.state()
    }

    pub fn active_flows(&self) -> &ActiveFlowSet {
        self.controller.active_flows()
    }

    pub fn derived(&self) -> &Derived {
        &self.derived
    }

    pub fn metrics_ticks(&self) -> u64 {
        self.perturbation.ticks()
    }

    /// Captures the current state for rendering.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            metrics_ticks: self.perturbation.ticks(),
            skipped_ticks: self.skipped_ticks,
            active_ticks: self.active_ticks,
            state: self.controller.state(),
            metrics: self.perturbation.state().clone(),
            active_flows: self.controller.active_flows().clone(),
            derived: self.derived.clone(),
            edges: edge_views(&self.registry, &self.derived),
        }
    }
}

// =============================================================================
// TRACE ENGINE (timer-driven)
// =============================================================================

/// A running simulation instance with its own timers.
///
/// Generic over the context, allowing the same engine to run on real
/// tokio time or inside a deterministic harness. Dropping the engine aborts
/// both timer tasks; [`TraceEngine::dispose`] also waits for them.
pub struct TraceEngine<Ctx>
where
    Ctx: TraceContext,
{
    context: Arc<Ctx>,
    simulation: Arc<Mutex<Simulation>>,
    snapshots: Arc<watch::Sender<Arc<Snapshot>>>,
    tasks: Vec<TaskHandle>,
}

impl<Ctx> TraceEngine<Ctx>
where
    Ctx: TraceContext,
{
    /// Builds the simulation and starts both periodic tasks.
    pub fn create(
        context: Arc<Ctx>,
        registry: Registry,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        let metrics_period = config.metrics_period();
        let active_period = config.active_period();
        let simulation = Simulation::with_context(context.as_ref(), Arc::new(registry), config)?;

        let (tx, _rx) = watch::channel(Arc::new(simulation.snapshot()));
        let snapshots = Arc::new(tx);
        let simulation = Arc::new(Mutex::new(simulation));

        let metrics_task = {
            let ctx = Arc::clone(&context);
            let sim = Arc::clone(&simulation);
            let tx = Arc::clone(&snapshots);
            context.spawn("metrics-tick", async move {
                loop {
                    ctx.sleep(metrics_period).await;
                    let snapshot = {
                        let mut sim = lock(&sim);
                        sim.on_metrics_tick();
                        sim.snapshot()
                    };
                    tx.send_replace(Arc::new(snapshot));
                }
            })
        };

        let active_task = {
            let ctx = Arc::clone(&context);
            let sim = Arc::clone(&simulation);
            let tx = Arc::clone(&snapshots);
            context.spawn("active-set-tick", async move {
                loop {
                    ctx.sleep(active_period).await;
                    let snapshot = {
                        let mut sim = lock(&sim);
                        if !sim.on_active_tick() {
                            continue;
                        }
                        sim.snapshot()
                    };
                    tx.send_replace(Arc::new(snapshot));
                }
            })
        };

        debug!(
            seed = context.seed(),
            ?metrics_period,
            ?active_period,
            "trace engine started"
        );

        Ok(Self {
            context,
            simulation,
            snapshots,
            tasks: vec![metrics_task, active_task],
        })
    }

    /// Returns a receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.subscribe()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshots.borrow())
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    pub fn toggle_pause(&self) -> Transition {
        self.command(Simulation::toggle_pause)
    }

    pub fn trigger_failover(&self) -> Transition {
        self.command(Simulation::trigger_failover)
    }

    pub fn reset_from_failover(&self) -> Transition {
        self.command(Simulation::reset_from_failover)
    }

    fn command(&self, apply: fn(&mut Simulation) -> Transition) -> Transition {
        let (transition, snapshot) = {
            let mut sim = lock(&self.simulation);
            let transition = apply(&mut sim);
            (transition, sim.snapshot())
        };
        self.snapshots.send_replace(Arc::new(snapshot));
        transition
    }

    /// True while both timer tasks are alive.
    pub fn is_ticking(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| !t.is_finished())
    }

    /// Cancels both timer tasks and waits for them to stop.
    pub async fn dispose(mut self) -> Result<(), CoreError> {
        for task in self.tasks.drain(..) {
            let name = task.name().to_string();
            task.shutdown().await?;
            debug!(task = %name, "timer task stopped");
        }
        Ok(())
    }
}

fn lock(sim: &Mutex<Simulation>) -> MutexGuard<'_, Simulation> {
    sim.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::time::Duration;
    use tracesim_env::TokioContext;

    fn simulation(registry: Registry) -> Simulation {
        Simulation::new(
            Arc::new(registry),
            EngineConfig::default(),
            ChaCha8Rng::seed_from_u64(1),
            ChaCha8Rng::seed_from_u64(2),
        )
        .unwrap()
    }

    #[test]
    fn test_initial_derivation_present() {
        let sim = simulation(Registry::sample());
        assert_eq!(sim.metrics_ticks(), 0);
        assert_eq!(sim.derived().issues, vec!["flow-5"]);
        assert_eq!(sim.snapshot().state, SimulationState::Running);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            metrics_period_ms: 0,
            ..EngineConfig::default()
        };
        let result = Simulation::new(
            Arc::new(Registry::sample()),
            config,
            ChaCha8Rng::seed_from_u64(1),
            ChaCha8Rng::seed_from_u64(2),
        );
        assert!(matches!(result, Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_derivation_follows_every_tick() {
        let mut sim = simulation(Registry::sample());
        for _ in 0..20 {
            assert_eq!(sim.on_metrics_tick(), TickOutcome::Advanced);
            let fresh = sim
                .aggregator()
                .derive(sim.registry(), sim.metrics(), sim.active_flows());
            assert_eq!(&fresh, sim.derived());
        }
    }

    #[test]
    fn test_pause_resume_keeps_state() {
        let mut sim = simulation(Registry::sample());
        sim.on_metrics_tick();
        sim.on_metrics_tick();
        let before = sim.metrics().clone();

        sim.toggle_pause();
        assert_eq!(sim.on_metrics_tick(), TickOutcome::Skipped);
        assert!(!sim.on_active_tick());
        assert_eq!(sim.metrics(), &before);

        sim.toggle_pause();
        assert_eq!(sim.state(), SimulationState::Running);
        sim.on_metrics_tick();
        assert_eq!(sim.metrics_ticks(), 3);
        assert_eq!(sim.snapshot().skipped_ticks, 1);
        // Resumed from jittered state, not base values
        assert_ne!(sim.metrics(), &crate::perturbation::seed_state(sim.registry().flows()));
    }

    #[test]
    fn test_failover_keeps_metrics_ticking() {
        let mut sim = simulation(Registry::sample());
        sim.trigger_failover();
        assert_eq!(sim.on_metrics_tick(), TickOutcome::Advanced);
        assert!(!sim.on_active_tick());

        sim.reset_from_failover();
        assert!(sim.on_active_tick());
    }

    #[test]
    fn test_empty_registry_snapshot() {
        let mut sim = simulation(Registry::empty());
        sim.on_metrics_tick();
        sim.on_active_tick();
        let snapshot = sim.snapshot();

        assert!(snapshot.metrics.is_empty());
        assert!(snapshot.derived.anomalies.is_empty());
        assert!(snapshot.edges.is_empty());
        assert_eq!(snapshot.derived.rollup.encrypted_sensitive_pct, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_ticks_on_schedule() {
        let engine = TraceEngine::create(
            TokioContext::shared(),
            Registry::sample(),
            EngineConfig::default(),
        )
        .unwrap();
        assert!(engine.is_ticking());

        tokio::time::sleep(Duration::from_millis(1700 * 3 + 10)).await;
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.metrics_ticks, 3);
        assert_eq!(snapshot.active_ticks, 3);
        assert!(snapshot
            .metrics
            .values()
            .all(|m| m.latency_ms >= 0.0 && m.throughput >= 0.0));

        engine.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_subscribers_see_ticks() {
        let engine = TraceEngine::create(
            TokioContext::shared(),
            Registry::sample(),
            EngineConfig::default(),
        )
        .unwrap();
        let mut rx = engine.subscribe();

        rx.changed().await.unwrap();
        let first = Arc::clone(&*rx.borrow_and_update());
        assert!(first.metrics_ticks + first.active_ticks >= 1);

        engine.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_pause_stops_mutation() {
        let engine = TraceEngine::create(
            TokioContext::shared(),
            Registry::sample(),
            EngineConfig::default(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1800)).await;
        let t = engine.toggle_pause();
        assert_eq!(t.to, SimulationState::Paused);
        let paused = engine.snapshot();

        tokio::time::sleep(Duration::from_millis(1700 * 2)).await;
        let later = engine.snapshot();
        assert_eq!(later.metrics, paused.metrics);
        assert_eq!(later.metrics_ticks, 1);
        assert_eq!(later.skipped_ticks, 2);
        // Timer keeps running while paused
        assert!(engine.is_ticking());

        engine.toggle_pause();
        tokio::time::sleep(Duration::from_millis(1700)).await;
        assert_eq!(engine.snapshot().metrics_ticks, 2);

        engine.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_commands_publish_immediately() {
        let engine = TraceEngine::create(
            TokioContext::shared(),
            Registry::sample(),
            EngineConfig::default(),
        )
        .unwrap();
        let mut rx = engine.subscribe();

        engine.trigger_failover();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state, SimulationState::Failover);

        engine.reset_from_failover();
        assert_eq!(engine.snapshot().state, SimulationState::Running);

        engine.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_timers() {
        let engine = TraceEngine::create(
            TokioContext::shared(),
            Registry::sample(),
            EngineConfig::default(),
        )
        .unwrap();
        let rx = engine.subscribe();
        assert!(engine.dispose().await.is_ok());

        // No task holds the sender any more
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.has_changed().is_err());
    }
}
