//! SimWorld - The simulation harness container.
//!
//! Replaces the engine's two periodic tasks with an explicit event queue on
//! the virtual clock, so a run is a pure function of (seed, config, registry,
//! command schedule).

use crate::context::SimContext;
use crate::error::SimError;

use std::sync::Arc;
use std::time::Duration;
use tracesim_core::controller::Transition;
use tracesim_core::engine::TickOutcome;
use tracesim_core::{EngineConfig, Registry, Simulation, Snapshot};
use tracesim_env::TraceContext;
use tracing::debug;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Engine tuning (periods, jitter, thresholds)
    pub engine: EngineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            engine: EngineConfig::default(),
        }
    }
}

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Metrics,
    ActiveSet,
}

/// Record of one processed timer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    /// Virtual time at which the timer fired
    pub at: Duration,
    pub timer: TimerKind,
    /// Whether the tick changed any state
    pub applied: bool,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    simulation: Simulation,

    next_metrics: Duration,
    next_active: Duration,

    /// Timer events processed so far
    step_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld over the given registry.
    pub fn new(config: SimConfig, registry: Registry) -> Result<Self, SimError> {
        let context = SimContext::shared(config.seed);
        let simulation =
            Simulation::with_context(context.as_ref(), Arc::new(registry), config.engine.clone())?;

        let next_metrics = config.engine.metrics_period();
        let next_active = config.engine.active_period();

        Ok(Self {
            config,
            context,
            simulation,
            next_metrics,
            next_active,
            step_count: 0,
        })
    }

    /// Virtual time of the next timer event.
    pub fn next_deadline(&self) -> Duration {
        self.next_metrics.min(self.next_active)
    }

    /// Advances to the next timer deadline and fires it.
    ///
    /// When both timers are due at the same instant the metrics tick fires
    /// first.
    pub fn step(&mut self) -> StepEvent {
        let event = if self.next_metrics <= self.next_active {
            let at = self.next_metrics;
            self.context.set_time(at);
            let applied = self.simulation.on_metrics_tick() == TickOutcome::Advanced;
            self.next_metrics = at + self.config.engine.metrics_period();
            StepEvent {
                at,
                timer: TimerKind::Metrics,
                applied,
            }
        } else {
            let at = self.next_active;
            self.context.set_time(at);
            let applied = self.simulation.on_active_tick();
            self.next_active = at + self.config.engine.active_period();
            StepEvent {
                at,
                timer: TimerKind::ActiveSet,
                applied,
            }
        };

        self.step_count += 1;
        debug!(
            t_ms = event.at.as_millis() as u64,
            timer = ?event.timer,
            applied = event.applied,
            "sim step"
        );
        event
    }

    /// Fires every timer due within `duration` from now, then moves the clock
    /// to the end of the window. Returns the number of events processed.
    pub fn run_for(&mut self, duration: Duration) -> usize {
        let end = self.now() + duration;
        let mut steps = 0;
        while self.next_deadline() <= end {
            self.step();
            steps += 1;
        }
        self.context.set_time(end);
        steps
    }

    pub fn toggle_pause(&mut self) -> Transition {
        self.simulation.toggle_pause()
    }

    pub fn trigger_failover(&mut self) -> Transition {
        self.simulation.trigger_failover()
    }

    pub fn reset_from_failover(&mut self) -> Transition {
        self.simulation.reset_from_failover()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn snapshot(&self) -> Snapshot {
        self.simulation.snapshot()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.context.now()
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    /// Returns the number of timer events processed.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(seed: u64) -> SimWorld {
        let config = SimConfig {
            seed,
            ..Default::default()
        };
        SimWorld::new(config, Registry::sample()).unwrap()
    }

    #[test]
    fn test_sim_world_creation() {
        let world = world(42);
        assert_eq!(world.step_count(), 0);
        assert_eq!(world.time(), 0.0);
        assert_eq!(world.next_deadline(), Duration::from_millis(1500));
    }

    #[test]
    fn test_timer_interleaving() {
        let mut world = world(42);
        let timers: Vec<(u64, TimerKind)> = (0..5)
            .map(|_| world.step())
            .map(|e| (e.at.as_millis() as u64, e.timer))
            .collect();

        assert_eq!(
            timers,
            vec![
                (1500, TimerKind::ActiveSet),
                (1700, TimerKind::Metrics),
                (3000, TimerKind::ActiveSet),
                (3400, TimerKind::Metrics),
                (4500, TimerKind::ActiveSet),
            ]
        );
    }

    #[test]
    fn test_equal_deadlines_fire_metrics_first() {
        let config = SimConfig {
            seed: 1,
            engine: EngineConfig {
                metrics_period_ms: 1000,
                active_period_ms: 1000,
                ..EngineConfig::default()
            },
        };
        let mut world = SimWorld::new(config, Registry::sample()).unwrap();
        assert_eq!(world.step().timer, TimerKind::Metrics);
        assert_eq!(world.step().timer, TimerKind::ActiveSet);
    }

    #[test]
    fn test_run_for_counts_events() {
        let mut world = world(42);
        // 1500, 1700, 3000, 3400, 4500, 5100, 6000, 6800
        let steps = world.run_for(Duration::from_secs(7));
        assert_eq!(steps, 8);
        assert_eq!(world.time(), 7.0);

        let snapshot = world.snapshot();
        assert_eq!(snapshot.metrics_ticks, 4);
        assert_eq!(snapshot.active_ticks, 4);
    }

    #[test]
    fn test_sim_world_determinism() {
        let mut world1 = world(7);
        let mut world2 = world(7);
        world1.run_for(Duration::from_secs(30));
        world2.run_for(Duration::from_secs(30));

        // Same seed = same metrics and active set
        assert_eq!(world1.snapshot(), world2.snapshot());

        let mut world3 = world(8);
        world3.run_for(Duration::from_secs(30));
        assert_ne!(world1.snapshot().metrics, world3.snapshot().metrics);
    }
}
