//! Simulation Controller
//!
//! A three-state machine gating the tick-driven components, plus the
//! cosmetic "active flow set" it refreshes while running.
//!
//! ```text
//!            toggle_pause
//!   Running ◄────────────► Paused
//!      │  ▲                  │
//!      │  │ reset_from_      │
//!      │  │ failover         │ trigger_failover
//!      ▼  │                  ▼
//!   ┌──────────────────────────┐
//!   │         Failover         │  (toggle_pause is a no-op here)
//!   └──────────────────────────┘
//! ```
//!
//! | State    | Metrics ticks | Active-set ticks |
//! |----------|---------------|------------------|
//! | Running  | yes           | yes              |
//! | Paused   | no            | no               |
//! | Failover | yes           | no               |

use crate::registry::{DataFlow, FlowStatus};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Narrative state of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationState {
    #[default]
    Running,
    Paused,
    Failover,
}

impl SimulationState {
    /// Whether the perturbation tick mutates metrics in this state.
    pub fn advances_metrics(&self) -> bool {
        !matches!(self, SimulationState::Paused)
    }

    /// Whether the active-flow-set tick refreshes in this state.
    pub fn refreshes_active_set(&self) -> bool {
        matches!(self, SimulationState::Running)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SimulationState::Running => "running",
            SimulationState::Paused => "paused",
            SimulationState::Failover => "failover",
        }
    }
}

impl std::fmt::Display for SimulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of a transition command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SimulationState,
    pub to: SimulationState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Flow ids currently shown as carrying traffic.
pub type ActiveFlowSet = BTreeSet<String>;

/// Owns the simulation state and the active-flow set.
#[derive(Debug, Clone)]
pub struct SimulationController {
    state: SimulationState,
    active: ActiveFlowSet,
    include_probability: f64,
}

impl SimulationController {
    /// Creates a running controller with an empty active set.
    ///
    /// `include_probability` is clamped to `[0, 1]`.
    pub fn new(include_probability: f64) -> Self {
        Self {
            state: SimulationState::Running,
            active: ActiveFlowSet::new(),
            include_probability: include_probability.clamp(0.0, 1.0),
        }
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn active_flows(&self) -> &ActiveFlowSet {
        &self.active
    }

    /// Running ⇄ Paused. Leaves Failover untouched.
    pub fn toggle_pause(&mut self) -> Transition {
        let next = match self.state {
            SimulationState::Running => SimulationState::Paused,
            SimulationState::Paused => SimulationState::Running,
            SimulationState::Failover => SimulationState::Failover,
        };
        self.transition(next, "toggle_pause")
    }

    /// Any state → Failover.
    pub fn trigger_failover(&mut self) -> Transition {
        self.transition(SimulationState::Failover, "trigger_failover")
    }

    /// Failover → Running. No-op from other states.
    pub fn reset_from_failover(&mut self) -> Transition {
        let next = match self.state {
            SimulationState::Failover => SimulationState::Running,
            other => other,
        };
        self.transition(next, "reset_from_failover")
    }

    fn transition(&mut self, next: SimulationState, command: &str) -> Transition {
        let t = Transition {
            from: self.state,
            to: next,
        };
        self.state = next;
        if t.changed() {
            info!(command, from = %t.from, to = %t.to, "simulation state changed");
        } else {
            debug!(command, state = %t.from, "command left state unchanged");
        }
        t
    }

    /// Re-rolls the active set: each non-blocked flow is included with the
    /// configured probability. Returns false (set untouched) unless running.
    pub fn refresh_active_set<R: Rng + ?Sized>(&mut self, flows: &[DataFlow], rng: &mut R) -> bool {
        if !self.state.refreshes_active_set() {
            return false;
        }
        let p = self.include_probability;
        self.active = flows
            .iter()
            .filter(|f| f.status != FlowStatus::Blocked)
            .filter(|_| rng.gen_bool(p))
            .map(|f| f.id.clone())
            .collect();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_initial_state_running() {
        let controller = SimulationController::new(0.7);
        assert_eq!(controller.state(), SimulationState::Running);
        assert!(controller.active_flows().is_empty());
    }

    #[test]
    fn test_toggle_pause_twice_restores() {
        let mut controller = SimulationController::new(0.7);
        assert_eq!(controller.toggle_pause().to, SimulationState::Paused);
        assert_eq!(controller.toggle_pause().to, SimulationState::Running);

        controller.trigger_failover();
        controller.toggle_pause();
        controller.toggle_pause();
        assert_eq!(controller.state(), SimulationState::Failover);
    }

    #[test]
    fn test_failover_from_any_state() {
        for setup in [0, 1, 2] {
            let mut controller = SimulationController::new(0.7);
            match setup {
                1 => {
                    controller.toggle_pause();
                }
                2 => {
                    controller.trigger_failover();
                }
                _ => {}
            }
            controller.trigger_failover();
            assert_eq!(controller.state(), SimulationState::Failover);
        }
    }

    #[test]
    fn test_reset_from_failover() {
        let mut controller = SimulationController::new(0.7);
        assert!(!controller.reset_from_failover().changed());

        controller.trigger_failover();
        let t = controller.reset_from_failover();
        assert_eq!(t.from, SimulationState::Failover);
        assert_eq!(t.to, SimulationState::Running);
    }

    #[test]
    fn test_tick_gating_table() {
        assert!(SimulationState::Running.advances_metrics());
        assert!(!SimulationState::Paused.advances_metrics());
        assert!(SimulationState::Failover.advances_metrics());

        assert!(SimulationState::Running.refreshes_active_set());
        assert!(!SimulationState::Paused.refreshes_active_set());
        assert!(!SimulationState::Failover.refreshes_active_set());
    }

    #[test]
    fn test_active_set_never_contains_blocked() {
        let registry = Registry::sample();
        let mut controller = SimulationController::new(1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        assert!(controller.refresh_active_set(registry.flows(), &mut rng));
        // p = 1 includes every non-blocked flow
        assert_eq!(controller.active_flows().len(), 6);
        assert!(!controller.active_flows().contains("flow-5"));
    }

    #[test]
    fn test_active_set_frozen_unless_running() {
        let registry = Registry::sample();
        let mut controller = SimulationController::new(1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        controller.refresh_active_set(registry.flows(), &mut rng);
        let before = controller.active_flows().clone();

        controller.toggle_pause();
        assert!(!controller.refresh_active_set(registry.flows(), &mut rng));
        assert_eq!(controller.active_flows(), &before);

        controller.toggle_pause();
        controller.trigger_failover();
        assert!(!controller.refresh_active_set(registry.flows(), &mut rng));
        assert_eq!(controller.active_flows(), &before);
    }

    #[test]
    fn test_zero_probability_empties_set() {
        let registry = Registry::sample();
        let mut controller = SimulationController::new(0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        controller.refresh_active_set(registry.flows(), &mut rng);
        assert!(controller.active_flows().is_empty());
    }
}
