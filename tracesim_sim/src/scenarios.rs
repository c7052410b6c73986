//! Deterministic scenarios for the traceability engine.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// TS-001: Sample registry, running the whole time
    SteadyState,

    /// TS-002: Pause mid-run, then resume from the jittered state
    PauseResume,

    /// TS-003: Failover freezes the active set, explicit reset restores it
    Failover,

    /// TS-004: Jitter bounds widened well past the base latencies
    LatencyStorm,

    /// TS-005: No nodes, no flows
    EmptyRegistry,

    /// TS-006: Flows and connections pointing at unknown nodes
    DanglingRefs,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyState,
            ScenarioId::PauseResume,
            ScenarioId::Failover,
            ScenarioId::LatencyStorm,
            ScenarioId::EmptyRegistry,
            ScenarioId::DanglingRefs,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyState => "steady_state",
            ScenarioId::PauseResume => "pause_resume",
            ScenarioId::Failover => "failover",
            ScenarioId::LatencyStorm => "latency_storm",
            ScenarioId::EmptyRegistry => "empty_registry",
            ScenarioId::DanglingRefs => "dangling_refs",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyState => "Sample registry ticking freely, all invariants hold",
            ScenarioId::PauseResume => "Pause freezes metrics and active set, resume continues from frozen state",
            ScenarioId::Failover => "Metrics keep ticking in failover, active set frozen until reset",
            ScenarioId::LatencyStorm => "±40ms / ±500 jitter drives low-latency flows into the zero clamp",
            ScenarioId::EmptyRegistry => "Empty registry yields empty outputs and 100% rollups",
            ScenarioId::DanglingRefs => "Unknown targets degrade to non-compliant, never panic",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_state" | "steadystate" | "ts-001" => Ok(ScenarioId::SteadyState),
            "pause_resume" | "pauseresume" | "ts-002" => Ok(ScenarioId::PauseResume),
            "failover" | "ts-003" => Ok(ScenarioId::Failover),
            "latency_storm" | "latencystorm" | "ts-004" => Ok(ScenarioId::LatencyStorm),
            "empty_registry" | "emptyregistry" | "ts-005" => Ok(ScenarioId::EmptyRegistry),
            "dangling_refs" | "danglingrefs" | "ts-006" => Ok(ScenarioId::DanglingRefs),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("TS-003".parse::<ScenarioId>(), Ok(ScenarioId::Failover));
        assert_eq!("PauseResume".parse::<ScenarioId>(), Ok(ScenarioId::PauseResume));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
