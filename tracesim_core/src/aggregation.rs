//! Aggregation Engine
//! ==================
//!
//! Pure derivation from (registry, flow metrics, active set) to:
//! - **Issue list**: flows that are blocked or over the issue latency
//! - **Compliance gaps**: unencrypted PII, or sensitive data sent to a target
//!   without the required tag (an unresolved target counts as untagged)
//! - **Anomalies**: independent per-flow checks, emitted in a fixed order
//! - **Rollups**: encryption and tag coverage percentages over sensitive flows
//!
//! No hidden state and no randomness: identical inputs always yield an
//! identical [`Derived`].

use crate::config::EngineConfig;
use crate::perturbation::{FlowMetrics, FlowMetricsState};
use crate::registry::{DataFlow, FlowStatus, Registry, Sensitivity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// ANOMALIES
// =============================================================================

/// Severity of a derived finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Info,
    Warning,
    Critical,
}

/// Which check produced an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Blocked,
    HighLatency,
    ComplianceGap,
}

/// A derived, transient finding about one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub flow_id: String,
    pub severity: AnomalySeverity,
    pub kind: AnomalyKind,
    pub reason: String,
}

// =============================================================================
// FILTERS
// =============================================================================

/// Flow filter offered to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowFilter {
    #[default]
    All,
    Pii,
    Confidential,
    /// Blocked, slow, or over the issue latency
    Issues,
}

impl FlowFilter {
    pub fn matches(&self, flow: &FlowAssessment) -> bool {
        match self {
            FlowFilter::All => true,
            FlowFilter::Pii => flow.sensitivity == Sensitivity::Pii,
            FlowFilter::Confidential => flow.sensitivity == Sensitivity::Confidential,
            FlowFilter::Issues => flow.is_issue || flow.status == FlowStatus::Slow,
        }
    }
}

impl std::str::FromStr for FlowFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(FlowFilter::All),
            "pii" => Ok(FlowFilter::Pii),
            "confidential" => Ok(FlowFilter::Confidential),
            "issues" => Ok(FlowFilter::Issues),
            _ => Err(format!("Unknown flow filter: {}", s)),
        }
    }
}

// =============================================================================
// DERIVED OUTPUT
// =============================================================================

/// Per-flow evaluation, in registry order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowAssessment {
    pub flow_id: String,
    pub status: FlowStatus,
    pub sensitivity: Sensitivity,
    pub metrics: FlowMetrics,
    pub is_issue: bool,
    pub compliance_gap: bool,
    pub active: bool,
}

/// Aggregate percentages and counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollup {
    /// Encrypted share of sensitive flows, 100 when there are none
    pub encrypted_sensitive_pct: f64,
    /// Share of PII flows whose target carries the required tag, 100 when there are none
    pub gdpr_covered_pct: f64,
    pub active_flow_count: usize,
    pub sensitive_flow_count: usize,
    pub pii_flow_count: usize,
    pub issue_count: usize,
    pub anomaly_count: usize,
}

/// Everything the aggregation pass produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    pub flows: Vec<FlowAssessment>,
    /// Ids of flows in the issue list
    pub issues: Vec<String>,
    pub anomalies: Vec<Anomaly>,
    pub rollup: Rollup,
}

impl Derived {
    /// Ids of flows matching a filter, in registry order.
    pub fn filtered(&self, filter: FlowFilter) -> Vec<&str> {
        self.flows
            .iter()
            .filter(|f| filter.matches(f))
            .map(|f| f.flow_id.as_str())
            .collect()
    }

    /// Anomalies raised against a flow.
    pub fn anomalies_for<'a>(&'a self, flow_id: &'a str) -> impl Iterator<Item = &'a Anomaly> + 'a {
        self.anomalies.iter().filter(move |a| a.flow_id == flow_id)
    }

    /// Number of anomalies per severity. Every severity is present, possibly zero.
    pub fn anomaly_counts(&self) -> BTreeMap<AnomalySeverity, usize> {
        let mut counts: BTreeMap<AnomalySeverity, usize> = [
            AnomalySeverity::Info,
            AnomalySeverity::Warning,
            AnomalySeverity::Critical,
        ]
        .into_iter()
        .map(|s| (s, 0))
        .collect();
        for anomaly in &self.anomalies {
            *counts.entry(anomaly.severity).or_default() += 1;
        }
        counts
    }
}

// =============================================================================
// AGGREGATOR
// =============================================================================

/// Thresholds applied by the derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub issue_latency_ms: f64,
    pub anomaly_latency_ms: f64,
    pub required_tag: String,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            issue_latency_ms: 60.0,
            anomaly_latency_ms: 80.0,
            required_tag: "GDPR".to_string(),
        }
    }
}

impl From<&EngineConfig> for Thresholds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            issue_latency_ms: config.issue_latency_ms,
            anomaly_latency_ms: config.anomaly_latency_ms,
            required_tag: config.required_tag.clone(),
        }
    }
}

/// Stateless derivation over the registry and current metrics.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    thresholds: Thresholds,
}

impl Aggregator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// True when the flow carries PII unencrypted, or carries sensitive data
    /// to a target that is unknown or lacks the required tag.
    pub fn has_compliance_gap(&self, flow: &DataFlow, registry: &Registry) -> bool {
        if !flow.sensitivity.is_sensitive() {
            return false;
        }
        if flow.sensitivity == Sensitivity::Pii && flow.status != FlowStatus::Encrypted {
            return true;
        }
        !target_has_tag(flow, registry, &self.thresholds.required_tag)
    }

    /// Runs the full derivation.
    pub fn derive(
        &self,
        registry: &Registry,
        metrics: &FlowMetricsState,
        active: &BTreeSet<String>,
    ) -> Derived {
        let t = &self.thresholds;
        let mut flows = Vec::with_capacity(registry.flows().len());
        let mut issues = Vec::new();
        let mut anomalies = Vec::new();

        let mut sensitive = 0usize;
        let mut encrypted_sensitive = 0usize;
        let mut pii = 0usize;
        let mut pii_covered = 0usize;

        for flow in registry.flows() {
            let current = metrics
                .get(&flow.id)
                .copied()
                .unwrap_or_else(|| FlowMetrics::base(flow));
            let blocked = flow.status == FlowStatus::Blocked;
            let is_issue = blocked || current.latency_ms > t.issue_latency_ms;
            let gap = self.has_compliance_gap(flow, registry);

            if is_issue {
                issues.push(flow.id.clone());
            }

            if blocked {
                anomalies.push(Anomaly {
                    flow_id: flow.id.clone(),
                    severity: AnomalySeverity::Critical,
                    kind: AnomalyKind::Blocked,
                    reason: "flow blocked by policy".to_string(),
                });
            }
            if current.latency_ms > t.anomaly_latency_ms {
                let rounded = current.latency_ms.round();
                anomalies.push(Anomaly {
                    flow_id: flow.id.clone(),
                    severity: AnomalySeverity::Warning,
                    kind: AnomalyKind::HighLatency,
                    reason: format!("high latency: {rounded}ms"),
                });
            }
            if gap {
                anomalies.push(Anomaly {
                    flow_id: flow.id.clone(),
                    severity: AnomalySeverity::Critical,
                    kind: AnomalyKind::ComplianceGap,
                    reason: format!(
                        "{}/sovereignty violation: unencrypted PII or unauthorized destination",
                        t.required_tag
                    ),
                });
            }

            if flow.sensitivity.is_sensitive() {
                sensitive += 1;
                if flow.status == FlowStatus::Encrypted {
                    encrypted_sensitive += 1;
                }
            }
            if flow.sensitivity == Sensitivity::Pii {
                pii += 1;
                if target_has_tag(flow, registry, &t.required_tag) {
                    pii_covered += 1;
                }
            }

            flows.push(FlowAssessment {
                flow_id: flow.id.clone(),
                status: flow.status,
                sensitivity: flow.sensitivity,
                metrics: current,
                is_issue,
                compliance_gap: gap,
                active: active.contains(&flow.id),
            });
        }

        let rollup = Rollup {
            encrypted_sensitive_pct: percentage(encrypted_sensitive, sensitive),
            gdpr_covered_pct: percentage(pii_covered, pii),
            active_flow_count: active.len(),
            sensitive_flow_count: sensitive,
            pii_flow_count: pii,
            issue_count: issues.len(),
            anomaly_count: anomalies.len(),
        };

        Derived {
            flows,
            issues,
            anomalies,
            rollup,
        }
    }
}

fn target_has_tag(flow: &DataFlow, registry: &Registry, tag: &str) -> bool {
    registry.node(&flow.to).is_some_and(|n| n.has_tag(tag))
}

/// `part / whole * 100`, defined as 100 for an empty whole.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        100.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::seed_state;
    use crate::registry::{InfraNode, NodeKind, Provider};
    use approx::assert_relative_eq;

    fn node(id: &str, tags: &[&str]) -> InfraNode {
        InfraNode::new(id, NodeKind::Database, id, Provider::Aws, "eu-west-1").tags(tags)
    }

    fn flow(id: &str, to: &str, status: FlowStatus, sensitivity: Sensitivity, latency: f64) -> DataFlow {
        DataFlow::new(id, "a", to, status, sensitivity, latency, 100.0)
    }

    fn registry(flows: Vec<DataFlow>) -> Registry {
        Registry::new(
            vec![node("a", &["GDPR"]), node("tagged", &["GDPR"]), node("untagged", &["SOC2"])],
            flows,
            vec![],
        )
        .unwrap()
    }

    fn derive(registry: &Registry) -> Derived {
        Aggregator::default().derive(registry, &seed_state(registry.flows()), &BTreeSet::new())
    }

    #[test]
    fn test_sample_rollups() {
        let registry = Registry::sample();
        let derived = derive(&registry);

        // 5 sensitive flows, flow-5 and flow-7 are not encrypted
        assert_eq!(derived.rollup.sensitive_flow_count, 5);
        assert_relative_eq!(derived.rollup.encrypted_sensitive_pct, 60.0);
        // 3 PII flows, only flow-5's target (gcp-us-gw) lacks GDPR
        assert_eq!(derived.rollup.pii_flow_count, 3);
        assert_relative_eq!(derived.rollup.gdpr_covered_pct, 200.0 / 3.0);
        assert_eq!(derived.issues, vec!["flow-5"]);
    }

    #[test]
    fn test_sample_anomalies() {
        let derived = derive(&Registry::sample());
        let found: Vec<(&str, AnomalyKind)> = derived
            .anomalies
            .iter()
            .map(|a| (a.flow_id.as_str(), a.kind))
            .collect();

        assert_eq!(
            found,
            vec![
                ("flow-5", AnomalyKind::Blocked),
                ("flow-5", AnomalyKind::ComplianceGap),
            ]
        );
        assert!(derived.anomalies.iter().all(|a| a.severity == AnomalySeverity::Critical));
    }

    #[test]
    fn test_empty_denominators_are_100() {
        let registry = registry(vec![flow("f", "tagged", FlowStatus::Active, Sensitivity::Public, 1.0)]);
        let derived = derive(&registry);
        assert_eq!(derived.rollup.encrypted_sensitive_pct, 100.0);
        assert_eq!(derived.rollup.gdpr_covered_pct, 100.0);

        let empty = derive(&Registry::empty());
        assert!(empty.issues.is_empty());
        assert!(empty.anomalies.is_empty());
        assert!(empty.flows.is_empty());
        assert_eq!(empty.rollup.encrypted_sensitive_pct, 100.0);
        assert_eq!(empty.rollup.gdpr_covered_pct, 100.0);
    }

    #[test]
    fn test_blocked_flow_in_issues_and_critical() {
        let registry = registry(vec![flow("f", "tagged", FlowStatus::Blocked, Sensitivity::Logs, 0.0)]);
        let derived = derive(&registry);

        assert_eq!(derived.issues, vec!["f"]);
        assert_eq!(derived.anomalies.len(), 1);
        assert_eq!(derived.anomalies[0].severity, AnomalySeverity::Critical);
        assert_eq!(derived.anomalies[0].reason, "flow blocked by policy");
    }

    #[test]
    fn test_unencrypted_pii_is_gap_regardless_of_latency() {
        for latency in [0.0, 30.0, 70.0] {
            let registry = registry(vec![flow("f", "tagged", FlowStatus::Active, Sensitivity::Pii, latency)]);
            let derived = derive(&registry);
            assert!(derived
                .anomalies
                .iter()
                .any(|a| a.kind == AnomalyKind::ComplianceGap && a.severity == AnomalySeverity::Critical));
        }
    }

    #[test]
    fn test_gap_and_latency_not_deduplicated() {
        let registry = registry(vec![flow("f", "untagged", FlowStatus::Active, Sensitivity::Pii, 95.4)]);
        let derived = derive(&registry);

        assert_eq!(derived.anomalies.len(), 2);
        assert_eq!(derived.anomalies[0].kind, AnomalyKind::HighLatency);
        assert_eq!(derived.anomalies[0].severity, AnomalySeverity::Warning);
        assert_eq!(derived.anomalies[0].reason, "high latency: 95ms");
        assert_eq!(derived.anomalies[1].kind, AnomalyKind::ComplianceGap);
        assert_eq!(
            derived.anomalies[1].reason,
            "GDPR/sovereignty violation: unencrypted PII or unauthorized destination"
        );
    }

    #[test]
    fn test_gap_without_latency_is_single_entry() {
        let registry = registry(vec![flow("f", "untagged", FlowStatus::Active, Sensitivity::Pii, 10.0)]);
        assert_eq!(derive(&registry).anomalies.len(), 1);
    }

    #[test]
    fn test_confidential_to_unknown_target_is_gap() {
        let registry = registry(vec![flow("f", "ghost", FlowStatus::Encrypted, Sensitivity::Confidential, 1.0)]);
        let aggregator = Aggregator::default();
        assert!(aggregator.has_compliance_gap(&registry.flows()[0], &registry));

        let fine = registry_with_target("tagged");
        assert!(!aggregator.has_compliance_gap(&fine.flows()[0], &fine));
    }

    fn registry_with_target(to: &str) -> Registry {
        registry(vec![flow("f", to, FlowStatus::Encrypted, Sensitivity::Confidential, 1.0)])
    }

    #[test]
    fn test_issue_uses_current_latency() {
        let registry = registry(vec![flow("f", "tagged", FlowStatus::Active, Sensitivity::Public, 10.0)]);
        let mut metrics = seed_state(registry.flows());
        metrics.insert("f".to_string(), FlowMetrics { latency_ms: 61.0, throughput: 5.0 });

        let derived = Aggregator::default().derive(&registry, &metrics, &BTreeSet::new());
        assert_eq!(derived.issues, vec!["f"]);
        assert!(derived.anomalies.is_empty());
    }

    #[test]
    fn test_derivation_is_pure() {
        let registry = Registry::sample();
        let metrics = seed_state(registry.flows());
        let active: BTreeSet<String> = ["flow-1", "flow-2"].iter().map(|s| s.to_string()).collect();
        let aggregator = Aggregator::default();

        let a = aggregator.derive(&registry, &metrics, &active);
        let b = aggregator.derive(&registry, &metrics, &active);
        assert_eq!(a, b);
        assert_eq!(a.rollup.active_flow_count, 2);
    }

    #[test]
    fn test_filters() {
        let derived = derive(&Registry::sample());
        assert_eq!(derived.filtered(FlowFilter::All).len(), 7);
        assert_eq!(derived.filtered(FlowFilter::Pii), vec!["flow-1", "flow-4", "flow-5"]);
        assert_eq!(derived.filtered(FlowFilter::Confidential), vec!["flow-3", "flow-7"]);
        assert_eq!(derived.filtered(FlowFilter::Issues), vec!["flow-5"]);
        assert_eq!("ISSUES".parse::<FlowFilter>().unwrap(), FlowFilter::Issues);
        assert!("everything".parse::<FlowFilter>().is_err());
    }

    #[test]
    fn test_slow_flow_matches_issue_filter_only() {
        let registry = registry(vec![flow("f", "tagged", FlowStatus::Slow, Sensitivity::Public, 5.0)]);
        let derived = derive(&registry);
        assert!(derived.issues.is_empty());
        assert_eq!(derived.filtered(FlowFilter::Issues), vec!["f"]);
    }

    #[test]
    fn test_anomaly_counts() {
        let derived = derive(&Registry::sample());
        let counts = derived.anomaly_counts();
        assert_eq!(counts[&AnomalySeverity::Critical], 2);
        assert_eq!(counts[&AnomalySeverity::Warning], 0);
        assert_eq!(derived.anomalies_for("flow-5").count(), 2);
        assert_eq!(derived.anomalies_for("flow-1").count(), 0);
    }

    #[test]
    fn test_custom_required_tag() {
        let aggregator = Aggregator::new(Thresholds {
            required_tag: "SOC2".to_string(),
            ..Thresholds::default()
        });
        let registry = registry(vec![flow("f", "untagged", FlowStatus::Encrypted, Sensitivity::Pii, 1.0)]);
        let derived = aggregator.derive(&registry, &seed_state(registry.flows()), &BTreeSet::new());

        assert!(derived.anomalies.is_empty());
        assert_eq!(derived.rollup.gdpr_covered_pct, 100.0);
    }
}
