//! Edge views for the topology map.
//!
//! Joins each node connection with the flow running over it (either
//! direction) and that flow's derived state, so a renderer can style edges
//! without re-running any checks.

use crate::aggregation::{AnomalySeverity, Derived};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};

/// One drawable connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeView {
    pub from: String,
    pub to: String,
    /// False when `to` does not resolve to a registry node
    pub target_known: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
    pub active: bool,
    pub compliance_gap: bool,
    /// Most severe anomaly raised against the edge's flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst_severity: Option<AnomalySeverity>,
}

/// Builds one view per node connection, in registry order.
pub fn edge_views(registry: &Registry, derived: &Derived) -> Vec<EdgeView> {
    registry
        .nodes()
        .iter()
        .flat_map(|node| {
            node.connections.iter().map(move |target| (node.id.as_str(), target.as_str()))
        })
        .map(|(from, to)| {
            let flow = registry.flow_between(from, to);
            let assessment = flow.and_then(|f| derived.flows.iter().find(|a| a.flow_id == f.id));
            let worst_severity = flow.and_then(|f| {
                derived.anomalies_for(&f.id).map(|a| a.severity).max()
            });

            EdgeView {
                from: from.to_string(),
                to: to.to_string(),
                target_known: registry.node(to).is_some(),
                flow_id: flow.map(|f| f.id.clone()),
                active: assessment.is_some_and(|a| a.active),
                compliance_gap: assessment.is_some_and(|a| a.compliance_gap),
                worst_severity,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Aggregator;
    use crate::perturbation::seed_state;
    use crate::registry::{DataFlow, FlowStatus, InfraNode, NodeKind, Provider, Sensitivity};
    use std::collections::BTreeSet;

    #[test]
    fn test_sample_edges() {
        let registry = Registry::sample();
        let active: BTreeSet<String> = std::iter::once("flow-1".to_string()).collect();
        let derived = Aggregator::default().derive(&registry, &seed_state(registry.flows()), &active);
        let edges = edge_views(&registry, &derived);

        let total: usize = registry.nodes().iter().map(|n| n.connections.len()).sum();
        assert_eq!(edges.len(), total);

        let blocked = edges
            .iter()
            .find(|e| e.from == "azure-eu-sync" && e.to == "gcp-us-gw")
            .unwrap();
        assert_eq!(blocked.flow_id.as_deref(), Some("flow-5"));
        assert!(blocked.compliance_gap);
        assert_eq!(blocked.worst_severity, Some(AnomalySeverity::Critical));

        let entry = edges
            .iter()
            .find(|e| e.from == "aws-eu-gw" && e.to == "aws-eu-lb")
            .unwrap();
        assert!(entry.active);
        assert_eq!(entry.worst_severity, None);
    }

    #[test]
    fn test_reverse_direction_flow_matched() {
        // Flow runs a -> b, but only b declares the connection
        let a = InfraNode::new("a", NodeKind::Gateway, "A", Provider::Aws, "r");
        let b = InfraNode::new("b", NodeKind::Cache, "B", Provider::Aws, "r").connects(&["a"]);
        let flow = DataFlow::new("f", "a", "b", FlowStatus::Slow, Sensitivity::Public, 1.0, 1.0);
        let registry = Registry::new(vec![a, b], vec![flow], vec![]).unwrap();
        let derived = Aggregator::default().derive(&registry, &seed_state(registry.flows()), &BTreeSet::new());

        let edges = edge_views(&registry, &derived);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, "b");
        assert_eq!(edges[0].flow_id.as_deref(), Some("f"));
        assert!(edges[0].target_known);
    }

    #[test]
    fn test_unknown_target_kept() {
        let node = InfraNode::new("a", NodeKind::Cdn, "A", Provider::OnPrem, "dc").connects(&["ghost"]);
        let registry = Registry::new(vec![node], vec![], vec![]).unwrap();
        let derived = Aggregator::default().derive(&registry, &seed_state(&[]), &BTreeSet::new());

        let edges = edge_views(&registry, &derived);
        assert_eq!(edges.len(), 1);
        assert!(!edges[0].target_known);
        assert_eq!(edges[0].flow_id, None);
        assert!(!edges[0].active);
    }
}
