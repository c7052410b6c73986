//! Sample Registry
//! ===============
//!
//! Immutable descriptors of the simulated multi-cloud estate:
//! - **InfraNode**: an infrastructure element with provider, region and compliance tags
//! - **DataFlow**: a directed edge between two node identifiers
//! - **AuditEvent**: a recorded security/compliance event (see [`crate::audit`])
//!
//! The registry is built once (from [`Registry::sample`] or JSON) and only
//! read afterwards. References between records are non-owning strings and
//! may dangle; every lookup returns `Option` so callers degrade instead of
//! failing.

use crate::audit::{self, AuditEvent};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

// =============================================================================
// NODE DESCRIPTORS
// =============================================================================

/// Kind of infrastructure element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Region,
    Az,
    Firewall,
    Waf,
    Gateway,
    LoadBalancer,
    Cdn,
    Cache,
    Queue,
    Database,
    Storage,
    Kms,
    Mesh,
    Iam,
    Ai,
    DataLake,
    Serverless,
}

/// Hosting provider of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
    OnPrem,
}

/// Health classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Healthy,
    Warning,
    Critical,
    Degraded,
}

/// 2D layout coordinates used by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Optional resource utilisation figures.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceMetrics {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub requests: Option<f64>,
    pub errors: Option<f64>,
}

/// Static descriptor of an infrastructure element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraNode {
    /// Unique identifier
    pub id: String,

    /// Node kind
    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Display label
    pub label: String,

    pub provider: Provider,

    pub region: String,

    /// Availability zone, when the node is zonal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub az: Option<String>,

    /// Stored as flat `x`/`y` keys on the node record
    #[serde(flatten)]
    pub position: Position,

    pub status: NodeStatus,

    /// Base latency in milliseconds
    #[serde(default, alias = "latency", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,

    /// Compliance tags (unordered, may be empty)
    #[serde(default)]
    pub compliance: BTreeSet<String>,

    /// Outgoing connections, by node id. Entries may reference unknown nodes.
    #[serde(default)]
    pub connections: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResourceMetrics>,
}

impl InfraNode {
    /// Creates a healthy node with no tags or connections.
    pub fn new(
        id: &str,
        kind: NodeKind,
        label: &str,
        provider: Provider,
        region: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            label: label.to_string(),
            provider,
            region: region.to_string(),
            az: None,
            position: Position::default(),
            status: NodeStatus::Healthy,
            latency_ms: None,
            compliance: BTreeSet::new(),
            connections: Vec::new(),
            metrics: None,
        }
    }

    /// Sets the layout position.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    /// Sets the availability zone.
    pub fn zone(mut self, az: &str) -> Self {
        self.az = Some(az.to_string());
        self
    }

    /// Sets the health status.
    pub fn status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the base latency.
    pub fn latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Adds compliance tags.
    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.compliance.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    /// Appends outgoing connections.
    pub fn connects(mut self, targets: &[&str]) -> Self {
        self.connections.extend(targets.iter().map(|t| t.to_string()));
        self
    }

    /// Returns true if the node carries the given compliance tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.compliance.contains(tag)
    }
}

// =============================================================================
// FLOW DESCRIPTORS
// =============================================================================

/// Transport status of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Active,
    Encrypted,
    Blocked,
    Slow,
}

/// Data classification carried by a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Pii,
    Public,
    Confidential,
    Logs,
}

impl Sensitivity {
    /// PII and confidential data are sensitive.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Sensitivity::Pii | Sensitivity::Confidential)
    }
}

/// Static descriptor of a directed flow between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlow {
    pub id: String,
    pub from: String,
    pub to: String,
    pub status: FlowStatus,
    #[serde(alias = "dataType", alias = "data_type")]
    pub sensitivity: Sensitivity,
    /// Base latency in milliseconds
    #[serde(alias = "latency")]
    pub latency_ms: f64,
    /// Base throughput
    pub throughput: f64,
}

impl DataFlow {
    pub fn new(
        id: &str,
        from: &str,
        to: &str,
        status: FlowStatus,
        sensitivity: Sensitivity,
        latency_ms: f64,
        throughput: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            status,
            sensitivity,
            latency_ms,
            throughput,
        }
    }

    /// Returns true if the flow runs between `a` and `b` in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// A reference from one record to a node id that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    /// Node or flow holding the reference
    pub holder: String,
    /// Unresolved node id
    pub target: String,
}

/// Immutable collection of nodes, flows and audit events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    nodes: Vec<InfraNode>,
    #[serde(default)]
    flows: Vec<DataFlow>,
    #[serde(default)]
    events: Vec<AuditEvent>,
}

impl Registry {
    /// Builds a registry, rejecting duplicate identifiers.
    pub fn new(
        nodes: Vec<InfraNode>,
        flows: Vec<DataFlow>,
        events: Vec<AuditEvent>,
    ) -> Result<Self, CoreError> {
        check_unique(nodes.iter().map(|n| n.id.as_str()))?;
        check_unique(flows.iter().map(|f| f.id.as_str()))?;
        check_unique(events.iter().map(|e| e.id.as_str()))?;
        Ok(Self { nodes, flows, events })
    }

    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a registry from JSON.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let raw: Registry = serde_json::from_str(json)?;
        Self::new(raw.nodes, raw.flows, raw.events)
    }

    pub fn nodes(&self) -> &[InfraNode] {
        &self.nodes
    }

    pub fn flows(&self) -> &[DataFlow] {
        &self.flows
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Looks up a node by id.
    pub fn node(&self, id: &str) -> Option<&InfraNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Looks up a flow by id.
    pub fn flow(&self, id: &str) -> Option<&DataFlow> {
        self.flows.iter().find(|f| f.id == id)
    }

    /// First flow running between two nodes, in either direction.
    pub fn flow_between(&self, a: &str, b: &str) -> Option<&DataFlow> {
        self.flows.iter().find(|f| f.connects(a, b))
    }

    /// Flows entering or leaving a node.
    pub fn flows_touching<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a DataFlow> + 'a {
        self.flows
            .iter()
            .filter(move |f| f.from == node_id || f.to == node_id)
    }

    /// Lists every node/flow reference that does not resolve.
    pub fn dangling_references(&self) -> Vec<DanglingRef> {
        let known: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut dangling = Vec::new();

        for node in &self.nodes {
            for target in &node.connections {
                if !known.contains(target.as_str()) {
                    dangling.push(DanglingRef {
                        holder: node.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        for flow in &self.flows {
            for end in [&flow.from, &flow.to] {
                if !known.contains(end.as_str()) {
                    dangling.push(DanglingRef {
                        holder: flow.id.clone(),
                        target: end.clone(),
                    });
                }
            }
        }
        dangling
    }

    /// The reference multi-cloud estate: AWS and Azure in the EU, GCP in the US.
    pub fn sample() -> Self {
        Self {
            nodes: sample_nodes(),
            flows: sample_flows(),
            events: audit::sample_events(),
        }
    }
}

fn check_unique<'a>(ids: impl Iterator<Item = &'a str>) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CoreError::DuplicateId(id.to_string()));
        }
    }
    Ok(())
}

// =============================================================================
// SAMPLE DATA
// =============================================================================

fn sample_nodes() -> Vec<InfraNode> {
    use NodeKind::*;
    use NodeStatus::{Critical, Degraded, Warning};
    use Provider::{Aws, Azure, Gcp};

    const EU_WEST: &str = "eu-west-1";
    const WEST_EUROPE: &str = "westeurope";
    const US_CENTRAL: &str = "us-central1";

    vec![
        // AWS EU
        InfraNode::new("aws-eu-region", Region, "EU-West-1", Aws, EU_WEST)
            .at(50.0, 80.0).tags(&["GDPR", "SOC2"]).connects(&["aws-eu-az1", "aws-eu-az2"]),
        InfraNode::new("aws-eu-az1", Az, "AZ-1a", Aws, EU_WEST)
            .zone("eu-west-1a").at(120.0, 50.0).latency(2.0).tags(&["GDPR"])
            .connects(&["aws-eu-fw", "aws-eu-lb"]),
        InfraNode::new("aws-eu-az2", Az, "AZ-1b", Aws, EU_WEST)
            .zone("eu-west-1b").at(120.0, 110.0).latency(3.0).tags(&["GDPR"])
            .connects(&["aws-eu-db-replica"]),
        InfraNode::new("aws-eu-fw", Firewall, "WAF/Shield", Aws, EU_WEST)
            .at(190.0, 50.0).tags(&["GDPR", "PCI-DSS"]).connects(&["aws-eu-gw"]),
        InfraNode::new("aws-eu-gw", Gateway, "API Gateway", Aws, EU_WEST)
            .at(260.0, 50.0).latency(5.0).tags(&["GDPR"]).connects(&["aws-eu-lb"]),
        InfraNode::new("aws-eu-lb", LoadBalancer, "ALB", Aws, EU_WEST)
            .at(330.0, 80.0).latency(1.0).tags(&["GDPR"])
            .connects(&["aws-eu-cache", "aws-eu-svc"]),
        InfraNode::new("aws-eu-cache", Cache, "ElastiCache", Aws, EU_WEST)
            .at(400.0, 40.0).latency(0.5).tags(&["GDPR"]).connects(&["aws-eu-db"]),
        InfraNode::new("aws-eu-svc", Mesh, "App Mesh", Aws, EU_WEST)
            .at(400.0, 100.0).tags(&["GDPR"]).connects(&["aws-eu-queue", "aws-eu-ai"]),
        InfraNode::new("aws-eu-queue", Queue, "SQS/SNS", Aws, EU_WEST)
            .at(470.0, 60.0).tags(&["GDPR"]).connects(&["aws-eu-lambda"]),
        InfraNode::new("aws-eu-lambda", Serverless, "Lambda", Aws, EU_WEST)
            .at(540.0, 60.0).tags(&["GDPR"]).connects(&["aws-eu-db"]),
        InfraNode::new("aws-eu-ai", Ai, "SageMaker", Aws, EU_WEST)
            .at(470.0, 120.0).status(Warning).tags(&["AI-Act", "GDPR"])
            .connects(&["aws-eu-datalake"]),
        InfraNode::new("aws-eu-db", Database, "Aurora", Aws, EU_WEST)
            .at(540.0, 100.0).latency(3.0).tags(&["GDPR", "SOC2"])
            .connects(&["aws-eu-kms", "aws-eu-db-replica"]),
        InfraNode::new("aws-eu-db-replica", Database, "Aurora Read", Aws, EU_WEST)
            .at(610.0, 130.0).latency(1.0).tags(&["GDPR"]),
        InfraNode::new("aws-eu-kms", Kms, "KMS", Aws, EU_WEST)
            .at(610.0, 70.0).tags(&["GDPR", "FIPS"]),
        InfraNode::new("aws-eu-datalake", DataLake, "S3 Data Lake", Aws, EU_WEST)
            .at(540.0, 160.0).tags(&["GDPR"]).connects(&["azure-eu-sync"]),
        InfraNode::new("aws-eu-iam", Iam, "IAM/SSO", Aws, EU_WEST)
            .at(50.0, 160.0).tags(&["GDPR", "SOC2"]).connects(&["aws-eu-region"]),
        // Azure EU
        InfraNode::new("azure-eu-region", Region, "West Europe", Azure, WEST_EUROPE)
            .at(50.0, 280.0).tags(&["GDPR", "ISO27001"]).connects(&["azure-eu-az1"]),
        InfraNode::new("azure-eu-az1", Az, "Zone-1", Azure, WEST_EUROPE)
            .at(120.0, 280.0).latency(2.0).tags(&["GDPR"]).connects(&["azure-eu-fw"]),
        InfraNode::new("azure-eu-fw", Firewall, "Azure FW", Azure, WEST_EUROPE)
            .at(190.0, 280.0).tags(&["GDPR"]).connects(&["azure-eu-gw"]),
        InfraNode::new("azure-eu-gw", Gateway, "App Gateway", Azure, WEST_EUROPE)
            .at(260.0, 280.0).status(Degraded).latency(12.0).tags(&["GDPR"])
            .connects(&["azure-eu-aks"]),
        InfraNode::new("azure-eu-aks", Mesh, "AKS + Istio", Azure, WEST_EUROPE)
            .at(330.0, 280.0).tags(&["GDPR"]).connects(&["azure-eu-cosmos", "azure-eu-ai"]),
        InfraNode::new("azure-eu-cosmos", Database, "Cosmos DB", Azure, WEST_EUROPE)
            .at(400.0, 250.0).latency(4.0).tags(&["GDPR"]).connects(&["azure-eu-kv"]),
        InfraNode::new("azure-eu-ai", Ai, "Azure AI", Azure, WEST_EUROPE)
            .at(400.0, 310.0).tags(&["AI-Act", "GDPR"]).connects(&["azure-eu-storage"]),
        InfraNode::new("azure-eu-kv", Kms, "Key Vault", Azure, WEST_EUROPE)
            .at(470.0, 250.0).tags(&["GDPR", "FIPS"]),
        InfraNode::new("azure-eu-storage", Storage, "Blob Storage", Azure, WEST_EUROPE)
            .at(470.0, 310.0).tags(&["GDPR"]),
        InfraNode::new("azure-eu-sync", Cdn, "Cross-Cloud Sync", Azure, WEST_EUROPE)
            .at(540.0, 220.0).latency(25.0).tags(&["GDPR"]).connects(&["gcp-us-gw"]),
        // GCP US, reachable from the EU only under restrictions
        InfraNode::new("gcp-us-region", Region, "US-Central1", Gcp, US_CENTRAL)
            .at(50.0, 400.0).status(Warning).tags(&["SOC2", "HIPAA"])
            .connects(&["gcp-us-az1"]),
        InfraNode::new("gcp-us-az1", Az, "Zone-A", Gcp, US_CENTRAL)
            .at(120.0, 400.0).status(Warning).latency(85.0).connects(&["gcp-us-fw"]),
        InfraNode::new("gcp-us-fw", Waf, "Cloud Armor", Gcp, US_CENTRAL)
            .at(190.0, 400.0).connects(&["gcp-us-gw"]),
        InfraNode::new("gcp-us-gw", Gateway, "Cloud Run", Gcp, US_CENTRAL)
            .at(260.0, 400.0).status(Critical).latency(150.0).connects(&["gcp-us-bq"]),
        InfraNode::new("gcp-us-bq", DataLake, "BigQuery", Gcp, US_CENTRAL)
            .at(330.0, 400.0).tags(&["SOC2"]).connects(&["gcp-us-ai"]),
        InfraNode::new("gcp-us-ai", Ai, "Vertex AI", Gcp, US_CENTRAL)
            .at(400.0, 400.0).tags(&["AI-Act"]),
    ]
}

fn sample_flows() -> Vec<DataFlow> {
    use FlowStatus::*;
    use Sensitivity::*;

    vec![
        DataFlow::new("flow-1", "aws-eu-gw", "aws-eu-lb", Encrypted, Pii, 2.0, 1500.0),
        DataFlow::new("flow-2", "aws-eu-lb", "aws-eu-cache", Active, Public, 0.5, 5000.0),
        DataFlow::new("flow-3", "aws-eu-svc", "aws-eu-db", Encrypted, Confidential, 3.0, 800.0),
        DataFlow::new("flow-4", "aws-eu-datalake", "azure-eu-sync", Encrypted, Pii, 45.0, 200.0),
        DataFlow::new("flow-5", "azure-eu-sync", "gcp-us-gw", Blocked, Pii, 0.0, 0.0),
        DataFlow::new("flow-6", "aws-eu-ai", "aws-eu-datalake", Active, Logs, 5.0, 300.0),
        DataFlow::new("flow-7", "azure-eu-aks", "azure-eu-cosmos", Active, Confidential, 4.0, 1200.0),
    ]
}
