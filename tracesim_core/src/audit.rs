//! Audit log records.
//!
//! Static, chronologically ordered security and compliance events shipped
//! with the registry, plus the severity filter and counters the timeline
//! view needs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Category of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IamAccess,
    DataTransfer,
    Replication,
    CacheRead,
    CacheInvalidation,
    Failover,
    AiEvent,
    SecureDelete,
    EncryptionRotation,
    PolicyChange,
    BreachAttempt,
    SovereigntyCheck,
}

impl EventKind {
    /// Short category label.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::IamAccess => "IAM/Access",
            EventKind::DataTransfer => "Transfer",
            EventKind::Replication => "Replication",
            EventKind::CacheRead | EventKind::CacheInvalidation => "Cache",
            EventKind::Failover => "Resilience",
            EventKind::AiEvent => "AI",
            EventKind::SecureDelete => "GDPR Erasure",
            EventKind::EncryptionRotation => "Crypto",
            EventKind::PolicyChange => "Policy",
            EventKind::BreachAttempt => "Security",
            EventKind::SovereigntyCheck => "Sovereignty",
        }
    }
}

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Info,
    Success,
    Warning,
    Critical,
}

/// A recorded audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    /// Minutes elapsed since the event, relative to session start
    pub minutes_ago: u32,
    pub kind: EventKind,
    pub severity: EventSeverity,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_region: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub compliance: BTreeSet<String>,
}

impl AuditEvent {
    fn new(
        id: &str,
        minutes_ago: u32,
        kind: EventKind,
        severity: EventSeverity,
        title: &str,
        description: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            minutes_ago,
            kind,
            severity,
            title: title.to_string(),
            description: description.to_string(),
            actor: None,
            resource: None,
            source_region: None,
            target_region: None,
            metadata: BTreeMap::new(),
            compliance: BTreeSet::new(),
        }
    }

    fn by(mut self, actor: &str, resource: &str) -> Self {
        self.actor = Some(actor.to_string());
        self.resource = Some(resource.to_string());
        self
    }

    fn route(mut self, source: Option<&str>, target: Option<&str>) -> Self {
        self.source_region = source.map(str::to_string);
        self.target_region = target.map(str::to_string);
        self
    }

    fn meta(mut self, pairs: &[(&str, &str)]) -> Self {
        self.metadata
            .extend(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    fn tags(mut self, tags: &[&str]) -> Self {
        self.compliance.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    /// Human-readable relative age ("just now", "12m ago", "1h ago", "2d ago").
    pub fn relative_age(&self) -> String {
        format_age(self.minutes_ago)
    }
}

/// Formats an age in minutes the way the timeline displays it.
pub fn format_age(minutes: u32) -> String {
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}

/// Timeline severity filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityFilter {
    All,
    Only(EventSeverity),
}

impl SeverityFilter {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        match self {
            SeverityFilter::All => true,
            SeverityFilter::Only(severity) => event.severity == *severity,
        }
    }
}

/// Read-only view over a slice of audit events.
#[derive(Debug, Clone, Copy)]
pub struct AuditLog<'a> {
    events: &'a [AuditEvent],
}

impl<'a> AuditLog<'a> {
    pub fn new(events: &'a [AuditEvent]) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events matching the filter, in log order.
    pub fn filter(&self, filter: SeverityFilter) -> Vec<&'a AuditEvent> {
        self.events.iter().filter(|e| filter.matches(e)).collect()
    }

    /// Number of events per severity. Every severity is present, possibly zero.
    pub fn severity_counts(&self) -> BTreeMap<EventSeverity, usize> {
        let mut counts: BTreeMap<EventSeverity, usize> = [
            EventSeverity::Info,
            EventSeverity::Success,
            EventSeverity::Warning,
            EventSeverity::Critical,
        ]
        .into_iter()
        .map(|s| (s, 0))
        .collect();
        for event in self.events {
            *counts.entry(event.severity).or_default() += 1;
        }
        counts
    }
}

pub(crate) fn sample_events() -> Vec<AuditEvent> {
    use EventKind::*;
    use EventSeverity::*;

    vec![
        AuditEvent::new("evt-001", 2, IamAccess, Info, "IAM authentication",
            "User authenticated via federated SSO")
            .by("admin@company.eu", "AWS Console")
            .route(Some("EU-West-1"), None)
            .meta(&[("mfa_used", "true"), ("session_duration", "3600")])
            .tags(&["GDPR", "SOC2"]),
        AuditEvent::new("evt-002", 5, DataTransfer, Success, "Cross-region data transfer",
            "Encrypted PII replicated to the disaster recovery site")
            .by("system", "customer_data_backup")
            .route(Some("EU-West-1"), Some("EU-Central-1"))
            .meta(&[("size", "2.4GB"), ("encrypted", "AES-256"), ("records", "150000")])
            .tags(&["GDPR"]),
        AuditEvent::new("evt-003", 8, BreachAttempt, Critical, "Unauthorized access blocked",
            "SQL injection attempt blocked by WAF")
            .by("unknown", "/api/users")
            .route(Some("External"), None)
            .meta(&[("attack_type", "SQLi"), ("blocked", "true"), ("source_ip", "203.0.113.xxx")])
            .tags(&["PCI-DSS"]),
        AuditEvent::new("evt-004", 12, AiEvent, Info, "ML model inference",
            "Fraud detection model processed a batch")
            .by("ml-pipeline", "fraud_detection_v2.3")
            .route(Some("EU-West-1"), None)
            .meta(&[("predictions", "5420"), ("avg_latency", "23ms"), ("accuracy", "99.2%")])
            .tags(&["AI-Act", "GDPR"]),
        AuditEvent::new("evt-005", 18, CacheInvalidation, Warning, "Cache invalidation triggered",
            "Distributed cache flushed after schema update")
            .by("deployment-service", "ElastiCache Cluster")
            .route(Some("EU-West-1"), None)
            .meta(&[("keys_invalidated", "28500"), ("reason", "schema_migration")]),
        AuditEvent::new("evt-006", 25, SovereigntyCheck, Success, "Data residency check",
            "Automated check confirmed EU data stays in the EU")
            .by("compliance-bot", "All EU Customer Data")
            .meta(&[("regions_checked", "4"), ("violations", "0")])
            .tags(&["GDPR", "Schrems II"]),
        AuditEvent::new("evt-007", 35, EncryptionRotation, Success, "KMS key rotation",
            "Master encryption key rotated")
            .by("kms-service", "prod-master-key")
            .route(Some("EU-West-1"), None)
            .meta(&[("algorithm", "AES-256-GCM"), ("key_id", "mrk-xxxx"), ("policy", "annual")])
            .tags(&["FIPS-140-2", "SOC2"]),
        AuditEvent::new("evt-008", 45, Failover, Warning, "Database failover started",
            "Primary database failed over to standby after a latency spike")
            .by("rds-ha", "aurora-prod-cluster")
            .route(Some("EU-West-1"), Some("EU-West-1b"))
            .meta(&[("downtime", "12s"), ("reason", "latency_threshold"), ("automated", "true")]),
        AuditEvent::new("evt-009", 60, SecureDelete, Success, "GDPR erasure",
            "User data permanently deleted on a right-to-be-forgotten request")
            .by("gdpr-processor", "user_profile_12847")
            .meta(&[("tables_affected", "8"), ("backups_cleared", "true"), ("audit_trail", "preserved")])
            .tags(&["GDPR Art. 17"]),
        AuditEvent::new("evt-010", 90, Replication, Info, "Multi-cloud sync complete",
            "Data lake synchronized between AWS and Azure")
            .by("sync-service", "analytics_dataset")
            .route(Some("AWS EU-West-1"), Some("Azure West Europe"))
            .meta(&[("delta_records", "45000"), ("latency", "850ms"), ("conflicts", "0")])
            .tags(&["GDPR"]),
    ]
}
