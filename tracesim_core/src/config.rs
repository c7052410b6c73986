//! Engine configuration.
//!
//! Tick periods, jitter bounds and derivation thresholds. Every field has a
//! default matching the reference dashboard, so a JSON override only needs
//! the keys it changes.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the simulation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Perturbation tick period in milliseconds (default: 1700)
    pub metrics_period_ms: u64,

    /// Active-flow-set tick period in milliseconds (default: 1500)
    pub active_period_ms: u64,

    /// Half-width of the uniform latency jitter, in ms (default: 3.0)
    pub latency_jitter_ms: f64,

    /// Half-width of the uniform throughput jitter (default: 60.0)
    pub throughput_jitter: f64,

    /// Probability that a non-blocked flow is active on a flicker tick (default: 0.7)
    pub active_probability: f64,

    /// Latency above which a flow lands in the issue list (default: 60.0)
    pub issue_latency_ms: f64,

    /// Latency above which a flow raises a warning anomaly (default: 80.0)
    pub anomaly_latency_ms: f64,

    /// Compliance tag the target of a sensitive flow must carry (default: "GDPR")
    pub required_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metrics_period_ms: 1700,
            active_period_ms: 1500,
            latency_jitter_ms: 3.0,
            throughput_jitter: 60.0,
            active_probability: 0.7,
            issue_latency_ms: 60.0,
            anomaly_latency_ms: 80.0,
            required_tag: "GDPR".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON override and validates it.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Perturbation tick period.
    pub fn metrics_period(&self) -> Duration {
        Duration::from_millis(self.metrics_period_ms)
    }

    /// Active-flow-set tick period.
    pub fn active_period(&self) -> Duration {
        Duration::from_millis(self.active_period_ms)
    }

    /// Checks every field against its valid domain.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.metrics_period_ms == 0 {
            return Err(CoreError::invalid("metrics_period_ms must be positive"));
        }
        if self.active_period_ms == 0 {
            return Err(CoreError::invalid("active_period_ms must be positive"));
        }
        for (name, value) in [
            ("latency_jitter_ms", self.latency_jitter_ms),
            ("throughput_jitter", self.throughput_jitter),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::invalid(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.active_probability) {
            return Err(CoreError::invalid(format!(
                "active_probability must lie in [0, 1], got {}",
                self.active_probability
            )));
        }
        for (name, value) in [
            ("issue_latency_ms", self.issue_latency_ms),
            ("anomaly_latency_ms", self.anomaly_latency_ms),
        ] {
            if !value.is_finite() {
                return Err(CoreError::invalid(format!("{name} must be finite")));
            }
        }
        if self.required_tag.trim().is_empty() {
            return Err(CoreError::invalid("required_tag must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.metrics_period(), Duration::from_millis(1700));
        assert_eq!(config.active_period(), Duration::from_millis(1500));
        assert_eq!(config.required_tag, "GDPR");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{ "metrics_period_ms": 250 }"#).unwrap();
        assert_eq!(config.metrics_period_ms, 250);
        assert_eq!(config.active_period_ms, 1500);
        assert_eq!(config.latency_jitter_ms, 3.0);
    }

    #[test]
    fn test_rejects_out_of_domain_values() {
        let bad = [
            r#"{ "metrics_period_ms": 0 }"#,
            r#"{ "active_period_ms": 0 }"#,
            r#"{ "latency_jitter_ms": -1.0 }"#,
            r#"{ "active_probability": 1.5 }"#,
            r#"{ "required_tag": "  " }"#,
        ];
        for json in bad {
            let err = EngineConfig::from_json(json).unwrap_err();
            assert!(matches!(err, CoreError::InvalidConfig(_)), "{json}");
        }
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }
}
