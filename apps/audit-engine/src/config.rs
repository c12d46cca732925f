use anyhow::{bail, Context, Result};

use crate::fairness::{FairnessThresholds, ProtectedAttributeRegistry};
use crate::mitigation::in_processing::DEFAULT_ETA;

pub const DEFAULT_MITIGATION_WORKERS: usize = 2;

/// Engine configuration loaded from environment variables.
/// Every variable is optional; unset ones take the documented defaults.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub thresholds: FairnessThresholds,
    pub protected_attributes: ProtectedAttributeRegistry,
    pub in_processing_eta: f64,
    /// Upper bound on concurrently fitting mitigations.
    pub mitigation_workers: usize,
    pub rust_log: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            thresholds: FairnessThresholds::default(),
            protected_attributes: ProtectedAttributeRegistry::default(),
            in_processing_eta: DEFAULT_ETA,
            mitigation_workers: DEFAULT_MITIGATION_WORKERS,
            rust_log: "info".to_string(),
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let thresholds = FairnessThresholds {
            demographic_parity: parse_or(
                &lookup,
                "DEMOGRAPHIC_PARITY_THRESHOLD",
                defaults.thresholds.demographic_parity,
            )?,
            equal_opportunity: parse_or(
                &lookup,
                "EQUAL_OPPORTUNITY_THRESHOLD",
                defaults.thresholds.equal_opportunity,
            )?,
            disparate_impact: parse_or(
                &lookup,
                "DISPARATE_IMPACT_THRESHOLD",
                defaults.thresholds.disparate_impact,
            )?,
        };
        thresholds
            .validate()
            .context("Fairness thresholds must lie within [0, 1]")?;

        let protected_attributes = match lookup("PROTECTED_ATTRIBUTES") {
            Some(raw) => {
                let registry: ProtectedAttributeRegistry = serde_json::from_str(&raw)
                    .context("PROTECTED_ATTRIBUTES must be a JSON object of attribute kinds")?;
                registry
                    .validate()
                    .context("PROTECTED_ATTRIBUTES has an invalid bucketing")?;
                registry
            }
            None => defaults.protected_attributes,
        };

        let in_processing_eta = parse_or(&lookup, "IN_PROCESSING_ETA", defaults.in_processing_eta)?;
        if !in_processing_eta.is_finite() || in_processing_eta < 0.0 {
            bail!("IN_PROCESSING_ETA must be a non-negative number, got {in_processing_eta}");
        }

        let mitigation_workers =
            parse_or(&lookup, "MITIGATION_WORKERS", defaults.mitigation_workers)?;
        if mitigation_workers == 0 {
            bail!("MITIGATION_WORKERS must be at least 1");
        }

        Ok(AuditConfig {
            thresholds,
            protected_attributes,
            in_processing_eta,
            mitigation_workers,
            rust_log: lookup("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::fairness::AttributeKind;

    fn make_config(vars: &[(&str, &str)]) -> Result<AuditConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuditConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = make_config(&[]).unwrap();
        assert_eq!(config.thresholds, FairnessThresholds::default());
        assert_eq!(config.in_processing_eta, 1.0);
        assert_eq!(config.mitigation_workers, 2);
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.protected_attributes, ProtectedAttributeRegistry::default());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = make_config(&[
            ("DEMOGRAPHIC_PARITY_THRESHOLD", "0.9"),
            ("DISPARATE_IMPACT_THRESHOLD", " 0.75 "),
            ("IN_PROCESSING_ETA", "25"),
            ("MITIGATION_WORKERS", "4"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();
        assert_eq!(config.thresholds.demographic_parity, 0.9);
        assert_eq!(config.thresholds.equal_opportunity, 0.8);
        assert_eq!(config.thresholds.disparate_impact, 0.75);
        assert_eq!(config.in_processing_eta, 25.0);
        assert_eq!(config.mitigation_workers, 4);
        assert_eq!(config.rust_log, "debug");
    }

    #[test]
    fn test_protected_attributes_from_json() {
        let config = make_config(&[(
            "PROTECTED_ATTRIBUTES",
            r#"{
                "gender": {"type": "categorical", "values": ["male", "female"]},
                "age": {"type": "numerical", "min": 20, "cut_points": [30, 50]}
            }"#,
        )])
        .unwrap();
        let registry = &config.protected_attributes;
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["age", "gender"]);
        assert_eq!(
            registry.kind("age").unwrap(),
            &AttributeKind::Numerical {
                min: 20.0,
                cut_points: vec![30.0, 50.0]
            }
        );
    }

    #[test]
    fn test_invalid_values_fail_with_context() {
        let err = make_config(&[("DEMOGRAPHIC_PARITY_THRESHOLD", "high")]).unwrap_err();
        assert!(format!("{err:#}").contains("DEMOGRAPHIC_PARITY_THRESHOLD"));

        assert!(make_config(&[("EQUAL_OPPORTUNITY_THRESHOLD", "1.5")]).is_err());
        assert!(make_config(&[("MITIGATION_WORKERS", "0")]).is_err());
        assert!(make_config(&[("IN_PROCESSING_ETA", "-2")]).is_err());
        assert!(make_config(&[(
            "PROTECTED_ATTRIBUTES",
            r#"{"age": {"type": "numerical", "min": 18, "cut_points": [40, 30]}}"#
        )])
        .is_err());
    }
}
