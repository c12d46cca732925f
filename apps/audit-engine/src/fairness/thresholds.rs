//! Threshold Evaluator.
//!
//! Thresholds are minimum acceptable fairness levels, not deviation caps: a
//! metric violates when its deviation from ideal exceeds `1 − τ`. With the
//! default τ = 0.8 a parity gap above 0.2, or a disparate impact outside
//! (0.8, 1.2), is flagged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AuditError;
use crate::fairness::metrics::{EqualOpportunityMode, FairnessMetricSet};

pub const DEFAULT_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairnessThresholds {
    pub demographic_parity: f64,
    pub equal_opportunity: f64,
    pub disparate_impact: f64,
}

impl Default for FairnessThresholds {
    fn default() -> Self {
        Self {
            demographic_parity: DEFAULT_THRESHOLD,
            equal_opportunity: DEFAULT_THRESHOLD,
            disparate_impact: DEFAULT_THRESHOLD,
        }
    }
}

impl FairnessThresholds {
    pub fn uniform(tau: f64) -> Self {
        Self {
            demographic_parity: tau,
            equal_opportunity: tau,
            disparate_impact: tau,
        }
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        for (metric, value) in [
            (MetricName::DemographicParity, self.demographic_parity),
            (MetricName::EqualOpportunity, self.equal_opportunity),
            (MetricName::DisparateImpact, self.disparate_impact),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AuditError::InvalidThreshold {
                    metric: metric.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    DemographicParity,
    EqualOpportunity,
    DisparateImpact,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::DemographicParity => "demographic_parity",
            MetricName::EqualOpportunity => "equal_opportunity",
            MetricName::DisparateImpact => "disparate_impact",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Violated,
    /// The metric has no value for this batch (null disparate impact).
    Undefined,
}

/// Outcome of checking one metric against its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCheck {
    pub metric: MetricName,
    pub value: Option<f64>,
    pub ideal: f64,
    pub deviation: Option<f64>,
    pub threshold: f64,
    /// Largest deviation tolerated: `1 − threshold`.
    pub tolerance: f64,
    pub verdict: Verdict,
}

/// Structured bias flag. `triggered` lists every metric that violated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasFlag {
    pub violated: bool,
    pub triggered: Vec<MetricName>,
    pub checks: Vec<MetricCheck>,
    pub equal_opportunity_mode: EqualOpportunityMode,
}

impl BiasFlag {
    pub fn check(&self, metric: MetricName) -> Option<&MetricCheck> {
        self.checks.iter().find(|c| c.metric == metric)
    }
}

/// Compares a metric set against thresholds. Pure; no I/O.
pub fn evaluate(
    metrics: &FairnessMetricSet,
    thresholds: &FairnessThresholds,
) -> Result<BiasFlag, AuditError> {
    thresholds.validate()?;

    let checks = vec![
        check_metric(
            MetricName::DemographicParity,
            Some(metrics.demographic_parity),
            0.0,
            thresholds.demographic_parity,
        ),
        check_metric(
            MetricName::EqualOpportunity,
            Some(metrics.equal_opportunity),
            0.0,
            thresholds.equal_opportunity,
        ),
        check_metric(
            MetricName::DisparateImpact,
            metrics.disparate_impact,
            1.0,
            thresholds.disparate_impact,
        ),
    ];

    let triggered: Vec<MetricName> = checks
        .iter()
        .filter(|c| c.verdict == Verdict::Violated)
        .map(|c| c.metric)
        .collect();

    Ok(BiasFlag {
        violated: !triggered.is_empty(),
        triggered,
        checks,
        equal_opportunity_mode: metrics.equal_opportunity_mode,
    })
}

fn check_metric(metric: MetricName, value: Option<f64>, ideal: f64, threshold: f64) -> MetricCheck {
    let tolerance = 1.0 - threshold;
    let deviation = value.map(|v| (v - ideal).abs());
    let verdict = match deviation {
        None => Verdict::Undefined,
        Some(d) if d > tolerance => Verdict::Violated,
        Some(_) => Verdict::Pass,
    };
    MetricCheck {
        metric,
        value,
        ideal,
        deviation,
        threshold,
        tolerance,
        verdict,
    }
}
