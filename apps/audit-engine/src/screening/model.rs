//! Trained model value object.
//!
//! A `TrainedModel` is an immutable logistic model over standardized numeric
//! features. It is passed explicitly to whoever needs predictions; there is
//! no process-wide classifier.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::errors::AuditError;
use crate::models::{Decision, FeatureRecord, Outcome};

/// Probability at or above which a resume is shortlisted.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// The classifier seam. Implement this to plug in another model family
/// without touching the screening pipeline or the audit engine.
pub trait Classifier: Send + Sync {
    fn predict(&self, record: &FeatureRecord) -> Result<Decision, AuditError>;
}

/// Column order and standardization learned from a training batch.
/// Missing values impute to the column mean (zero after standardization).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl FeatureSchema {
    /// Every feature with a numeric view in at least one record, sorted by name.
    pub fn fit(records: &[FeatureRecord]) -> Self {
        let names: Vec<String> = records
            .iter()
            .flat_map(|r| {
                r.features
                    .iter()
                    .filter(|(_, v)| v.as_number().is_some())
                    .map(|(k, _)| k.clone())
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut means = Vec::with_capacity(names.len());
        let mut scales = Vec::with_capacity(names.len());
        for name in &names {
            let values: Vec<f64> = records
                .iter()
                .filter_map(|r| r.features.get(name).and_then(|v| v.as_number()))
                .collect();
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            means.push(mean);
            scales.push(if std > f64::EPSILON { std } else { 1.0 });
        }

        Self {
            names,
            means,
            scales,
        }
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn vectorize(&self, record: &FeatureRecord) -> Vec<f64> {
        self.names
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(name, (mean, scale))| {
                record
                    .features
                    .get(name)
                    .and_then(|v| v.as_number())
                    .map_or(0.0, |v| (v - mean) / scale)
            })
            .collect()
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    schema: FeatureSchema,
    weights: Vec<f64>,
    bias: f64,
}

impl TrainedModel {
    pub fn new(schema: FeatureSchema, weights: Vec<f64>, bias: f64) -> Result<Self, AuditError> {
        if weights.len() != schema.width() {
            return Err(AuditError::InvalidInput(format!(
                "model has {} weights for {} features",
                weights.len(),
                schema.width()
            )));
        }
        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(AuditError::InvalidInput(
                "model parameters must be finite".to_string(),
            ));
        }
        Ok(Self {
            schema,
            weights,
            bias,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    /// Probability of the favorable outcome.
    pub fn probability(&self, record: &FeatureRecord) -> f64 {
        let x = self.schema.vectorize(record);
        sigmoid(self.logit(&x))
    }

    pub(crate) fn logit(&self, x: &[f64]) -> f64 {
        self.bias + self.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
    }
}

impl Classifier for TrainedModel {
    /// Importance of a feature is its signed contribution `w · x` to the logit.
    fn predict(&self, record: &FeatureRecord) -> Result<Decision, AuditError> {
        let x = self.schema.vectorize(record);
        let p = sigmoid(self.logit(&x));
        let outcome = if p >= DECISION_THRESHOLD {
            Outcome::Favorable
        } else {
            Outcome::Unfavorable
        };
        let confidence = p.max(1.0 - p);
        let importance: HashMap<String, f64> = self
            .schema
            .names
            .iter()
            .zip(self.weights.iter().zip(&x))
            .map(|(name, (w, v))| (name.clone(), w * v))
            .collect();
        Decision::new(record.id.clone(), outcome, confidence, importance)
    }
}
