use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::AuditError;

/// Binary screening outcome. Serialized as the hiring-facing labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "shortlist")]
    Favorable,
    #[serde(rename = "reject")]
    Unfavorable,
}

impl Outcome {
    pub fn from_label(label: u8) -> Result<Self, AuditError> {
        match label {
            1 => Ok(Outcome::Favorable),
            0 => Ok(Outcome::Unfavorable),
            other => Err(AuditError::InvalidInput(format!(
                "Outcome label must be 0 or 1, got {other}"
            ))),
        }
    }

    pub fn label(self) -> u8 {
        match self {
            Outcome::Favorable => 1,
            Outcome::Unfavorable => 0,
        }
    }

    pub fn is_favorable(self) -> bool {
        self == Outcome::Favorable
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Favorable => "shortlist",
            Outcome::Unfavorable => "reject",
        }
    }
}

/// Wire shape of a decision; validated into `Decision` on deserialize.
#[derive(Deserialize)]
struct DecisionParts {
    record_id: String,
    outcome: Outcome,
    confidence: f64,
    #[serde(default)]
    feature_importance: HashMap<String, f64>,
}

impl TryFrom<DecisionParts> for Decision {
    type Error = AuditError;

    fn try_from(parts: DecisionParts) -> Result<Self, Self::Error> {
        Decision::new(
            parts.record_id,
            parts.outcome,
            parts.confidence,
            parts.feature_importance,
        )
    }
}

/// One classifier decision for one `FeatureRecord`. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DecisionParts")]
pub struct Decision {
    record_id: String,
    outcome: Outcome,
    confidence: f64,
    feature_importance: HashMap<String, f64>,
}

impl Decision {
    pub fn new(
        record_id: impl Into<String>,
        outcome: Outcome,
        confidence: f64,
        feature_importance: HashMap<String, f64>,
    ) -> Result<Self, AuditError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AuditError::InvalidInput(format!(
                "Decision confidence must be within [0, 1], got {confidence}"
            )));
        }
        Ok(Self {
            record_id: record_id.into(),
            outcome,
            confidence,
            feature_importance,
        })
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn feature_importance(&self) -> &HashMap<String, f64> {
        &self.feature_importance
    }

    /// Probability-like score for the favorable class.
    /// `confidence` is the probability of the predicted class, so a reject at
    /// confidence 0.7 scores 0.3 toward shortlisting.
    pub fn favorable_score(&self) -> f64 {
        match self.outcome {
            Outcome::Favorable => self.confidence,
            Outcome::Unfavorable => 1.0 - self.confidence,
        }
    }
}
