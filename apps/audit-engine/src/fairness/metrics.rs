use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which privileged/unprivileged split a metric set was computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDesignation {
    pub attribute: String,
    pub privileged: String,
    pub unprivileged: String,
}

impl GroupDesignation {
    pub fn new(
        attribute: impl Into<String>,
        privileged: impl Into<String>,
        unprivileged: impl Into<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            privileged: privileged.into(),
            unprivileged: unprivileged.into(),
        }
    }

    /// The same attribute with the two designations exchanged.
    pub fn swapped(&self) -> Self {
        Self {
            attribute: self.attribute.clone(),
            privileged: self.unprivileged.clone(),
            unprivileged: self.privileged.clone(),
        }
    }
}

/// How `equal_opportunity` was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqualOpportunityMode {
    /// True-positive-rate gap against ground-truth labels.
    TruePositiveRate,
    /// No ground truth supplied: selection-rate gap over all group members.
    /// This is demographic parity under another name and is labeled as such.
    SelectionRateProxy,
}

/// Per-group tallies behind a metric set. Counts are weighted when the
/// calculation was weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub value: String,
    pub size: usize,
    pub total_weight: f64,
    pub favorable: f64,
    pub selection_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth_favorable: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_positive_rate: Option<f64>,
}

/// Group-fairness statistics for one batch. Never mutated after creation;
/// a corrected batch yields a new set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessMetricSet {
    pub id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub groups: GroupDesignation,
    /// SR(unprivileged) − SR(privileged), within [-1, 1].
    pub demographic_parity: f64,
    pub equal_opportunity: f64,
    pub equal_opportunity_mode: EqualOpportunityMode,
    /// SR(unprivileged) / SR(privileged). `None` when SR(privileged) is zero.
    pub disparate_impact: Option<f64>,
    pub privileged_group: GroupStats,
    pub unprivileged_group: GroupStats,
    pub batch_size: usize,
    pub excluded_count: usize,
    pub weighted: bool,
}
