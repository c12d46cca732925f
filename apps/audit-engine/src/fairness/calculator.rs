//! Fairness Metric Calculator: group statistics over one batch of decisions.
//!
//! `measure` is the pure core: partition by the designated attribute, tally
//! (optionally weighted) favorable outcomes, derive parity, opportunity and
//! impact. `FairnessCalculator::compute*` wraps it and appends one
//! `metric_computed` event per set.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditLog, AuditPayload};
use crate::errors::AuditError;
use crate::fairness::attributes::ProtectedAttributeRegistry;
use crate::fairness::metrics::{
    EqualOpportunityMode, FairnessMetricSet, GroupDesignation, GroupStats,
};
use crate::models::{Decision, FeatureRecord, Outcome};

// ────────────────────────────────────────────────────────────────────────────
// Inputs
// ────────────────────────────────────────────────────────────────────────────

/// Outcomes to measure, aligned by position with `records`.
pub struct OutcomeBatch<'a> {
    pub records: &'a [FeatureRecord],
    pub outcomes: &'a [Outcome],
    pub ground_truth: Option<&'a [Outcome]>,
    pub weights: Option<&'a [f64]>,
}

#[derive(Default)]
struct GroupTally {
    size: usize,
    total_weight: f64,
    favorable: f64,
    ground_truth_favorable: f64,
    true_positive: f64,
}

impl GroupTally {
    fn add(&mut self, weight: f64, predicted: Outcome, actual: Option<Outcome>) {
        self.size += 1;
        self.total_weight += weight;
        if predicted.is_favorable() {
            self.favorable += weight;
        }
        if let Some(actual) = actual {
            if actual.is_favorable() {
                self.ground_truth_favorable += weight;
                if predicted.is_favorable() {
                    self.true_positive += weight;
                }
            }
        }
    }

    fn selection_rate(&self) -> f64 {
        self.favorable / self.total_weight
    }

    fn true_positive_rate(&self) -> f64 {
        self.true_positive / self.ground_truth_favorable
    }

    fn into_stats(self, value: &str, with_ground_truth: bool) -> GroupStats {
        let selection_rate = self.selection_rate();
        let (ground_truth_favorable, true_positive_rate) = if with_ground_truth {
            (
                Some(self.ground_truth_favorable),
                Some(self.true_positive_rate()),
            )
        } else {
            (None, None)
        };
        GroupStats {
            value: value.to_string(),
            size: self.size,
            total_weight: self.total_weight,
            favorable: self.favorable,
            selection_rate,
            ground_truth_favorable,
            true_positive_rate,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pure core
// ────────────────────────────────────────────────────────────────────────────

/// Computes a metric set without side effects.
pub fn measure(
    registry: &ProtectedAttributeRegistry,
    batch: &OutcomeBatch<'_>,
    groups: &GroupDesignation,
) -> Result<FairnessMetricSet, AuditError> {
    let OutcomeBatch {
        records,
        outcomes,
        ground_truth,
        weights,
    } = *batch;

    if records.is_empty() {
        return Err(AuditError::EmptyBatch(
            "fairness metrics need at least one record".to_string(),
        ));
    }
    check_aligned("outcomes", outcomes.len(), records.len())?;
    if let Some(labels) = ground_truth {
        check_aligned("ground-truth labels", labels.len(), records.len())?;
    }
    if let Some(weights) = weights {
        check_aligned("weights", weights.len(), records.len())?;
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(AuditError::InvalidInput(format!(
                "weights must be finite and non-negative, got {bad}"
            )));
        }
    }

    registry.check_designation(&groups.attribute, &groups.privileged, &groups.unprivileged)?;

    let mut privileged = GroupTally::default();
    let mut unprivileged = GroupTally::default();
    let mut excluded_count = 0usize;

    for (i, record) in records.iter().enumerate() {
        registry.check_record(record)?;
        let Some(value) = record.protected_attributes.get(&groups.attribute) else {
            excluded_count += 1;
            continue;
        };
        let label = registry.group_label(&groups.attribute, value)?;
        let weight = weights.map_or(1.0, |w| w[i]);
        let actual = ground_truth.map(|labels| labels[i]);

        match label {
            Some(label) if label == groups.privileged => {
                privileged.add(weight, outcomes[i], actual)
            }
            Some(label) if label == groups.unprivileged => {
                unprivileged.add(weight, outcomes[i], actual)
            }
            _ => excluded_count += 1,
        }
    }

    for (tally, value, role) in [
        (&privileged, &groups.privileged, "privileged"),
        (&unprivileged, &groups.unprivileged, "unprivileged"),
    ] {
        if tally.size == 0 || tally.total_weight <= 0.0 {
            return Err(AuditError::EmptyGroup(format!(
                "{role} group {}={value} has no members in this batch",
                groups.attribute
            )));
        }
        if ground_truth.is_some() && tally.ground_truth_favorable <= 0.0 {
            return Err(AuditError::EmptyGroup(format!(
                "{role} group {}={value} has no ground-truth favorable members; equal opportunity is undefined",
                groups.attribute
            )));
        }
    }

    let sr_privileged = privileged.selection_rate();
    let sr_unprivileged = unprivileged.selection_rate();
    let demographic_parity = sr_unprivileged - sr_privileged;
    let disparate_impact = (sr_privileged > 0.0).then(|| sr_unprivileged / sr_privileged);

    let (equal_opportunity, equal_opportunity_mode) = if ground_truth.is_some() {
        (
            unprivileged.true_positive_rate() - privileged.true_positive_rate(),
            EqualOpportunityMode::TruePositiveRate,
        )
    } else {
        (demographic_parity, EqualOpportunityMode::SelectionRateProxy)
    };

    debug!(
        attribute = %groups.attribute,
        privileged_rate = sr_privileged,
        unprivileged_rate = sr_unprivileged,
        excluded = excluded_count,
        "Measured group selection rates"
    );

    let with_ground_truth = ground_truth.is_some();
    Ok(FairnessMetricSet {
        id: Uuid::new_v4(),
        computed_at: Utc::now(),
        groups: groups.clone(),
        demographic_parity,
        equal_opportunity,
        equal_opportunity_mode,
        disparate_impact,
        privileged_group: privileged.into_stats(&groups.privileged, with_ground_truth),
        unprivileged_group: unprivileged.into_stats(&groups.unprivileged, with_ground_truth),
        batch_size: records.len(),
        excluded_count,
        weighted: weights.is_some(),
    })
}

fn check_aligned(what: &str, got: usize, expected: usize) -> Result<(), AuditError> {
    if got != expected {
        return Err(AuditError::InvalidInput(format!(
            "{what} length {got} does not match record count {expected}"
        )));
    }
    Ok(())
}

/// Checks each decision references the record at the same position.
pub fn outcomes_of(
    records: &[FeatureRecord],
    decisions: &[Decision],
) -> Result<Vec<Outcome>, AuditError> {
    check_aligned("decisions", decisions.len(), records.len())?;
    records
        .iter()
        .zip(decisions)
        .map(|(record, decision)| {
            if decision.record_id() != record.id {
                return Err(AuditError::InvalidInput(format!(
                    "decision for '{}' is paired with record '{}'",
                    decision.record_id(),
                    record.id
                )));
            }
            Ok(decision.outcome())
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Calculator
// ────────────────────────────────────────────────────────────────────────────

/// Computes metric sets and records each one in the audit log.
#[derive(Clone)]
pub struct FairnessCalculator {
    registry: Arc<ProtectedAttributeRegistry>,
    log: Arc<AuditLog>,
}

impl FairnessCalculator {
    pub fn new(registry: Arc<ProtectedAttributeRegistry>, log: Arc<AuditLog>) -> Self {
        Self { registry, log }
    }

    pub fn registry(&self) -> &ProtectedAttributeRegistry {
        &self.registry
    }

    /// Metrics over classifier decisions. Supplying `ground_truth` enables a
    /// true equal-opportunity computation; without it the output is labeled
    /// `selection_rate_proxy`.
    pub fn compute(
        &self,
        records: &[FeatureRecord],
        decisions: &[Decision],
        ground_truth: Option<&[Outcome]>,
        groups: &GroupDesignation,
    ) -> Result<FairnessMetricSet, AuditError> {
        let outcomes = outcomes_of(records, decisions)?;
        self.compute_outcomes(&OutcomeBatch {
            records,
            outcomes: &outcomes,
            ground_truth,
            weights: None,
        }, groups)
    }

    /// Metrics over raw outcomes, optionally weighted.
    pub fn compute_outcomes(
        &self,
        batch: &OutcomeBatch<'_>,
        groups: &GroupDesignation,
    ) -> Result<FairnessMetricSet, AuditError> {
        let set = self.measure(batch, groups)?;
        info!(
            target: "bias_monitoring",
            metric_set = %set.id,
            attribute = %set.groups.attribute,
            demographic_parity = set.demographic_parity,
            equal_opportunity = set.equal_opportunity,
            disparate_impact = ?set.disparate_impact,
            batch_size = set.batch_size,
            "Fairness metrics computed"
        );
        self.log.append(AuditPayload::MetricComputed(set.clone()));
        Ok(set)
    }

    /// Same as `compute_outcomes` but leaves the audit log untouched.
    pub fn measure(
        &self,
        batch: &OutcomeBatch<'_>,
        groups: &GroupDesignation,
    ) -> Result<FairnessMetricSet, AuditError> {
        measure(&self.registry, batch, groups)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
