//! Mitigation vocabulary shared by every strategy: the strategy enum, the
//! training dataset, group membership and the `Mitigator` capability.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::AuditError;
use crate::fairness::calculator::outcomes_of;
use crate::fairness::{FairnessMetricSet, GroupDesignation, ProtectedAttributeRegistry};
use crate::models::{Decision, FeatureRecord, Outcome};
use crate::screening::TrainedModel;

use super::post_processing::GroupThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MitigationStrategy {
    Reweighing,
    InProcessing,
    PostProcessing,
}

impl MitigationStrategy {
    pub const ALL: [MitigationStrategy; 3] = [
        MitigationStrategy::Reweighing,
        MitigationStrategy::InProcessing,
        MitigationStrategy::PostProcessing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MitigationStrategy::Reweighing => "reweighing",
            MitigationStrategy::InProcessing => "in_processing",
            MitigationStrategy::PostProcessing => "post_processing",
        }
    }
}

impl fmt::Display for MitigationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MitigationStrategy {
    type Err = AuditError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "reweighing" => Ok(MitigationStrategy::Reweighing),
            "in_processing" | "prejudice_remover" => Ok(MitigationStrategy::InProcessing),
            "post_processing" | "equalized_odds" => Ok(MitigationStrategy::PostProcessing),
            _ => Err(AuditError::UnknownStrategy(s.to_string())),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dataset
// ────────────────────────────────────────────────────────────────────────────

/// Training batch handed to a mitigator. `labels`, when present, align by
/// position with `records`; so do `decisions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationDataset {
    pub records: Vec<FeatureRecord>,
    #[serde(default)]
    pub labels: Option<Vec<Outcome>>,
    #[serde(default)]
    pub decisions: Option<Vec<Decision>>,
    pub groups: GroupDesignation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Privileged,
    Unprivileged,
    Excluded,
}

impl MitigationDataset {
    pub fn labels(&self) -> Result<&[Outcome], AuditError> {
        self.labels.as_deref().ok_or_else(|| {
            AuditError::MissingGroundTruth("mitigation requires training labels".to_string())
        })
    }

    pub fn decisions(&self) -> Result<&[Decision], AuditError> {
        self.decisions.as_deref().ok_or_else(|| {
            AuditError::InvalidInput("this strategy requires classifier decisions".to_string())
        })
    }

    /// Validates the batch and resolves each record's group.
    pub fn memberships(
        &self,
        registry: &ProtectedAttributeRegistry,
    ) -> Result<Vec<Membership>, AuditError> {
        if self.records.is_empty() {
            return Err(AuditError::EmptyBatch(
                "mitigation needs at least one record".to_string(),
            ));
        }
        let labels = self.labels()?;
        if labels.len() != self.records.len() {
            return Err(AuditError::InvalidInput(format!(
                "labels length {} does not match record count {}",
                labels.len(),
                self.records.len()
            )));
        }
        if let Some(decisions) = &self.decisions {
            outcomes_of(&self.records, decisions)?;
        }

        let groups = &self.groups;
        registry.check_designation(&groups.attribute, &groups.privileged, &groups.unprivileged)?;

        let mut memberships = Vec::with_capacity(self.records.len());
        for record in &self.records {
            registry.check_record(record)?;
            let membership = match record.protected_attributes.get(&groups.attribute) {
                None => Membership::Excluded,
                Some(value) => {
                    match registry.group_label(&groups.attribute, value)? {
                        Some(label) if label == groups.privileged => Membership::Privileged,
                        Some(label) if label == groups.unprivileged => Membership::Unprivileged,
                        _ => Membership::Excluded,
                    }
                }
            };
            memberships.push(membership);
        }

        for (wanted, value) in [
            (Membership::Privileged, &groups.privileged),
            (Membership::Unprivileged, &groups.unprivileged),
        ] {
            if !memberships.contains(&wanted) {
                return Err(AuditError::EmptyGroup(format!(
                    "{}={value} has no members in the training batch",
                    groups.attribute
                )));
            }
        }
        Ok(memberships)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Capability
// ────────────────────────────────────────────────────────────────────────────

/// Per-run inputs a mitigator may rely on.
pub struct MitigationContext<'a> {
    pub memberships: &'a [Membership],
    pub cancel: &'a CancellationToken,
}

impl MitigationContext<'_> {
    /// Fails with `Cancelled` once the token has fired.
    pub fn checkpoint(&self) -> Result<(), AuditError> {
        if self.cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        Ok(())
    }
}

/// What a strategy produced. Features are never altered by any strategy.
#[derive(Debug, Clone)]
pub struct MitigatedData {
    pub labels: Vec<Outcome>,
    pub weights: Option<Vec<f64>>,
    pub group_thresholds: Option<GroupThresholds>,
    pub model: Option<TrainedModel>,
    /// Ground truth the post-mitigation metrics are measured against, when
    /// the strategy's labels are predictions rather than training labels.
    pub reference_labels: Option<Vec<Outcome>>,
}

/// A bias-mitigation strategy. Implementations are CPU-bound and run on the
/// blocking pool; long loops should call `ctx.checkpoint()`.
pub trait Mitigator: Send + Sync {
    fn strategy(&self) -> MitigationStrategy;

    fn fit_transform(
        &self,
        dataset: &MitigationDataset,
        ctx: &MitigationContext<'_>,
    ) -> Result<MitigatedData, AuditError>;
}

/// Output of one mitigation run, with metrics recomputed on its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationResult {
    pub id: Uuid,
    pub strategy: MitigationStrategy,
    pub groups: GroupDesignation,
    pub batch_size: usize,
    pub records: Vec<FeatureRecord>,
    pub labels: Vec<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_thresholds: Option<GroupThresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<TrainedModel>,
    pub post_mitigation: FairnessMetricSet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeValue;

    fn make_dataset(genders: &[&str], labels: Option<Vec<Outcome>>) -> MitigationDataset {
        MitigationDataset {
            records: genders
                .iter()
                .enumerate()
                .map(|(i, g)| {
                    let record = FeatureRecord::new(format!("r{i}"));
                    if g.is_empty() {
                        record
                    } else {
                        record.with_attribute("gender", AttributeValue::Category(g.to_string()))
                    }
                })
                .collect(),
            labels,
            decisions: None,
            groups: GroupDesignation::new("gender", "male", "female"),
        }
    }

    #[test]
    fn test_strategy_names_and_aliases() {
        assert_eq!("reweighing".parse::<MitigationStrategy>().unwrap(), MitigationStrategy::Reweighing);
        assert_eq!(
            "prejudice_remover".parse::<MitigationStrategy>().unwrap(),
            MitigationStrategy::InProcessing
        );
        assert_eq!(
            "Equalized-Odds".parse::<MitigationStrategy>().unwrap(),
            MitigationStrategy::PostProcessing
        );
        let err = "adversarial_debiasing".parse::<MitigationStrategy>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_STRATEGY");
    }

    #[test]
    fn test_strategy_display_round_trips() {
        for strategy in MitigationStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<MitigationStrategy>().unwrap(), strategy);
        }
        assert_eq!(
            serde_json::to_string(&MitigationStrategy::PostProcessing).unwrap(),
            r#""post_processing""#
        );
    }

    #[test]
    fn test_memberships_resolve_groups() {
        let dataset = make_dataset(
            &["male", "female", "other", ""],
            Some(vec![Outcome::Favorable; 4]),
        );
        let memberships = dataset
            .memberships(&ProtectedAttributeRegistry::default())
            .unwrap();
        assert_eq!(
            memberships,
            vec![
                Membership::Privileged,
                Membership::Unprivileged,
                Membership::Excluded,
                Membership::Excluded
            ]
        );
    }

    #[test]
    fn test_memberships_exclude_unlisted_category() {
        let dataset = make_dataset(
            &["male", "nonbinary", "female"],
            Some(vec![Outcome::Favorable; 3]),
        );
        let memberships = dataset
            .memberships(&ProtectedAttributeRegistry::default())
            .unwrap();
        assert_eq!(memberships[1], Membership::Excluded);
    }

    #[test]
    fn test_memberships_require_labels() {
        let dataset = make_dataset(&["male", "female"], None);
        let err = dataset
            .memberships(&ProtectedAttributeRegistry::default())
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_GROUND_TRUTH");
    }

    #[test]
    fn test_memberships_reject_empty_group_and_misaligned_labels() {
        let registry = ProtectedAttributeRegistry::default();
        let dataset = make_dataset(&["male", "male"], Some(vec![Outcome::Favorable; 2]));
        assert_eq!(dataset.memberships(&registry).unwrap_err().code(), "EMPTY_GROUP");

        let dataset = make_dataset(&["male", "female"], Some(vec![Outcome::Favorable]));
        assert_eq!(dataset.memberships(&registry).unwrap_err().code(), "INVALID_INPUT");

        let dataset = make_dataset(&[], Some(vec![]));
        assert_eq!(dataset.memberships(&registry).unwrap_err().code(), "EMPTY_BATCH");
    }

    #[test]
    fn test_checkpoint_observes_cancellation() {
        let cancel = CancellationToken::new();
        let ctx = MitigationContext {
            memberships: &[],
            cancel: &cancel,
        };
        assert!(ctx.checkpoint().is_ok());
        cancel.cancel();
        assert!(matches!(ctx.checkpoint(), Err(AuditError::Cancelled)));
    }
}
