//! Post-processing mitigation (equalized odds).
//!
//! Chooses one decision threshold per group over the classifier's favorable
//! scores so that true-positive and false-positive rates line up across the
//! two groups. Search is exhaustive over each group's observed scores plus a
//! reject-all threshold; the objective is `|ΔTPR| + |ΔFPR|`, ties broken by
//! the number of correct predictions. Records in neither group keep the
//! classifier's decision.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AuditError;
use crate::models::Outcome;

use super::strategy::{
    Membership, MitigatedData, MitigationContext, MitigationDataset, MitigationStrategy, Mitigator,
};

/// Threshold that rejects every score in [0, 1].
const REJECT_ALL: f64 = f64::MAX;
const TIE_EPSILON: f64 = 1e-12;

/// Unprivileged minus privileged rate gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsGaps {
    pub true_positive_rate: f64,
    pub false_positive_rate: f64,
}

impl OddsGaps {
    pub fn objective(&self) -> f64 {
        self.true_positive_rate.abs() + self.false_positive_rate.abs()
    }
}

/// Chosen per-group thresholds, with the rate gaps before and after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupThresholds {
    pub privileged: f64,
    pub unprivileged: f64,
    pub before: OddsGaps,
    pub after: OddsGaps,
}

pub struct PostProcessing;

#[derive(Debug, Clone, Copy)]
struct OperatingPoint {
    threshold: f64,
    true_positive_rate: f64,
    false_positive_rate: f64,
    correct: usize,
}

#[derive(Debug, Default)]
struct GroupScores {
    /// (favorable score, predicted favorable, actually favorable)
    entries: Vec<(f64, bool, bool)>,
}

impl GroupScores {
    fn positives(&self) -> usize {
        self.entries.iter().filter(|e| e.2).count()
    }

    fn negatives(&self) -> usize {
        self.entries.len() - self.positives()
    }

    fn check(&self, role: &str, attribute: &str, value: &str) -> Result<(), AuditError> {
        if self.positives() == 0 || self.negatives() == 0 {
            return Err(AuditError::EmptyGroup(format!(
                "{role} group {attribute}={value} needs both favorable and unfavorable labels \
                 for equalized odds"
            )));
        }
        Ok(())
    }

    fn rates(&self, predict: impl Fn(&(f64, bool, bool)) -> bool) -> (f64, f64, usize) {
        let (mut tp, mut fp, mut correct) = (0usize, 0usize, 0usize);
        for entry in &self.entries {
            let predicted = predict(entry);
            match (predicted, entry.2) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                _ => {}
            }
            if predicted == entry.2 {
                correct += 1;
            }
        }
        (
            tp as f64 / self.positives() as f64,
            fp as f64 / self.negatives() as f64,
            correct,
        )
    }

    /// Rates of the classifier's own decisions.
    fn observed(&self) -> (f64, f64) {
        let (tpr, fpr, _) = self.rates(|e| e.1);
        (tpr, fpr)
    }

    /// One point per distinct score in ascending order, then reject-all.
    /// Built in a single descending sweep over the sorted scores.
    fn operating_points(&self) -> Vec<OperatingPoint> {
        let positives = self.positives();
        let negatives = self.negatives();
        let point = |threshold: f64, tp: usize, fp: usize| OperatingPoint {
            threshold,
            true_positive_rate: tp as f64 / positives as f64,
            false_positive_rate: fp as f64 / negatives as f64,
            correct: tp + (negatives - fp),
        };

        let mut sorted: Vec<(f64, bool)> = self.entries.iter().map(|e| (e.0, e.2)).collect();
        sorted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut points = vec![point(REJECT_ALL, 0, 0)];
        let (mut tp, mut fp) = (0usize, 0usize);
        let mut i = 0;
        while i < sorted.len() {
            let threshold = sorted[i].0;
            while i < sorted.len() && sorted[i].0 == threshold {
                if sorted[i].1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
                i += 1;
            }
            points.push(point(threshold, tp, fp));
        }
        points.reverse();
        points
    }
}

fn gaps(privileged: (f64, f64), unprivileged: (f64, f64)) -> OddsGaps {
    OddsGaps {
        true_positive_rate: unprivileged.0 - privileged.0,
        false_positive_rate: unprivileged.1 - privileged.1,
    }
}

impl Mitigator for PostProcessing {
    fn strategy(&self) -> MitigationStrategy {
        MitigationStrategy::PostProcessing
    }

    fn fit_transform(
        &self,
        dataset: &MitigationDataset,
        ctx: &MitigationContext<'_>,
    ) -> Result<MitigatedData, AuditError> {
        let labels = dataset.labels()?;
        let decisions = dataset.decisions()?;
        let groups = &dataset.groups;

        let mut privileged = GroupScores::default();
        let mut unprivileged = GroupScores::default();
        for ((membership, decision), label) in ctx.memberships.iter().zip(decisions).zip(labels) {
            let entry = (
                decision.favorable_score(),
                decision.outcome().is_favorable(),
                label.is_favorable(),
            );
            match membership {
                Membership::Privileged => privileged.entries.push(entry),
                Membership::Unprivileged => unprivileged.entries.push(entry),
                Membership::Excluded => {}
            }
        }
        privileged.check("privileged", &groups.attribute, &groups.privileged)?;
        unprivileged.check("unprivileged", &groups.attribute, &groups.unprivileged)?;

        let before = gaps(privileged.observed(), unprivileged.observed());

        let privileged_points = privileged.operating_points();
        let unprivileged_points = unprivileged.operating_points();

        let mut best: Option<(f64, usize, OperatingPoint, OperatingPoint)> = None;
        for p in &privileged_points {
            ctx.checkpoint()?;
            for u in &unprivileged_points {
                let objective = (u.true_positive_rate - p.true_positive_rate).abs()
                    + (u.false_positive_rate - p.false_positive_rate).abs();
                let correct = p.correct + u.correct;
                let better = match &best {
                    None => true,
                    Some((best_objective, best_correct, _, _)) => {
                        objective < best_objective - TIE_EPSILON
                            || ((objective - best_objective).abs() <= TIE_EPSILON
                                && correct > *best_correct)
                    }
                };
                if better {
                    best = Some((objective, correct, *p, *u));
                }
            }
        }
        let (_, _, p, u) = best.ok_or_else(|| {
            AuditError::Internal(anyhow::anyhow!("equalized odds search found no thresholds"))
        })?;

        let after = gaps(
            (p.true_positive_rate, p.false_positive_rate),
            (u.true_positive_rate, u.false_positive_rate),
        );

        let adjusted: Vec<Outcome> = ctx
            .memberships
            .iter()
            .zip(decisions)
            .map(|(membership, decision)| {
                let score = decision.favorable_score();
                let favorable = match membership {
                    Membership::Privileged => score >= p.threshold,
                    Membership::Unprivileged => score >= u.threshold,
                    Membership::Excluded => decision.outcome().is_favorable(),
                };
                if favorable {
                    Outcome::Favorable
                } else {
                    Outcome::Unfavorable
                }
            })
            .collect();

        debug!(
            privileged_threshold = p.threshold,
            unprivileged_threshold = u.threshold,
            objective_before = before.objective(),
            objective_after = after.objective(),
            "Equalized odds thresholds chosen"
        );

        Ok(MitigatedData {
            labels: adjusted,
            weights: None,
            group_thresholds: Some(GroupThresholds {
                privileged: p.threshold,
                unprivileged: u.threshold,
                before,
                after,
            }),
            model: None,
            reference_labels: Some(labels.to_vec()),
        })
    }
}
