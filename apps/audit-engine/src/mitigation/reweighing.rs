//! Reweighing: pre-processing that leaves features and labels untouched and
//! assigns each record `P(group) · P(label) / P(group, label)`.
//!
//! Probabilities are taken over the two designated groups only. Records in
//! neither group keep weight 1.0. Under these weights the weighted selection
//! rates of the two groups coincide.

use tracing::debug;

use crate::errors::AuditError;
use crate::models::Outcome;

use super::strategy::{
    Membership, MitigatedData, MitigationContext, MitigationDataset, MitigationStrategy, Mitigator,
};

pub struct Reweighing;

/// Record counts per (group, label) cell.
#[derive(Debug, Default)]
struct Cells {
    // [privileged, unprivileged] × [unfavorable, favorable]
    counts: [[usize; 2]; 2],
}

impl Cells {
    fn index(membership: Membership) -> Option<usize> {
        match membership {
            Membership::Privileged => Some(0),
            Membership::Unprivileged => Some(1),
            Membership::Excluded => None,
        }
    }

    fn add(&mut self, group: usize, label: Outcome) {
        self.counts[group][label.label() as usize] += 1;
    }

    fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    fn group_total(&self, group: usize) -> usize {
        self.counts[group].iter().sum()
    }

    fn label_total(&self, label: usize) -> usize {
        self.counts[0][label] + self.counts[1][label]
    }

    /// `(n_g · n_y) / (n · n_gy)`; only called for occupied cells.
    fn weight(&self, group: usize, label: usize) -> f64 {
        let n = self.total() as f64;
        let n_g = self.group_total(group) as f64;
        let n_y = self.label_total(label) as f64;
        let n_gy = self.counts[group][label] as f64;
        (n_g * n_y) / (n * n_gy)
    }
}

impl Mitigator for Reweighing {
    fn strategy(&self) -> MitigationStrategy {
        MitigationStrategy::Reweighing
    }

    fn fit_transform(
        &self,
        dataset: &MitigationDataset,
        ctx: &MitigationContext<'_>,
    ) -> Result<MitigatedData, AuditError> {
        let labels = dataset.labels()?;

        let mut cells = Cells::default();
        for (membership, label) in ctx.memberships.iter().zip(labels) {
            if let Some(group) = Cells::index(*membership) {
                cells.add(group, *label);
            }
        }
        ctx.checkpoint()?;

        let weights: Vec<f64> = ctx
            .memberships
            .iter()
            .zip(labels)
            .map(|(membership, label)| match Cells::index(*membership) {
                Some(group) => cells.weight(group, label.label() as usize),
                None => 1.0,
            })
            .collect();

        debug!(
            privileged = ?cells.counts[0],
            unprivileged = ?cells.counts[1],
            "Reweighing cell counts"
        );

        Ok(MitigatedData {
            labels: labels.to_vec(),
            weights: Some(weights),
            group_thresholds: None,
            model: None,
            reference_labels: None,
        })
    }
}
