//! Mitigation Strategy Selector.
//!
//! Maps a strategy name to a registered `Mitigator`, runs it, re-measures
//! fairness on its output and records one `mitigation_applied` audit event.
//! Nothing is logged for a run that fails or is cancelled.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditLog, AuditPayload, MitigationRecord};
use crate::errors::AuditError;
use crate::fairness::{FairnessCalculator, OutcomeBatch};

use super::in_processing::{InProcessing, InProcessingOptions};
use super::post_processing::PostProcessing;
use super::reweighing::Reweighing;
use super::strategy::{
    MitigationContext, MitigationDataset, MitigationResult, MitigationStrategy, Mitigator,
};

#[derive(Clone)]
pub struct MitigationSelector {
    calculator: FairnessCalculator,
    log: Arc<AuditLog>,
    mitigators: HashMap<MitigationStrategy, Arc<dyn Mitigator>>,
}

impl MitigationSelector {
    /// A selector with no strategies registered.
    pub fn new(calculator: FairnessCalculator, log: Arc<AuditLog>) -> Self {
        Self {
            calculator,
            log,
            mitigators: HashMap::new(),
        }
    }

    /// Registers reweighing, in-processing and post-processing.
    pub fn with_defaults(
        calculator: FairnessCalculator,
        log: Arc<AuditLog>,
        in_processing: InProcessingOptions,
    ) -> Result<Self, AuditError> {
        let mut selector = Self::new(calculator, log);
        selector.register(Arc::new(Reweighing));
        selector.register(Arc::new(InProcessing::new(in_processing)?));
        selector.register(Arc::new(PostProcessing));
        Ok(selector)
    }

    /// Replaces any mitigator already registered for the same strategy.
    pub fn register(&mut self, mitigator: Arc<dyn Mitigator>) {
        self.mitigators.insert(mitigator.strategy(), mitigator);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Mitigator>, AuditError> {
        let strategy: MitigationStrategy = name.parse()?;
        self.mitigators
            .get(&strategy)
            .cloned()
            .ok_or_else(|| AuditError::UnknownStrategy(name.to_string()))
    }

    /// Resolves `name` and runs it. Blocking; callers on an async runtime go
    /// through `AuditEngine::mitigate`.
    pub fn mitigate(
        &self,
        dataset: &MitigationDataset,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<MitigationResult, AuditError> {
        let mitigator = self.resolve(name)?;
        self.run(dataset, mitigator.as_ref(), cancel)
    }

    pub fn run(
        &self,
        dataset: &MitigationDataset,
        mitigator: &dyn Mitigator,
        cancel: &CancellationToken,
    ) -> Result<MitigationResult, AuditError> {
        let strategy = mitigator.strategy();
        let memberships = dataset.memberships(self.calculator.registry())?;
        let ctx = MitigationContext {
            memberships: &memberships,
            cancel,
        };
        ctx.checkpoint()?;

        let data = mitigator.fit_transform(dataset, &ctx)?;
        if data.labels.len() != dataset.records.len() {
            return Err(AuditError::Internal(anyhow::anyhow!(
                "{strategy} returned {} labels for {} records",
                data.labels.len(),
                dataset.records.len()
            )));
        }

        let post_mitigation = self.calculator.measure(
            &OutcomeBatch {
                records: &dataset.records,
                outcomes: &data.labels,
                ground_truth: data.reference_labels.as_deref(),
                weights: data.weights.as_deref(),
            },
            &dataset.groups,
        )?;

        // Last point at which a cancelled run leaves no trace.
        ctx.checkpoint()?;

        let result = MitigationResult {
            id: Uuid::new_v4(),
            strategy,
            groups: dataset.groups.clone(),
            batch_size: dataset.records.len(),
            records: dataset.records.clone(),
            labels: data.labels,
            weights: data.weights,
            group_thresholds: data.group_thresholds,
            model: data.model,
            post_mitigation,
        };

        info!(
            target: "bias_monitoring",
            result_id = %result.id,
            strategy = %strategy,
            attribute = %result.groups.attribute,
            batch_size = result.batch_size,
            post_demographic_parity = result.post_mitigation.demographic_parity,
            "Mitigation applied"
        );
        self.log.append(AuditPayload::MitigationApplied(MitigationRecord {
            result_id: result.id,
            strategy,
            groups: result.groups.clone(),
            batch_size: result.batch_size,
            post_mitigation_demographic_parity: result.post_mitigation.demographic_parity,
        }));

        Ok(result)
    }
}
