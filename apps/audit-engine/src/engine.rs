//! Audit engine façade.
//!
//! Wires the metric calculator, threshold evaluator, mitigation selector and
//! audit log together. The engine is cheap to clone; clones share one log and
//! one mitigation worker pool.
//!
//! # Mitigation workers
//! Fitting is CPU-bound and runs on `tokio::task::spawn_blocking`. A
//! semaphore sized by `MITIGATION_WORKERS` bounds how many fits run at once,
//! independent of how many callers are waiting. A cancellation token is
//! honored while waiting for a worker and at the mitigator's checkpoints; a
//! cancelled run returns `Cancelled` and writes nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audit::{
    self, AttributeImpact, AuditEvent, AuditLog, AuditPayload, AuditQuery, AuditSummary,
    BiasFlagRecord, DailyTrend,
};
use crate::config::AuditConfig;
use crate::errors::AuditError;
use crate::fairness::{
    evaluate, BiasFlag, FairnessCalculator, FairnessMetricSet, FairnessThresholds,
    GroupDesignation, ProtectedAttributeRegistry,
};
use crate::mitigation::{
    InProcessingOptions, MitigationDataset, MitigationResult, MitigationSelector, Mitigator,
};
use crate::models::{Decision, FeatureRecord, Outcome};
use crate::screening::{screen_batch, Classifier, FeatureExtractor, ResumeDocument, ScreenedResume};

/// One batch of classifier decisions to audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    pub records: Vec<FeatureRecord>,
    pub decisions: Vec<Decision>,
    /// Enables a true-positive-rate equal-opportunity computation.
    #[serde(default)]
    pub ground_truth: Option<Vec<Outcome>>,
    pub groups: GroupDesignation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub metrics: FairnessMetricSet,
    pub flag: BiasFlag,
}

#[derive(Clone)]
pub struct AuditEngine {
    registry: Arc<ProtectedAttributeRegistry>,
    log: Arc<AuditLog>,
    calculator: FairnessCalculator,
    selector: Arc<MitigationSelector>,
    workers: Arc<Semaphore>,
    thresholds: FairnessThresholds,
}

impl AuditEngine {
    pub fn new(config: &AuditConfig) -> Result<Self, AuditError> {
        config.thresholds.validate()?;
        config.protected_attributes.validate()?;
        if config.mitigation_workers == 0 {
            return Err(AuditError::InvalidInput(
                "mitigation worker pool needs at least one worker".to_string(),
            ));
        }

        let registry = Arc::new(config.protected_attributes.clone());
        let log = Arc::new(AuditLog::new());
        let calculator = FairnessCalculator::new(registry.clone(), log.clone());
        let selector = MitigationSelector::with_defaults(
            calculator.clone(),
            log.clone(),
            InProcessingOptions::with_eta(config.in_processing_eta),
        )?;

        info!(
            attributes = ?registry.names().collect::<Vec<_>>(),
            workers = config.mitigation_workers,
            "Audit engine initialized"
        );

        Ok(Self {
            registry,
            log,
            calculator,
            selector: Arc::new(selector),
            workers: Arc::new(Semaphore::new(config.mitigation_workers)),
            thresholds: config.thresholds,
        })
    }

    pub fn registry(&self) -> &ProtectedAttributeRegistry {
        &self.registry
    }

    pub fn thresholds(&self) -> &FairnessThresholds {
        &self.thresholds
    }

    pub fn log(&self) -> &Arc<AuditLog> {
        &self.log
    }

    /// Adds or replaces a mitigation strategy for this engine and clones made
    /// from it afterwards.
    pub fn register_mitigator(&mut self, mitigator: Arc<dyn Mitigator>) {
        Arc::make_mut(&mut self.selector).register(mitigator);
    }

    // ────────────────────────────────────────────────────────────────────────
    // Audit
    // ────────────────────────────────────────────────────────────────────────

    /// Computes metrics for one batch and evaluates them against `thresholds`
    /// (the configured ones when `None`). Appends `metric_computed`, plus
    /// `bias_flagged` when any metric is violated.
    pub fn audit(
        &self,
        request: &AuditRequest,
        thresholds: Option<&FairnessThresholds>,
    ) -> Result<AuditReport, AuditError> {
        let thresholds = thresholds.unwrap_or(&self.thresholds);
        // Reject bad thresholds before anything reaches the log.
        thresholds.validate()?;

        let metrics = self.calculator.compute(
            &request.records,
            &request.decisions,
            request.ground_truth.as_deref(),
            &request.groups,
        )?;
        let flag = evaluate(&metrics, thresholds)?;

        if flag.violated {
            warn!(
                target: "bias_monitoring",
                metric_set = %metrics.id,
                attribute = %metrics.groups.attribute,
                privileged = %metrics.groups.privileged,
                unprivileged = %metrics.groups.unprivileged,
                triggered = ?flag.triggered,
                "Bias detected"
            );
            self.log.append(AuditPayload::BiasFlagged(BiasFlagRecord {
                metric_set_id: metrics.id,
                groups: metrics.groups.clone(),
                flag: flag.clone(),
            }));
        }

        Ok(AuditReport { metrics, flag })
    }

    // ────────────────────────────────────────────────────────────────────────
    // Mitigation
    // ────────────────────────────────────────────────────────────────────────

    pub async fn mitigate(
        &self,
        dataset: MitigationDataset,
        strategy: &str,
        cancel: CancellationToken,
    ) -> Result<MitigationResult, AuditError> {
        let mitigator = self.selector.resolve(strategy)?;

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AuditError::Cancelled),
            permit = self.workers.clone().acquire_owned() => permit.map_err(|e| {
                AuditError::Internal(anyhow::anyhow!("mitigation worker pool closed: {e}"))
            })?,
        };

        // Dropping this future cancels the blocking run.
        let run_cancel = cancel.child_token();
        let _drop_guard = run_cancel.clone().drop_guard();

        let selector = self.selector.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            selector.run(&dataset, mitigator.as_ref(), &run_cancel)
        })
        .await
        .map_err(|e| AuditError::Internal(anyhow::anyhow!("spawn_blocking failed in mitigation: {e}")))?
    }

    // ────────────────────────────────────────────────────────────────────────
    // Screening
    // ────────────────────────────────────────────────────────────────────────

    /// Screens resumes with the engine's protected-attribute allow-list.
    pub async fn screen(
        &self,
        extractor: &dyn FeatureExtractor,
        classifier: &dyn Classifier,
        documents: &[ResumeDocument],
    ) -> Result<Vec<ScreenedResume>, AuditError> {
        screen_batch(extractor, classifier, &self.registry, documents).await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Retrieval and trends
    // ────────────────────────────────────────────────────────────────────────

    pub fn events(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        self.log.query(query)
    }

    pub fn summary(&self, query: &AuditQuery) -> AuditSummary {
        audit::summarize(&self.log.query(query))
    }

    pub fn daily_trends(&self, query: &AuditQuery) -> Vec<DailyTrend> {
        audit::daily_trends(&self.log.query(query))
    }

    pub fn mitigation_usage(&self, query: &AuditQuery) -> BTreeMap<String, usize> {
        audit::mitigation_usage(&self.log.query(query))
    }

    pub fn attribute_impact(&self, query: &AuditQuery) -> BTreeMap<String, AttributeImpact> {
        audit::protected_attribute_impact(&self.log.query(query))
    }
}
