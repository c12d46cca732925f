// Group-fairness measurement: protected-attribute allow-list, numeric bucketing,
// the metric calculator and the threshold evaluator.

pub mod attributes;
pub mod bucketing;
pub mod calculator;
pub mod metrics;
pub mod thresholds;

pub use attributes::{AttributeKind, ProtectedAttributeRegistry};
pub use bucketing::Bucketizer;
pub use calculator::{FairnessCalculator, OutcomeBatch};
pub use metrics::{EqualOpportunityMode, FairnessMetricSet, GroupDesignation, GroupStats};
pub use thresholds::{evaluate, BiasFlag, FairnessThresholds, MetricCheck, MetricName, Verdict};
