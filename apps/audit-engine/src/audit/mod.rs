// Audit Log Sink and the trend reports built from it.
// The log is the only shared mutable state in the engine.

pub mod log;
pub mod report;

pub use log::{
    AuditEvent, AuditLog, AuditPayload, AuditQuery, BiasFlagRecord, EventType, MitigationRecord,
};
pub use report::{
    daily_trends, mitigation_usage, protected_attribute_impact, summarize, AttributeImpact,
    AuditSummary, DailyTrend, MetricAverages,
};
