//! Append-only audit log.
//!
//! CRITICAL: entries are never edited or removed. Appends take a write lock for
//! the duration of one push, so concurrent writers never interleave within an
//! entry. Timestamps are non-decreasing in sequence order.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::fairness::{BiasFlag, FairnessMetricSet, GroupDesignation};
use crate::mitigation::MitigationStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MetricComputed,
    BiasFlagged,
    MitigationApplied,
}

/// Payload of a `bias_flagged` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasFlagRecord {
    pub metric_set_id: Uuid,
    pub groups: GroupDesignation,
    pub flag: BiasFlag,
}

/// Payload of a `mitigation_applied` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationRecord {
    pub result_id: Uuid,
    pub strategy: MitigationStrategy,
    pub groups: GroupDesignation,
    pub batch_size: usize,
    pub post_mitigation_demographic_parity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum AuditPayload {
    MetricComputed(FairnessMetricSet),
    BiasFlagged(BiasFlagRecord),
    MitigationApplied(MitigationRecord),
}

impl AuditPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            AuditPayload::MetricComputed(_) => EventType::MetricComputed,
            AuditPayload::BiasFlagged(_) => EventType::BiasFlagged,
            AuditPayload::MitigationApplied(_) => EventType::MitigationApplied,
        }
    }

    /// The protected attribute this event concerns.
    pub fn attribute(&self) -> &str {
        match self {
            AuditPayload::MetricComputed(set) => &set.groups.attribute,
            AuditPayload::BiasFlagged(record) => &record.groups.attribute,
            AuditPayload::MitigationApplied(record) => &record.groups.attribute,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: AuditPayload,
}

impl AuditEvent {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Time-range filter; both ends inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub event_type: Option<EventType>,
}

impl AuditQuery {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            event_type: None,
        }
    }

    pub fn everything() -> Self {
        Self::between(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC)
    }

    pub fn of_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        event.timestamp >= self.start
            && event.timestamp <= self.end
            && self.event_type.map_or(true, |t| t == event.event_type())
    }
}

#[derive(Debug, Default)]
struct LogState {
    events: Vec<AuditEvent>,
    last_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct AuditLog {
    state: RwLock<LogState>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event and returns a copy of it.
    pub fn append(&self, payload: AuditPayload) -> AuditEvent {
        // A panic elsewhere cannot leave a half-written entry: each push is a
        // single Vec append, so a poisoned lock is still consistent.
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let now = Utc::now();
        let timestamp = match state.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        let event = AuditEvent {
            id: Uuid::new_v4(),
            sequence: state.events.len() as u64,
            timestamp,
            payload,
        };
        state.last_timestamp = Some(timestamp);
        state.events.push(event.clone());
        drop(state);

        info!(
            target: "bias_monitoring",
            event_id = %event.id,
            sequence = event.sequence,
            event_type = ?event.event_type(),
            "Audit event recorded"
        );
        event
    }

    /// Matching events in append order.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::fairness::{EqualOpportunityMode, GroupStats};

    fn make_groups() -> GroupDesignation {
        GroupDesignation::new("gender", "male", "female")
    }

    fn make_metric_set(dp: f64) -> FairnessMetricSet {
        let stats = GroupStats {
            value: "male".into(),
            size: 1,
            total_weight: 1.0,
            favorable: 1.0,
            selection_rate: 1.0,
            ground_truth_favorable: None,
            true_positive_rate: None,
        };
        FairnessMetricSet {
            id: Uuid::new_v4(),
            computed_at: Utc::now(),
            groups: make_groups(),
            demographic_parity: dp,
            equal_opportunity: dp,
            equal_opportunity_mode: EqualOpportunityMode::SelectionRateProxy,
            disparate_impact: Some(1.0),
            privileged_group: stats.clone(),
            unprivileged_group: stats,
            batch_size: 2,
            excluded_count: 0,
            weighted: false,
        }
    }

    fn make_mitigation() -> AuditPayload {
        AuditPayload::MitigationApplied(MitigationRecord {
            result_id: Uuid::new_v4(),
            strategy: MitigationStrategy::Reweighing,
            groups: make_groups(),
            batch_size: 10,
            post_mitigation_demographic_parity: 0.0,
        })
    }

    #[test]
    fn test_append_assigns_sequence_and_monotonic_timestamps() {
        let log = AuditLog::new();
        for i in 0..5 {
            log.append(AuditPayload::MetricComputed(make_metric_set(i as f64 / 10.0)));
        }
        let events = log.query(&AuditQuery::everything());
        assert_eq!(events.len(), 5);
        for (i, pair) in events.windows(2).enumerate() {
            assert_eq!(pair[0].sequence, i as u64);
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn test_query_filters_by_type() {
        let log = AuditLog::new();
        log.append(AuditPayload::MetricComputed(make_metric_set(0.1)));
        log.append(make_mitigation());
        log.append(AuditPayload::MetricComputed(make_metric_set(0.2)));

        let mitigations = log.query(&AuditQuery::everything().of_type(EventType::MitigationApplied));
        assert_eq!(mitigations.len(), 1);
        assert_eq!(mitigations[0].sequence, 1);

        let metrics = log.query(&AuditQuery::everything().of_type(EventType::MetricComputed));
        assert_eq!(metrics.len(), 2);
    }

    #[test]
    fn test_query_filters_by_time_range() {
        let log = AuditLog::new();
        let event = log.append(AuditPayload::MetricComputed(make_metric_set(0.0)));

        let before = AuditQuery::between(
            event.timestamp - Duration::days(2),
            event.timestamp - Duration::days(1),
        );
        assert!(log.query(&before).is_empty());

        let exact = AuditQuery::between(event.timestamp, event.timestamp);
        assert_eq!(log.query(&exact).len(), 1);
    }

    #[test]
    fn test_concurrent_appends_are_all_recorded() {
        let log = Arc::new(AuditLog::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        log.append(AuditPayload::MetricComputed(make_metric_set(0.0)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = log.query(&AuditQuery::everything());
        assert_eq!(events.len(), 400);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.sequence, i as u64);
        }
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_event_serializes_with_type_and_payload() {
        let log = AuditLog::new();
        let event = log.append(make_mitigation());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "mitigation_applied");
        assert_eq!(json["payload"]["strategy"], "reweighing");
        assert_eq!(json["payload"]["batch_size"], 10);
        assert!(json["timestamp"].is_string());
    }
}
