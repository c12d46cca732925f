//! Trend reporting over audit-log retrieval.
//!
//! Aggregates only what the log holds. Averages skip null disparate-impact
//! values; an aggregate with nothing to average is `None`, never 0.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::audit::log::{AuditEvent, AuditPayload};
use crate::fairness::FairnessMetricSet;

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MetricMeans {
    demographic_parity: Mean,
    equal_opportunity: Mean,
    disparate_impact: Mean,
}

impl MetricMeans {
    fn push(&mut self, set: &FairnessMetricSet) {
        self.demographic_parity.push(Some(set.demographic_parity));
        self.equal_opportunity.push(Some(set.equal_opportunity));
        self.disparate_impact.push(set.disparate_impact);
    }

    fn averages(self) -> MetricAverages {
        MetricAverages {
            demographic_parity: self.demographic_parity.value(),
            equal_opportunity: self.equal_opportunity.value(),
            disparate_impact: self.disparate_impact.value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAverages {
    pub demographic_parity: Option<f64>,
    pub equal_opportunity: Option<f64>,
    pub disparate_impact: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub metrics: MetricAverages,
    pub total_analyses: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeImpact {
    pub total: usize,
    pub averages: MetricAverages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_analyses: usize,
    pub flagged_count: usize,
    pub flag_rate: Option<f64>,
    pub mitigation_count: usize,
    pub average_metrics: MetricAverages,
    /// How often each metric triggered a flag.
    pub trigger_counts: BTreeMap<String, usize>,
    pub mitigation_statistics: BTreeMap<String, usize>,
}

fn metric_sets(events: &[AuditEvent]) -> impl Iterator<Item = (&AuditEvent, &FairnessMetricSet)> {
    events.iter().filter_map(|e| match &e.payload {
        AuditPayload::MetricComputed(set) => Some((e, set)),
        _ => None,
    })
}

/// Per-day averages of `metric_computed` events, ascending by UTC date.
pub fn daily_trends(events: &[AuditEvent]) -> Vec<DailyTrend> {
    let mut days: BTreeMap<NaiveDate, (MetricMeans, usize)> = BTreeMap::new();
    for (event, set) in metric_sets(events) {
        let day = days.entry(event.timestamp.date_naive()).or_default();
        day.0.push(set);
        day.1 += 1;
    }
    days.into_iter()
        .map(|(date, (means, total_analyses))| DailyTrend {
            date,
            metrics: means.averages(),
            total_analyses,
        })
        .collect()
}

/// Count of `mitigation_applied` events per strategy name.
pub fn mitigation_usage(events: &[AuditEvent]) -> BTreeMap<String, usize> {
    let mut usage = BTreeMap::new();
    for event in events {
        if let AuditPayload::MitigationApplied(record) = &event.payload {
            *usage.entry(record.strategy.to_string()).or_insert(0) += 1;
        }
    }
    usage
}

/// Count and metric averages per protected attribute.
pub fn protected_attribute_impact(events: &[AuditEvent]) -> BTreeMap<String, AttributeImpact> {
    let mut by_attribute: BTreeMap<String, (MetricMeans, usize)> = BTreeMap::new();
    for (_, set) in metric_sets(events) {
        let entry = by_attribute
            .entry(set.groups.attribute.clone())
            .or_default();
        entry.0.push(set);
        entry.1 += 1;
    }
    by_attribute
        .into_iter()
        .map(|(attribute, (means, total))| {
            (
                attribute,
                AttributeImpact {
                    total,
                    averages: means.averages(),
                },
            )
        })
        .collect()
}

pub fn summarize(events: &[AuditEvent]) -> AuditSummary {
    let mut means = MetricMeans::default();
    let mut total_analyses = 0usize;
    let mut flagged_count = 0usize;
    let mut trigger_counts: BTreeMap<String, usize> = BTreeMap::new();

    for event in events {
        match &event.payload {
            AuditPayload::MetricComputed(set) => {
                means.push(set);
                total_analyses += 1;
            }
            AuditPayload::BiasFlagged(record) => {
                flagged_count += 1;
                for metric in &record.flag.triggered {
                    *trigger_counts.entry(metric.to_string()).or_insert(0) += 1;
                }
            }
            AuditPayload::MitigationApplied(_) => {}
        }
    }

    let mitigation_statistics = mitigation_usage(events);
    AuditSummary {
        total_analyses,
        flagged_count,
        flag_rate: (total_analyses > 0).then(|| flagged_count as f64 / total_analyses as f64),
        mitigation_count: mitigation_statistics.values().sum(),
        average_metrics: means.averages(),
        trigger_counts,
        mitigation_statistics,
    }
}
