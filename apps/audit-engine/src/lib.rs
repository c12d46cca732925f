//! Bias-audit engine for resume screening.
//!
//! Takes batches of (features, decision, protected attributes), computes
//! group-fairness statistics, flags threshold violations, applies
//! bias-mitigation transforms and keeps an append-only audit trail.

pub mod audit;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fairness;
pub mod mitigation;
pub mod models;
pub mod screening;
pub mod telemetry;

pub use config::AuditConfig;
pub use engine::{AuditEngine, AuditReport, AuditRequest};
pub use errors::AuditError;
