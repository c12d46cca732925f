use serde::Serialize;
use thiserror::Error;

/// Engine-level error type.
///
/// Every variant is local and recoverable by the caller. The engine never
/// retries and never substitutes a default value for an undefined metric.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Empty batch: {0}")]
    EmptyBatch(String),

    #[error("Empty group: {0}")]
    EmptyGroup(String),

    #[error("Invalid threshold for {metric}: {value} (must be within [0, 1])")]
    InvalidThreshold { metric: String, value: f64 },

    #[error("Unknown mitigation strategy: {0}")]
    UnknownStrategy(String),

    #[error("Missing ground truth: {0}")]
    MissingGroundTruth(String),

    #[error("Invalid protected attribute: {0}")]
    InvalidProtectedAttribute(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Mitigation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Serializable error body for the surrounding service layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl AuditError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AuditError::EmptyBatch(_) => "EMPTY_BATCH",
            AuditError::EmptyGroup(_) => "EMPTY_GROUP",
            AuditError::InvalidThreshold { .. } => "INVALID_THRESHOLD",
            AuditError::UnknownStrategy(_) => "UNKNOWN_STRATEGY",
            AuditError::MissingGroundTruth(_) => "MISSING_GROUND_TRUTH",
            AuditError::InvalidProtectedAttribute(_) => "INVALID_PROTECTED_ATTRIBUTE",
            AuditError::InvalidInput(_) => "INVALID_INPUT",
            AuditError::Cancelled => "CANCELLED",
            AuditError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            AuditError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }
}
