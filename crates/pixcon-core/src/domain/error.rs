//! Fatal error taxonomy for a comparison run.
//!
//! Only [`CompareError::UnreadableImage`] and [`CompareError::NoBackendsAvailable`]
//! are expected in normal operation. Per-backend problems never surface here;
//! they are recorded as [`BackendFailure`](super::metric::BackendFailure) values
//! inside the affected `MetricRecord`.

use super::backend::BackendKind;

/// Which side of a comparison an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSide {
    Reference,
    Candidate,
}

impl std::fmt::Display for TargetSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetSide::Reference => write!(f, "reference"),
            TargetSide::Candidate => write!(f, "candidate"),
        }
    }
}

/// Comparison engine errors.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("unreadable {side} image '{source_label}': {reason}")]
    UnreadableImage {
        side: TargetSide,
        source_label: String,
        reason: String,
    },

    #[error("no comparison backend produced a result ({attempted} attempted)")]
    NoBackendsAvailable { attempted: usize },

    #[error("duplicate result for backend {0}")]
    DuplicateBackend(BackendKind),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("comparison cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for comparison engine operations.
pub type Result<T> = std::result::Result<T, CompareError>;
