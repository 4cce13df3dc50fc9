use crate::data::SubjectId;
use thiserror::Error;

/// Failures surfaced by the survival engine.
///
/// Every variant is recoverable: callers may retry with more data, fall back
/// to a default churn probability, or schedule a retrain.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurvivalError {
    #[error("insufficient data to fit or evaluate the model: {reason}")]
    InsufficientData { reason: String },
    #[error("numerical failure: {reason}")]
    Numerical { reason: String },
    #[error("the model has not been trained")]
    ModelNotTrained,
    #[error("no cached survival curve and no features supplied for subject '{0}'")]
    SubjectNotFound(SubjectId),
    #[error("input sequences have mismatched lengths")]
    DimensionMismatch,
    #[error("field '{field}' contains a non-finite value")]
    NonFiniteInput { field: &'static str },
    #[error("invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl SurvivalError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        SurvivalError::InsufficientData {
            reason: reason.into(),
        }
    }

    pub(crate) fn numerical(reason: impl Into<String>) -> Self {
        SurvivalError::Numerical {
            reason: reason.into(),
        }
    }
}
