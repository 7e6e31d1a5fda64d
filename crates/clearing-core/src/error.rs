use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure classes an obligation can end in.
///
/// Only `Validation` and `Clearing` ever mark a submission as failed. The remaining
/// classes describe degradations that are reported alongside a successful result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Validation,
    Clearing,
    Honoring,
    Mirror,
    BatchItem,
}

impl FailureClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Clearing => "clearing",
            Self::Honoring => "honoring",
            Self::Mirror => "mirror",
            Self::BatchItem => "batch_item",
        }
    }

    /// Whether this class fails the submission it occurred in.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Validation | Self::Clearing | Self::BatchItem)
    }
}

/// Obligation core errors.
#[derive(Debug, Error)]
pub enum ObligationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("fee calculation failed: {0}")]
    FeeCalculation(String),

    #[error("clearing failed: {0}")]
    Clearing(String),

    #[error("honoring failed: {0}")]
    Honoring(String),

    #[error("narrative mirror write failed: {0}")]
    Mirror(String),

    #[error("batch of {size} obligations exceeds limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("batch contains no obligations")]
    EmptyBatch,

    #[error("original obligation '{0}' could not be resolved")]
    OriginalNotFound(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl ObligationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn stage_violation(expected: &str, actual: &str) -> Self {
        Self::InvariantViolation(format!(
            "stage order violation: expected '{}', got '{}'",
            expected, actual
        ))
    }

    /// Maps the error onto the failure taxonomy.
    ///
    /// Fee calculation errors count as validation: the submission is aborted before
    /// anything reaches the clearing authority.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Validation(_)
            | Self::FeeCalculation(_)
            | Self::BatchTooLarge { .. }
            | Self::EmptyBatch
            | Self::OriginalNotFound(_)
            | Self::InvariantViolation(_) => FailureClass::Validation,
            Self::Clearing(_) => FailureClass::Clearing,
            Self::Honoring(_) => FailureClass::Honoring,
            Self::Mirror(_) => FailureClass::Mirror,
        }
    }
}

/// Errors returned by external collaborators (authority, honoring, mirror, fees).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Ineligible(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
