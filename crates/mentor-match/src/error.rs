use crate::allocation::engine::BatchError;
use crate::allocation::policy::PolicyError;
use std::fmt;

/// Top-level error for embedders that drive a whole allocation run.
#[derive(Debug)]
pub enum AppError {
    Policy(PolicyError),
    Batch(BatchError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Policy(err) => write!(f, "policy error: {}", err),
            AppError::Batch(err) => write!(f, "allocation error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Policy(err) => Some(err),
            AppError::Batch(err) => Some(err),
        }
    }
}

impl From<PolicyError> for AppError {
    fn from(value: PolicyError) -> Self {
        Self::Policy(value)
    }
}

impl From<BatchError> for AppError {
    fn from(value: BatchError) -> Self {
        Self::Batch(value)
    }
}
