//! Error types for the Stockpile engine.

use crate::{repository::RepositoryError, ConflictId, ConflictType, EntityType};
use serde::Serialize;
use thiserror::Error;

/// All possible errors from the Stockpile engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("custom resolution is missing conflicting fields: {}", .missing.join(", "))]
    NonExhaustiveCustomResolution { missing: Vec<String> },

    #[error("field-level merge is not possible for a {0} conflict")]
    FieldMergeUnsupported(ConflictType),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("unsupported entity type: {0}")]
    UnsupportedEntityType(EntityType),

    // Lifecycle errors
    #[error("conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    #[error("conflict already resolved: {0}")]
    AlreadyResolved(ConflictId),

    // Collaborator errors
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("detection failed: {0}")]
    Detection(String),
}

/// Coarse grouping of [`Error`] variants, used by callers to decide on retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Validation,
    AlreadyResolved,
    NotFound,
    Persistence,
    Detection,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::TypeMismatch { .. }
            | Error::NonExhaustiveCustomResolution { .. }
            | Error::FieldMergeUnsupported(_)
            | Error::MissingRequiredField(_)
            | Error::InvalidPayload(_)
            | Error::InvalidSnapshot(_)
            | Error::UnsupportedEntityType(_) => ErrorCategory::Validation,
            Error::ConflictNotFound(_) => ErrorCategory::NotFound,
            Error::AlreadyResolved(_) => ErrorCategory::AlreadyResolved,
            Error::Persistence(_) => ErrorCategory::Persistence,
            Error::Detection(_) => ErrorCategory::Detection,
        }
    }

    /// Whether calling again (with the same or another resolution) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Persistence | ErrorCategory::Detection
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
