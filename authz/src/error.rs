//! Error types for the authorization system.
//!
//! # Security Note
//! Error messages must balance providing useful information for debugging while
//! not leaking policy details to callers of the decision API. The decision
//! handler never returns these errors; it logs them and answers deny.

use hierarchy::HierarchyError;
use metadata::MetadataError;
use thiserror::Error;

/// Caller-facing classification of an [`AuthzError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed entity reference, missing field, invalid effect. Never retried.
    Validation,
    /// The rule already exists, or the role's source is read-only.
    Conflict,
    /// No matching rule or role metadata.
    NotFound,
    /// The store or the group directory failed. Eligible for retry.
    Unavailable,
    /// Domain-qualified hierarchy queries and other unsupported operations.
    Unsupported,
}

/// Errors that can occur during authorization operations.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A rule, assignment or reference failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The rule or assignment already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The referenced rule, assignment or role does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

impl AuthzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthzError::Validation(_) => ErrorKind::Validation,
            AuthzError::Conflict(_) => ErrorKind::Conflict,
            AuthzError::NotFound(_) => ErrorKind::NotFound,
            AuthzError::Metadata(err) => match err {
                MetadataError::SourceReadOnly { .. } | MetadataError::Conflict(_) => {
                    ErrorKind::Conflict
                }
                MetadataError::RoleNotFound(_) | MetadataError::RuleNotFound(_) => {
                    ErrorKind::NotFound
                }
                MetadataError::InvalidRecord(_) => ErrorKind::Validation,
                MetadataError::Database(_) => ErrorKind::Unavailable,
            },
            AuthzError::Hierarchy(err) => match err {
                HierarchyError::Unsupported(_) => ErrorKind::Unsupported,
                HierarchyError::Unavailable(_)
                | HierarchyError::Http(_)
                | HierarchyError::DepthExceeded { .. } => ErrorKind::Unavailable,
            },
        }
    }

    /// True for the read-only source refusal.
    pub fn is_source_read_only(&self) -> bool {
        matches!(
            self,
            AuthzError::Metadata(MetadataError::SourceReadOnly { .. })
        )
    }
}

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;
