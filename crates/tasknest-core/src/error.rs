//! # Error Module
//!
//! The single error type returned by every engine operation.
//!
//! Variants map one-to-one onto the error codes the HTTP layer emits, so the
//! app crate never has to inspect message strings.

use crate::token::TokenError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A problem with one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name (`None` for errors that are not tied to a field).
    pub field: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl FieldError {
    /// Create an error for a named field.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Create an error that does not belong to a single field.
    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

/// Errors produced by the TaskNest engine.
#[derive(Debug, Error)]
pub enum NestError {
    /// Input failed validation. Carries every failing field.
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// The resource does not exist or is not visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// The resource already exists.
    #[error("{0}")]
    Conflict(String),

    /// Credentials were missing or wrong.
    #[error("{0}")]
    Unauthorized(String),

    /// A bearer or refresh token was rejected.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A record could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result alias for engine operations.
pub type NestResult<T> = Result<T, NestError>;

impl NestError {
    /// Build a single-field validation error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Whether the error was caused by the caller rather than the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Encoding(_))
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| match &e.field {
            Some(field) => format!("{}: {}", field, e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// STORAGE ERROR CONVERSIONS
// =============================================================================

impl From<redb::Error> for NestError {
    fn from(e: redb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::DatabaseError> for NestError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TransactionError> for NestError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TableError> for NestError {
    fn from(e: redb::TableError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for NestError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for NestError {
    fn from(e: redb::CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<postcard::Error> for NestError {
    fn from(e: postcard::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_fields() {
        let err = NestError::Validation(vec![
            FieldError::new("title", "Title cannot be empty"),
            FieldError::general("bad request"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: title: Title cannot be empty; bad request"
        );
    }

    #[test]
    fn storage_errors_are_server_side() {
        assert!(!NestError::Storage("disk".into()).is_client_error());
        assert!(NestError::NotFound("x".into()).is_client_error());
        assert!(NestError::Token(TokenError::Expired).is_client_error());
    }
}
