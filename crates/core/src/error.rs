use serde::Serialize;

use crate::content::ContentViolation;
use crate::types::DbId;

/// Coarse classification shared by every domain error in the crate.
///
/// The HTTP layer maps kinds to status codes; the core never deals in
/// transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Unauthorized,
    Forbidden,
    Unavailable,
    Timeout,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Entity not found: {entity} with key '{key}'")]
    NotFoundByKey { entity: &'static str, key: String },

    /// Every code a render needs but nothing can resolve, reported together.
    #[error("Missing injectables: {}", .0.join(", "))]
    MissingInjectables(Vec<String>),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid template content ({} violation(s))", .0.len())]
    InvalidContent(Vec<ContentViolation>),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The error kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::NotFoundByKey { .. } | Self::MissingInjectables(_) => {
                ErrorKind::NotFound
            }
            Self::Validation(_) | Self::InvalidContent(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Rebuild a `CoreError` of the given kind around a message.
    ///
    /// Used by the `From` conversions of the domain error enums so their
    /// display text survives the trip into the crate-wide type.
    pub fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotFound => Self::NotFoundByKey {
                entity: "Resource",
                key: message,
            },
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::Unauthorized => Self::Unauthorized(message),
            ErrorKind::Forbidden => Self::Forbidden(message),
            ErrorKind::Unavailable => Self::Unavailable(message),
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::Internal => Self::Internal(message),
        }
    }
}
