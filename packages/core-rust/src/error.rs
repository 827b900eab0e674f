//! Error taxonomy shared by every store and handler.

use std::fmt;

/// Stable outcome codes surfaced at the API boundary.
///
/// Every store failure resolves to exactly one of these, whichever backend
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed or missing required input. The caller must fix the request.
    InvalidArgument,
    /// No record exists at the requested key.
    NotFound,
    /// The key is already occupied on creation.
    AlreadyExists,
    /// Backend, encoding, or otherwise unclassified failure.
    Internal,
}

impl ErrorCode {
    /// Returns the `snake_case` name of the code, used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by a [`RecordStore`](crate::RecordStore) operation.
///
/// Backend-native error types never appear here: they are either classified
/// into one of the caller-fault variants or erased into [`StoreError::Internal`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: String },
    #[error("internal storage error: {0:#}")]
    Internal(anyhow::Error),
}

impl StoreError {
    /// Shorthand for [`StoreError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Wraps any backend failure as [`StoreError::Internal`].
    pub fn internal<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Internal(err.into())
    }

    /// Returns the taxonomy code of this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}
