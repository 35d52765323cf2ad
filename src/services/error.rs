use thiserror::Error;

use crate::crypto::CryptoError;
use crate::db::repositories::RepoError;

/// Errors returned by the administration services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict {
        message: String,
        field: Option<String>,
    },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
            field: None,
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found("resource"),
            RepoError::Conflict { field } => Self::Conflict {
                message: format!("{field} already exists"),
                field: Some(field),
            },
            RepoError::InUse { by } => Self::conflict(format!("still in use by {by}")),
            RepoError::Unavailable(msg) => Self::Unavailable(msg),
            RepoError::Database(msg) => Self::Internal(msg),
        }
    }
}

impl From<CryptoError> for ServiceError {
    fn from(err: CryptoError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Names the missing resource when a repository reports `NotFound`.
pub trait NotFoundExt<T> {
    fn or_not_found(self, what: &str) -> Result<T, ServiceError>;
}

impl<T> NotFoundExt<T> for Result<T, RepoError> {
    fn or_not_found(self, what: &str) -> Result<T, ServiceError> {
        self.map_err(|err| match err {
            RepoError::NotFound => ServiceError::not_found(what),
            other => other.into(),
        })
    }
}
