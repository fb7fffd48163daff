//! Error kinds surfaced by the friendship and identity-change workflows.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    Forbidden,
    Invalid,
    Expired,
    LockedOut,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Expired => "expired",
            ErrorKind::LockedOut => "locked_out",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Duplicate record or a transition out of a state that no longer allows it.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The actor lacks the required relation to the record.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("expired: {0}")]
    Expired(String),

    #[error("locked out: {0}")]
    LockedOut(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        ServiceError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ServiceError::Forbidden(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ServiceError::Invalid(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::Invalid(_) => ErrorKind::Invalid,
            ServiceError::Expired(_) => ErrorKind::Expired,
            ServiceError::LockedOut(_) => ErrorKind::LockedOut,
            ServiceError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            ServiceError::Conflict(m)
            | ServiceError::NotFound(m)
            | ServiceError::Forbidden(m)
            | ServiceError::Invalid(m)
            | ServiceError::Expired(m)
            | ServiceError::LockedOut(m) => m.clone(),
            ServiceError::Database(_) => "internal error".to_string(),
        }
    }
}

/// Maps a unique-index violation to `Conflict`, passing other errors through.
pub fn conflict_on_unique(err: sqlx::Error, msg: &str) -> ServiceError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ServiceError::conflict(msg),
        _ => ServiceError::Database(err),
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
