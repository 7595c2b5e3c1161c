//! Error types for identity resolution

use common::error::{DatabaseError, LockError};
use thiserror::Error;

/// Errors surfaced by the identity resolver and its collaborators
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Malformed composite credential or unknown app id
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// No matching account, wrong password, or missing provider link
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[source] anyhow::Error),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Writes in a transaction collided with rows committed meanwhile
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store backend failed outside the database driver
    #[error("Store error: {0}")]
    Store(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),
}

impl From<sqlx::Error> for IdentityError {
    fn from(e: sqlx::Error) -> Self {
        IdentityError::Database(DatabaseError::Query(e))
    }
}

impl IdentityError {
    /// Whether the error is a caller-facing authentication failure rather
    /// than an infrastructure fault
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            IdentityError::InvalidCredential(_) | IdentityError::UserNotFound(_)
        )
    }
}

/// Type alias for identity results
pub type IdentityResult<T> = Result<T, IdentityError>;
