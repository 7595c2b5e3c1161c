//! Custom error types for the common library
//!
//! This module defines the infrastructure error types shared by the
//! services: database access and distributed locking.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred while opening or finishing a transaction
    #[error("Database transaction error: {0}")]
    Transaction(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised by the Redis-backed distributed lock
#[derive(Error, Debug)]
pub enum LockError {
    /// Redis rejected or failed a lock command
    #[error("Lock backend error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The lock was still held by someone else when the wait budget ran out
    #[error("Timed out waiting for lock {key} after {waited_ms}ms")]
    Timeout { key: String, waited_ms: u64 },
}

/// Type alias for Result with LockError
pub type LockResult<T> = Result<T, LockError>;
