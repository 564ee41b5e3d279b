//! Common error types for the Vocal GEM sync engine

use thiserror::Error;

/// Common result type for sync engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the store and the sync engine
#[derive(Error, Debug)]
pub enum Error {
    /// Local storage failure (wraps sqlx::Error)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key collision on a collection requiring unique keys
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Malformed snapshot, rejected before any mutation
    #[error("Malformed snapshot: {0}")]
    Format(String),

    /// Import failed partway through; collections imported before the
    /// failure remain overwritten
    #[error("Import failed at collection '{collection}': {reason}")]
    Import { collection: String, reason: String },

    /// Transport-level failure reaching the remote service
    #[error("Network error: {0}")]
    Network(String),

    /// Remote service answered with a non-success status
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// Requested collection or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller input (unknown mutation type, missing key, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}
