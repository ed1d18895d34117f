//! Store Error Types
//!
//! Errors raised by `DataStore` implementations. The service layer wraps
//! these in `ServiceError`; the resource layer turns them into transient
//! notices, so nothing here is ever allowed to reach a renderer.

use std::path::PathBuf;
use thiserror::Error;

/// Backing store errors
///
/// Authorization failures are kept distinct for logging, but callers are
/// expected to surface them exactly like connectivity failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store unreachable or the operation failed server-side
    #[error("Store operation failed: {0}")]
    Backend(String),

    /// Row-level access policy rejected the operation
    #[error("Operation rejected by access policy on {table}")]
    Unauthorized { table: String },

    /// A record could not be converted to or from its JSON row shape
    #[error("Record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller supplied an argument the store cannot act on
    #[error("Invalid store request: {0}")]
    InvalidRequest(String),

    /// Failed to open the embedded database
    #[error("Failed to open database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to create the database directory
    #[error("Failed to create database directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    Database(#[from] libsql::Error),
}

impl StoreError {
    /// Create a backend failure error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create an access policy rejection
    pub fn unauthorized(table: impl Into<String>) -> Self {
        Self::Unauthorized {
            table: table.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }
}
