//! Error types for Seawall core.

use crate::types::LogfileId;
use std::io;
use thiserror::Error;

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur in Seawall WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// Logfile store error.
    #[error("storage error: {0}")]
    Storage(#[from] seawall_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A reservation could not be satisfied, even after rotation.
    ///
    /// The write was not accepted; the caller must not assume any bytes
    /// were logged.
    #[error("insufficient space for {requested} byte reservation: {message}")]
    InsufficientSpace {
        /// Size of the failed reservation.
        requested: u64,
        /// Why no space could be produced.
        message: String,
    },

    /// A logfile id did not resolve to a live logfile.
    ///
    /// When this surfaces inside the synchroniser it is a contract
    /// violation: the synchroniser never holds a region referencing a
    /// collected or removed logfile.
    #[error("logfile not found: {id}")]
    LogfileNotFound {
        /// The id that failed to resolve.
        id: LogfileId,
    },

    /// The WAL directory is locked by another process.
    #[error("WAL directory locked: another process has exclusive access")]
    DirectoryLocked,

    /// The manager has been closed.
    #[error("write-ahead log is closed")]
    Closed,

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl WalError {
    /// Creates an insufficient-space error.
    pub fn insufficient_space(requested: u64, message: impl Into<String>) -> Self {
        Self::InsufficientSpace {
            requested,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
