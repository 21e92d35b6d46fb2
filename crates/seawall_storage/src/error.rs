//! Error types for logfile store operations.

use std::io;
use thiserror::Error;

/// Result type for logfile store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during logfile store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to write beyond the store's fixed capacity.
    #[error("write beyond store capacity: offset {offset}, len {len}, capacity {capacity}")]
    WriteOutOfBounds {
        /// The requested write offset.
        offset: u64,
        /// The requested write length.
        len: usize,
        /// The store's fixed capacity.
        capacity: u64,
    },

    /// Attempted to read beyond the store's fixed capacity.
    #[error("read beyond store capacity: offset {offset}, len {len}, capacity {capacity}")]
    ReadOutOfBounds {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The store's fixed capacity.
        capacity: u64,
    },

    /// A range sync failed before reaching stable storage.
    #[error("sync failed: {0}")]
    SyncFailed(String),
}
