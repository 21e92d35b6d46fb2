//! WAL directory management.
//!
//! This module handles the file system layout for a Seawall WAL:
//!
//! ```text
//! <wal_path>/
//! ├─ LOCK              # Advisory lock for single-process ownership
//! ├─ logfile-000001.db # Fixed-capacity logfiles, one per id
//! ├─ logfile-000002.db
//! └─ ...
//! ```
//!
//! The LOCK file ensures only one process can own the WAL directory at
//! a time. Logfile files are named after their id and never renamed;
//! the id sequence is recovered at startup by scanning the directory.

use crate::error::{WalError, WalResult};
use crate::types::LogfileId;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// File names within the WAL directory.
const LOCK_FILE: &str = "LOCK";
/// Prefix of logfile file names.
const LOGFILE_PREFIX: &str = "logfile-";
/// Extension of logfile file names.
const LOGFILE_EXTENSION: &str = "db";

/// Manages the WAL directory structure and file locking.
///
/// # Thread Safety
///
/// The `WalDir` holds an exclusive lock on the WAL directory. Only one
/// `WalDir` instance can exist per directory at a time.
#[derive(Debug)]
pub struct WalDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl WalDir {
    /// Opens or creates a WAL directory.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the WAL directory
    /// * `create_if_missing` - If true, creates the directory if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `DirectoryLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> WalResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(WalError::invalid_operation(format!(
                    "WAL directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(WalError::invalid_operation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        // Try to acquire exclusive lock (non-blocking)
        if lock_file.try_lock_exclusive().is_err() {
            return Err(WalError::DirectoryLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the WAL directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the logfile with the given id.
    ///
    /// Ids produce stable names like `logfile-000001.db`.
    #[must_use]
    pub fn logfile_path(&self, id: LogfileId) -> PathBuf {
        self.path
            .join(format!("{LOGFILE_PREFIX}{:06}.{LOGFILE_EXTENSION}", id.as_u64()))
    }

    /// Scans the directory and returns all logfile ids, ascending.
    ///
    /// Non-logfile files (including LOCK) are silently ignored.
    pub fn list_logfiles(&self) -> WalResult<Vec<LogfileId>> {
        let mut ids = Vec::new();

        for dir_entry in fs::read_dir(&self.path)? {
            let dir_entry = dir_entry?;
            let file_name = dir_entry.file_name();
            let name = file_name.to_string_lossy();

            if let Some(id) = parse_logfile_filename(&name) {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Deletes the file backing a removed logfile.
    ///
    /// After deletion the directory is fsynced so the removal is
    /// crash-safe.
    pub fn delete_logfile_file(&self, id: LogfileId) -> WalResult<()> {
        let path = self.logfile_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
            self.sync_directory()?;
        }
        Ok(())
    }

    /// Syncs the WAL directory so metadata updates are durable.
    ///
    /// After creating or deleting a logfile, the directory must be
    /// fsynced to ensure the entry is on disk.
    ///
    /// On Windows, directory fsync is not supported in the same way as
    /// Unix. NTFS journaling provides similar durability guarantees for
    /// metadata operations, so the explicit fsync is skipped there.
    #[cfg(unix)]
    pub fn sync_directory(&self) -> WalResult<()> {
        let dir = File::open(&self.path)?;
        // On Unix, fsync on a directory syncs the directory entries
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn sync_directory(&self) -> WalResult<()> {
        // Windows NTFS journal provides metadata durability guarantees
        Ok(())
    }
}

/// Parses a logfile id from a file name like `logfile-000042.db`.
///
/// Returns `None` if the name does not match the expected pattern.
fn parse_logfile_filename(name: &str) -> Option<LogfileId> {
    let stripped = name.strip_prefix(LOGFILE_PREFIX)?;
    let num_str = stripped.strip_suffix(&format!(".{LOGFILE_EXTENSION}"))?;
    let id = num_str.parse::<u64>().ok()?;
    if id == 0 {
        return None;
    }
    Some(LogfileId::new(id))
}
