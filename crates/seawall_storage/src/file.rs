//! File-based logfile store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::LogfileStore;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based logfile store.
///
/// The backing file is preallocated to its full capacity at creation
/// time, so reservations made against the logfile never require the
/// file to grow and a crash cannot leave a short file behind.
///
/// # Durability
///
/// - `sync_range()` calls `File::sync_data()`, which flushes the whole
///   file contents; flushing a superset of the requested range is
///   permitted by the [`LogfileStore`] contract
///
/// # Thread Safety
///
/// The store is thread-safe. Positional writes seek under an internal
/// lock; callers writing to disjoint ranges never observe each other's
/// data.
///
/// # Example
///
/// ```no_run
/// use seawall_storage::{LogfileStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::create(Path::new("logfile-000001.db"), 1024).unwrap();
/// store.write_at(0, b"durable bytes").unwrap();
/// store.sync_range(0, 13).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: Mutex<File>,
    capacity: u64,
}

impl FileStore {
    /// Creates a new logfile store, preallocated to `capacity` bytes.
    ///
    /// Fails if a file already exists at `path` - logfile ids are never
    /// reused, so an existing file indicates a bookkeeping error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists, cannot be created, or cannot
    /// be preallocated.
    pub fn create(path: &Path, capacity: u64) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        file.allocate(capacity)?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            capacity,
        })
    }

    /// Opens an existing logfile store.
    ///
    /// The capacity is taken from the file's current size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let capacity = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            capacity,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogfileStore for FileStore {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let end = offset.saturating_add(data.len() as u64);
        if end > self.capacity {
            return Err(StorageError::WriteOutOfBounds {
                offset,
                len: data.len(),
                capacity: self.capacity,
            });
        }

        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        Ok(())
    }

    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.capacity {
            return Err(StorageError::ReadOutOfBounds {
                offset,
                len,
                capacity: self.capacity,
            });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn sync_range(&self, start: u64, end: u64) -> StorageResult<()> {
        if start > end || end > self.capacity {
            return Err(StorageError::SyncFailed(format!(
                "invalid sync range [{start}, {end}) for capacity {}",
                self.capacity
            )));
        }

        let file = self.file.lock();
        file.sync_data()?;
        Ok(())
    }
}
