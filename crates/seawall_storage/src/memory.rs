//! In-memory logfile store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::LogfileStore;
use parking_lot::{Mutex, RwLock};

/// An in-memory logfile store.
///
/// This store keeps all data in a zero-filled buffer and is suitable
/// for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral write-ahead logs that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Testing Hooks
///
/// `inject_sync_errors` makes the next N `sync_range` calls fail,
/// which is useful for exercising flush-retry paths. `synced_ranges`
/// records every successful sync, which lets tests assert that a byte
/// range is never flushed twice.
///
/// # Example
///
/// ```rust
/// use seawall_storage::{LogfileStore, InMemoryStore};
///
/// let store = InMemoryStore::new(32);
/// store.write_at(0, b"test data").unwrap();
/// assert_eq!(store.read_at(0, 9).unwrap(), b"test data");
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    data: RwLock<Vec<u8>>,
    sync_log: Mutex<SyncLog>,
}

#[derive(Debug, Default)]
struct SyncLog {
    ranges: Vec<(u64, u64)>,
    pending_errors: u32,
}

impl InMemoryStore {
    /// Creates a new zero-filled in-memory store of the given capacity.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            data: RwLock::new(vec![0u8; capacity as usize]),
            sync_log: Mutex::new(SyncLog::default()),
        }
    }

    /// Returns a copy of all data in the store.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Makes the next `count` calls to `sync_range` fail.
    ///
    /// Useful for testing flush-failure recovery scenarios.
    pub fn inject_sync_errors(&self, count: u32) {
        self.sync_log.lock().pending_errors = count;
    }

    /// Returns every range successfully synced so far, in call order.
    #[must_use]
    pub fn synced_ranges(&self) -> Vec<(u64, u64)> {
        self.sync_log.lock().ranges.clone()
    }
}

impl LogfileStore for InMemoryStore {
    fn capacity(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let mut buffer = self.data.write();
        let capacity = buffer.len() as u64;
        let end = offset.saturating_add(data.len() as u64);

        if end > capacity {
            return Err(StorageError::WriteOutOfBounds {
                offset,
                len: data.len(),
                capacity,
            });
        }

        let start = offset as usize;
        buffer[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let buffer = self.data.read();
        let capacity = buffer.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > capacity {
            return Err(StorageError::ReadOutOfBounds {
                offset,
                len,
                capacity,
            });
        }

        let start = offset as usize;
        Ok(buffer[start..start + len].to_vec())
    }

    fn sync_range(&self, start: u64, end: u64) -> StorageResult<()> {
        let capacity = self.data.read().len() as u64;
        if start > end || end > capacity {
            return Err(StorageError::SyncFailed(format!(
                "invalid sync range [{start}, {end}) for capacity {capacity}"
            )));
        }

        let mut log = self.sync_log.lock();
        if log.pending_errors > 0 {
            log.pending_errors -= 1;
            return Err(StorageError::SyncFailed(
                "injected sync failure".to_string(),
            ));
        }

        log.ranges.push((start, end));
        Ok(())
    }
}
