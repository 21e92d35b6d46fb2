//! Logfile lifecycle state machine.

use crate::error::{WalError, WalResult};
use crate::types::LogfileId;
use parking_lot::RwLock;
use seawall_storage::LogfileStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle state of a logfile.
///
/// States advance strictly forward:
///
/// ```text
/// Empty ─▶ Open ─▶ Full ─▶ Sealed ─▶ Collected ─▶ Removed
/// ```
///
/// - `Empty` → `Open` on the first slot reservation
/// - `Open` → `Full` when rotation retires the logfile from allocation
/// - `Full` → `Sealed` once every allocated slot has been synced
/// - `Sealed` → `Collected` → `Removed` are driven by the collection
///   subsystem and are only ever reached from `Sealed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogfileState {
    /// Created, no slot allocated yet.
    Empty,
    /// Accepting slot reservations.
    Open,
    /// Retired from allocation, may still hold unsynced slots.
    Full,
    /// Full and fully synced; eligible for collection.
    Sealed,
    /// Picked up by the collection subsystem.
    Collected,
    /// Gone; the backing file has been deleted.
    Removed,
}

impl LogfileState {
    /// Returns true if slots may still be reserved in this state.
    #[must_use]
    pub fn accepts_reservations(self) -> bool {
        matches!(self, Self::Empty | Self::Open)
    }

    /// Returns true if the logfile still resolves to a live store.
    ///
    /// Collected and Removed logfiles are no longer resolvable; a
    /// lookup for one is a contract violation on the caller's side.
    #[must_use]
    pub fn is_resolvable(self) -> bool {
        !matches!(self, Self::Collected | Self::Removed)
    }
}

impl std::fmt::Display for LogfileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Empty => "empty",
            Self::Open => "open",
            Self::Full => "full",
            Self::Sealed => "sealed",
            Self::Collected => "collected",
            Self::Removed => "removed",
        };
        write!(f, "{name}")
    }
}

/// A fixed-capacity, append-only logfile.
///
/// The logfile owns its backing [`LogfileStore`] and tracks its
/// lifecycle state and the high-water mark of allocated bytes. Byte
/// ranges inside the logfile are handed out by the slot allocator;
/// the logfile itself only enforces that `write_position` never
/// decreases and never exceeds `capacity`, and that no allocation
/// happens after the logfile left the `Empty`/`Open` states.
pub struct Logfile {
    /// Monotonically increasing, never-reused id.
    id: LogfileId,
    /// Fixed byte capacity, taken from the store.
    capacity: u64,
    /// Backing byte region.
    store: Arc<dyn LogfileStore>,
    /// Lifecycle state.
    state: RwLock<LogfileState>,
    /// Bytes allocated so far (monotonic, ≤ capacity).
    write_position: AtomicU64,
}

impl Logfile {
    /// Creates a fresh logfile in the `Empty` state.
    pub fn new(id: LogfileId, store: Arc<dyn LogfileStore>) -> Self {
        let capacity = store.capacity();
        Self {
            id,
            capacity,
            store,
            state: RwLock::new(LogfileState::Empty),
            write_position: AtomicU64::new(0),
        }
    }

    /// Registers a logfile recovered from a previous run.
    ///
    /// Historic logfiles are the durable output of an earlier process;
    /// they are never written again and enter the inventory `Sealed`,
    /// ready for the collection subsystem.
    pub fn recovered(id: LogfileId, store: Arc<dyn LogfileStore>) -> Self {
        let capacity = store.capacity();
        Self {
            id,
            capacity,
            store,
            state: RwLock::new(LogfileState::Sealed),
            write_position: AtomicU64::new(capacity),
        }
    }

    /// Returns the logfile id.
    #[must_use]
    pub fn id(&self) -> LogfileId {
        self.id
    }

    /// Returns the fixed capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the backing store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn LogfileStore> {
        Arc::clone(&self.store)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LogfileState {
        *self.state.read()
    }

    /// Returns the number of bytes allocated so far.
    #[must_use]
    pub fn write_position(&self) -> u64 {
        self.write_position.load(Ordering::Acquire)
    }

    /// Returns the number of unallocated bytes remaining.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.capacity - self.write_position()
    }

    /// Advances the write position by `size` bytes, returning the
    /// offset of the allocated range.
    ///
    /// Returns `None` if the logfile no longer accepts reservations or
    /// lacks the room, in which case the caller rotates to a new
    /// logfile. Must only be called while holding the allocation lock;
    /// the state check and the position advance are not atomic on
    /// their own.
    pub(crate) fn allocate(&self, size: u64) -> Option<u64> {
        let mut state = self.state.write();
        if !state.accepts_reservations() {
            return None;
        }

        let offset = self.write_position.load(Ordering::Acquire);
        if offset + size > self.capacity {
            return None;
        }

        if *state == LogfileState::Empty {
            *state = LogfileState::Open;
        }
        self.write_position.store(offset + size, Ordering::Release);

        Some(offset)
    }

    /// Retires the logfile from allocation: `Open` → `Full`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the logfile is not `Open`.
    pub(crate) fn set_full(&self) -> WalResult<()> {
        self.transition(LogfileState::Open, LogfileState::Full)
    }

    /// Marks the logfile durable: `Full` → `Sealed`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the logfile is not `Full`.
    pub(crate) fn seal(&self) -> WalResult<()> {
        self.transition(LogfileState::Full, LogfileState::Sealed)
    }

    /// Hands the logfile to the collection subsystem: `Sealed` → `Collected`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the logfile is not `Sealed`.
    pub(crate) fn collect(&self) -> WalResult<()> {
        self.transition(LogfileState::Sealed, LogfileState::Collected)
    }

    /// Final transition before deletion: `Collected` → `Removed`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the logfile is not `Collected`.
    pub(crate) fn remove(&self) -> WalResult<()> {
        self.transition(LogfileState::Collected, LogfileState::Removed)
    }

    fn transition(&self, from: LogfileState, to: LogfileState) -> WalResult<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(WalError::invalid_operation(format!(
                "{}: cannot transition from {} to {to}",
                self.id, *state
            )));
        }
        *state = to;
        Ok(())
    }
}

impl std::fmt::Debug for Logfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logfile")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .field("write_position", &self.write_position())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seawall_storage::InMemoryStore;

    fn create_logfile(capacity: u64) -> Logfile {
        Logfile::new(LogfileId::new(1), Arc::new(InMemoryStore::new(capacity)))
    }

    #[test]
    fn new_logfile_is_empty() {
        let logfile = create_logfile(128);
        assert_eq!(logfile.state(), LogfileState::Empty);
        assert_eq!(logfile.write_position(), 0);
        assert_eq!(logfile.remaining(), 128);
    }

    #[test]
    fn first_allocation_opens() {
        let logfile = create_logfile(128);

        let offset = logfile.allocate(32).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(logfile.state(), LogfileState::Open);
        assert_eq!(logfile.write_position(), 32);
    }

    #[test]
    fn allocations_are_monotonic() {
        let logfile = create_logfile(128);

        assert_eq!(logfile.allocate(10), Some(0));
        assert_eq!(logfile.allocate(20), Some(10));
        assert_eq!(logfile.allocate(30), Some(30));
        assert_eq!(logfile.write_position(), 60);
    }

    #[test]
    fn allocation_beyond_capacity_fails() {
        let logfile = create_logfile(100);

        assert_eq!(logfile.allocate(80), Some(0));
        assert_eq!(logfile.allocate(30), None);
        // Smaller request still fits.
        assert_eq!(logfile.allocate(20), Some(80));
        assert_eq!(logfile.remaining(), 0);
    }

    #[test]
    fn full_logfile_rejects_allocation() {
        let logfile = create_logfile(100);
        logfile.allocate(10).unwrap();
        logfile.set_full().unwrap();

        assert_eq!(logfile.allocate(10), None);
        assert_eq!(logfile.state(), LogfileState::Full);
    }

    #[test]
    fn lifecycle_happy_path() {
        let logfile = create_logfile(100);

        logfile.allocate(10).unwrap();
        logfile.set_full().unwrap();
        logfile.seal().unwrap();
        logfile.collect().unwrap();
        logfile.remove().unwrap();

        assert_eq!(logfile.state(), LogfileState::Removed);
    }

    #[test]
    fn illegal_transitions_rejected() {
        let logfile = create_logfile(100);

        // Empty logfile cannot seal or collect.
        assert!(logfile.seal().is_err());
        assert!(logfile.collect().is_err());

        logfile.allocate(10).unwrap();
        // Open logfile cannot seal before it is full.
        assert!(logfile.seal().is_err());

        logfile.set_full().unwrap();
        // Full logfile cannot be collected before sealing.
        assert!(logfile.collect().is_err());
        assert!(logfile.remove().is_err());
    }

    #[test]
    fn sealed_logfile_rejects_allocation() {
        let logfile = create_logfile(100);
        logfile.allocate(10).unwrap();
        logfile.set_full().unwrap();
        logfile.seal().unwrap();

        assert_eq!(logfile.allocate(1), None);
    }

    #[test]
    fn recovered_logfile_is_sealed() {
        let store = Arc::new(InMemoryStore::new(64));
        let logfile = Logfile::recovered(LogfileId::new(3), store);

        assert_eq!(logfile.state(), LogfileState::Sealed);
        assert_eq!(logfile.write_position(), 64);
        assert_eq!(logfile.allocate(1), None);
    }

    #[test]
    fn state_display() {
        assert_eq!(format!("{}", LogfileState::Empty), "empty");
        assert_eq!(format!("{}", LogfileState::Sealed), "sealed");
    }

    #[test]
    fn resolvability() {
        assert!(LogfileState::Open.is_resolvable());
        assert!(LogfileState::Sealed.is_resolvable());
        assert!(!LogfileState::Collected.is_resolvable());
        assert!(!LogfileState::Removed.is_resolvable());
    }
}
