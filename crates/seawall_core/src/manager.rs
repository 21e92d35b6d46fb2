//! Logfile ownership, rotation, and sealing.

use crate::config::WalConfig;
use crate::dir::WalDir;
use crate::error::{WalError, WalResult};
use crate::logfile::{Logfile, LogfileState};
use crate::slots::{Slot, Slots};
use crate::stats::WalStats;
use crate::synchroniser::{self, Synchroniser};
use crate::types::LogfileId;
use parking_lot::{Mutex, RwLock};
use seawall_storage::{FileStore, InMemoryStore, LogfileStore};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Backs new logfiles with stores.
enum StoreProvider {
    /// Preallocated files in a locked WAL directory.
    Directory(WalDir),
    /// In-memory stores for ephemeral WALs.
    Memory,
    /// Caller-supplied stores, for exercising failure paths.
    #[cfg(test)]
    Custom(Box<dyn Fn(LogfileId, u64) -> WalResult<Arc<dyn LogfileStore>> + Send + Sync>),
}

impl StoreProvider {
    /// Creates the store backing a new logfile.
    fn create(&self, config: &WalConfig, id: LogfileId) -> WalResult<Arc<dyn LogfileStore>> {
        match self {
            Self::Directory(dir) => {
                let store = FileStore::create(&dir.logfile_path(id), config.logfile_capacity)?;
                // Make the new directory entry itself durable.
                dir.sync_directory()?;
                Ok(Arc::new(store))
            }
            Self::Memory => Ok(Arc::new(InMemoryStore::new(config.logfile_capacity))),
            #[cfg(test)]
            Self::Custom(factory) => factory(id, config.logfile_capacity),
        }
    }

    /// The locked WAL directory, if this provider has one.
    fn dir(&self) -> Option<&WalDir> {
        match self {
            Self::Directory(dir) => Some(dir),
            _ => None,
        }
    }
}

/// The set of logfiles owned by a manager.
struct Inventory {
    /// All live logfiles by id. Doubles as the descriptor cache: a
    /// resolvable id maps straight to its open store handle.
    logfiles: BTreeMap<LogfileId, Arc<Logfile>>,
    /// The logfile currently accepting reservations.
    active: Arc<Logfile>,
    /// Next id to hand out; ids are never reused.
    next_id: LogfileId,
}

/// Owns the write-ahead log: all logfiles, the slot allocator, and the
/// synchroniser thread.
///
/// The manager is explicit process-scoped state: create it at startup
/// with [`LogfileManager::open`] (or [`LogfileManager::open_in_memory`]
/// for tests), share it by `Arc`, and call [`LogfileManager::close`] at
/// shutdown to drain the synchroniser.
///
/// # Writing durably
///
/// ```rust,ignore
/// let wal = LogfileManager::open(Path::new("wal"), WalConfig::default())?;
///
/// let slot = wal.reserve(payload.len() as u64)?;
/// wal.write(&slot, &payload)?;
/// wal.mark_used(slot)?;
/// wal.signal_sync();
/// // ... the synchroniser flushes the bytes and seals full logfiles.
///
/// wal.close()?;
/// ```
pub struct LogfileManager {
    /// Configuration.
    config: WalConfig,
    /// Store factory; holds the directory lock for on-disk WALs.
    provider: StoreProvider,
    /// Logfile inventory.
    inner: RwLock<Inventory>,
    /// Slot allocator shared by writers and the synchroniser.
    slots: Slots,
    /// Serializes reservation and rotation.
    allocation: Mutex<()>,
    /// Synchroniser wakeup plumbing.
    synchroniser: Synchroniser,
    /// The synchroniser thread, joined on close.
    sync_thread: Mutex<Option<JoinHandle<()>>>,
    /// Counters.
    stats: WalStats,
    /// Set once `close` has begun; new reservations are refused.
    closed: AtomicBool,
}

impl LogfileManager {
    /// Opens a write-ahead log in the given directory.
    ///
    /// Acquires an exclusive lock on the directory, registers logfiles
    /// left behind by a previous run as sealed history, creates a fresh
    /// active logfile, and starts the synchroniser.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the directory lock (`DirectoryLocked`)
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - I/O errors occur
    pub fn open(path: &Path, config: WalConfig) -> WalResult<Arc<Self>> {
        let dir = WalDir::open(path, config.create_if_missing)?;

        let mut logfiles = BTreeMap::new();
        let mut next_id = LogfileId::new(1);

        // Logfiles from a previous run are durable history: sealed,
        // never written again, and waiting for collection.
        for id in dir.list_logfiles()? {
            let store: Arc<dyn LogfileStore> = Arc::new(FileStore::open(&dir.logfile_path(id))?);
            logfiles.insert(id, Arc::new(Logfile::recovered(id, store)));
            next_id = id.next();
        }

        Self::start(config, StoreProvider::Directory(dir), logfiles, next_id)
    }

    /// Opens an ephemeral write-ahead log backed by in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the synchroniser thread cannot be spawned.
    pub fn open_in_memory(config: WalConfig) -> WalResult<Arc<Self>> {
        Self::start(
            config,
            StoreProvider::Memory,
            BTreeMap::new(),
            LogfileId::new(1),
        )
    }

    /// Opens a WAL over caller-supplied stores.
    #[cfg(test)]
    pub(crate) fn open_with_stores(
        config: WalConfig,
        factory: impl Fn(LogfileId, u64) -> WalResult<Arc<dyn LogfileStore>> + Send + Sync + 'static,
    ) -> WalResult<Arc<Self>> {
        Self::start(
            config,
            StoreProvider::Custom(Box::new(factory)),
            BTreeMap::new(),
            LogfileId::new(1),
        )
    }

    fn start(
        config: WalConfig,
        provider: StoreProvider,
        mut logfiles: BTreeMap<LogfileId, Arc<Logfile>>,
        next_id: LogfileId,
    ) -> WalResult<Arc<Self>> {
        let slots = Slots::new();

        let store = provider.create(&config, next_id)?;
        let active = Arc::new(Logfile::new(next_id, store));
        slots.register(next_id);
        logfiles.insert(next_id, Arc::clone(&active));
        debug!(logfile = %next_id, "created active logfile");

        let manager = Arc::new(Self {
            config,
            provider,
            inner: RwLock::new(Inventory {
                logfiles,
                active,
                next_id: next_id.next(),
            }),
            slots,
            allocation: Mutex::new(()),
            synchroniser: Synchroniser::default(),
            sync_thread: Mutex::new(None),
            stats: WalStats::new(),
            closed: AtomicBool::new(false),
        });

        let worker = Arc::clone(&manager);
        let handle = thread::Builder::new()
            .name("wal-synchroniser".to_string())
            .spawn(move || synchroniser::run(worker))?;
        *manager.sync_thread.lock() = Some(handle);

        Ok(manager)
    }

    /// Reserves `size` bytes in the active logfile.
    ///
    /// If the active logfile lacks the room, a new logfile is rotated
    /// in, the outgoing one is retired (`Full`) with the synchroniser
    /// signalled to drain it, and the reservation is retried once
    /// against the fresh logfile.
    ///
    /// # Errors
    ///
    /// - `Closed` after `close` has begun
    /// - `InsufficientSpace` if `size` exceeds the per-logfile capacity
    ///   or rotation cannot produce a new logfile; the write was not
    ///   accepted, no bytes were logged, and the active logfile stays
    ///   open so a later retry gets the same answer
    pub fn reserve(&self, size: u64) -> WalResult<Slot> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WalError::Closed);
        }
        if size > self.config.logfile_capacity {
            return Err(WalError::insufficient_space(
                size,
                format!("exceeds logfile capacity {}", self.config.logfile_capacity),
            ));
        }

        let _allocation = self.allocation.lock();

        let active = Arc::clone(&self.inner.read().active);
        if let Some(slot) = self.slots.reserve_in(&active, size) {
            self.stats.record_reservation(size);
            return Ok(slot);
        }

        // The active logfile is out of room: rotate, then retire it.
        // Rotating first means a failed rotation leaves the logfile
        // open, so a later retry reaches this same path again instead
        // of tripping over a half-retired logfile.
        let rotated = self.rotate().map_err(|err| {
            WalError::insufficient_space(size, format!("rotation failed: {err}"))
        })?;

        // The synchroniser drains and eventually seals the retired
        // logfile.
        active.set_full()?;
        self.synchroniser.signal();

        match self.slots.reserve_in(&rotated, size) {
            Some(slot) => {
                self.stats.record_reservation(size);
                Ok(slot)
            }
            None => Err(WalError::insufficient_space(
                size,
                "freshly rotated logfile rejected reservation",
            )),
        }
    }

    /// Copies a writer's payload into its reserved slot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `data` does not fill the slot
    /// exactly; partially filled slots would leave undefined bytes in
    /// the flushed range.
    pub fn write(&self, slot: &Slot, data: &[u8]) -> WalResult<()> {
        if data.len() as u64 != slot.length() {
            return Err(WalError::invalid_operation(format!(
                "payload of {} bytes does not fill {}-byte slot",
                data.len(),
                slot.length()
            )));
        }

        let logfile = self.logfile(slot.logfile_id())?;
        logfile.store().write_at(slot.offset(), data)?;
        Ok(())
    }

    /// Publishes a slot to the synchroniser: `Reserved` → `Used`.
    ///
    /// Call only after the payload copy has completed. Consumes the
    /// handle; the slot's durability is from here on the synchroniser's
    /// responsibility.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the slot is unknown or was already
    /// marked.
    pub fn mark_used(&self, slot: Slot) -> WalResult<()> {
        self.slots.mark_used(&slot)
    }

    /// Signals the synchroniser that unsynced data is pending.
    ///
    /// Non-blocking; duplicate signals are cheap.
    pub fn signal_sync(&self) {
        self.synchroniser.signal();
    }

    /// Reserves, writes, and publishes `data` in one call, then
    /// signals the synchroniser.
    ///
    /// Convenience wrapper over the four-step writer contract.
    ///
    /// # Errors
    ///
    /// Propagates any error from the underlying steps.
    pub fn append(&self, data: &[u8]) -> WalResult<Slot> {
        let slot = self.reserve(data.len() as u64)?;
        self.write(&slot, data)?;
        self.mark_used(slot.clone())?;
        self.signal_sync();
        Ok(slot)
    }

    /// Seals every logfile that is full and fully synced.
    ///
    /// Scans in ascending id order and stops at the first logfile that
    /// cannot seal yet: a later logfile is never sealed while an
    /// earlier one still has pending data, because collection assumes
    /// sealing happens in id order.
    ///
    /// Returns the number of logfiles sealed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if a lifecycle transition is refused,
    /// which indicates corrupted bookkeeping.
    pub fn seal_logfiles(&self) -> WalResult<usize> {
        let inner = self.inner.read();
        let mut sealed = 0;

        for (id, logfile) in &inner.logfiles {
            match logfile.state() {
                // Already durable; keep scanning forward.
                LogfileState::Sealed | LogfileState::Collected | LogfileState::Removed => {}
                LogfileState::Full => {
                    if !self.slots.is_drained(*id) {
                        break;
                    }
                    match logfile.seal() {
                        Ok(()) => {
                            self.slots.drop_ledger(*id);
                            self.stats.record_seal();
                            debug!(logfile = %id, "sealed logfile");
                            sealed += 1;
                        }
                        // A concurrent caller won the race; the logfile
                        // is sealed either way.
                        Err(_) if logfile.state() == LogfileState::Sealed => {}
                        Err(err) => return Err(err),
                    }
                }
                // The active logfile; nothing later can seal first.
                LogfileState::Empty | LogfileState::Open => break,
            }
        }

        Ok(sealed)
    }

    /// Resolves a logfile id to its live logfile.
    ///
    /// The inventory map doubles as the descriptor cache; the returned
    /// logfile hands out the open store.
    ///
    /// # Errors
    ///
    /// Returns `LogfileNotFound` for ids that are absent, collected, or
    /// removed. When the synchroniser hits this for a region it holds,
    /// the durability contract is broken and the process aborts.
    pub fn logfile(&self, id: LogfileId) -> WalResult<Arc<Logfile>> {
        let inner = self.inner.read();
        match inner.logfiles.get(&id) {
            Some(logfile) if logfile.state().is_resolvable() => Ok(Arc::clone(logfile)),
            _ => Err(WalError::LogfileNotFound { id }),
        }
    }

    /// Hands a sealed logfile to the collection subsystem.
    ///
    /// # Errors
    ///
    /// Returns `LogfileNotFound` for unknown ids and `InvalidOperation`
    /// if the logfile is not sealed - collection must never observe a
    /// logfile in any earlier state.
    pub fn collect_logfile(&self, id: LogfileId) -> WalResult<()> {
        let logfile = {
            let inner = self.inner.read();
            inner
                .logfiles
                .get(&id)
                .cloned()
                .ok_or(WalError::LogfileNotFound { id })?
        };
        logfile.collect()?;
        debug!(logfile = %id, "logfile collected");
        Ok(())
    }

    /// Removes a collected logfile and deletes its backing file.
    ///
    /// # Errors
    ///
    /// Returns `LogfileNotFound` for unknown ids and `InvalidOperation`
    /// if the logfile was not collected first.
    pub fn remove_logfile(&self, id: LogfileId) -> WalResult<()> {
        let logfile = {
            let inner = self.inner.read();
            inner
                .logfiles
                .get(&id)
                .cloned()
                .ok_or(WalError::LogfileNotFound { id })?
        };
        logfile.remove()?;

        self.inner.write().logfiles.remove(&id);
        if let Some(dir) = self.provider.dir() {
            dir.delete_logfile_file(id)?;
        }
        debug!(logfile = %id, "logfile removed");
        Ok(())
    }

    /// Shuts the write-ahead log down.
    ///
    /// Refuses new reservations, stops the synchroniser, and blocks
    /// until its final drain completes - after this returns, every
    /// write published before the stop was observed is on stable
    /// storage. Writes raced in after that point may be unflushed, the
    /// same as after a crash. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the synchroniser thread panicked.
    pub fn close(&self) -> WalResult<()> {
        let already_closing = self.closed.swap(true, Ordering::AcqRel);
        self.synchroniser.request_stop();

        if already_closing {
            // Another closer owns the join; wait for the drain.
            self.synchroniser.await_stopped();
            return Ok(());
        }

        let handle = self.sync_thread.lock().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| WalError::invalid_operation("synchroniser thread panicked"))?;
        } else {
            self.synchroniser.await_stopped();
        }
        Ok(())
    }

    /// Returns true if any logfile still has used-but-unsynced slots.
    pub fn has_unsynced_data(&self) -> bool {
        self.slots.has_pending()
    }

    /// Returns the id of the logfile currently accepting reservations.
    pub fn active_logfile_id(&self) -> LogfileId {
        self.inner.read().active.id()
    }

    /// Returns the state of a logfile, if it is still known.
    pub fn logfile_state(&self, id: LogfileId) -> Option<LogfileState> {
        self.inner.read().logfiles.get(&id).map(|l| l.state())
    }

    /// Returns every known logfile id, ascending.
    pub fn logfile_ids(&self) -> Vec<LogfileId> {
        self.inner.read().logfiles.keys().copied().collect()
    }

    /// Returns the WAL counters.
    pub fn stats(&self) -> &WalStats {
        &self.stats
    }

    /// Returns the configuration the WAL was opened with.
    pub fn config(&self) -> &WalConfig {
        &self.config
    }

    /// The slot allocator, shared with the synchroniser.
    pub(crate) fn slots(&self) -> &Slots {
        &self.slots
    }

    /// The synchroniser wakeup plumbing.
    pub(crate) fn synchroniser(&self) -> &Synchroniser {
        &self.synchroniser
    }

    /// Creates the next logfile and installs it as active.
    ///
    /// Caller must hold the allocation lock.
    fn rotate(&self) -> WalResult<Arc<Logfile>> {
        let mut inner = self.inner.write();
        let id = inner.next_id;

        let store = self.provider.create(&self.config, id)?;
        let logfile = Arc::new(Logfile::new(id, store));

        self.slots.register(id);
        inner.logfiles.insert(id, Arc::clone(&logfile));
        inner.active = Arc::clone(&logfile);
        inner.next_id = id.next();

        self.stats.record_rotation();
        debug!(logfile = %id, "rotated to new active logfile");
        Ok(logfile)
    }
}

impl std::fmt::Debug for LogfileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("LogfileManager")
            .field("active", &inner.active.id())
            .field("logfiles", &inner.logfiles.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
