//! Slot allocation and sync-region bookkeeping.
//!
//! Writers reserve disjoint byte ranges ("slots") inside the active
//! logfile, copy their payload, and mark the slot used. The
//! synchroniser asks for the next *sync region* - the longest
//! contiguous run of used-but-unsynced bytes in the oldest logfile
//! with pending data - flushes it, and releases it back.
//!
//! ## Ordering
//!
//! All bookkeeping lives behind a single mutex. `mark_used` acquires
//! it after the writer's payload copy has completed, so a slot is
//! visible to `sync_region` only once its bytes are in place; the
//! mutex is the happens-before edge between writer and synchroniser.
//!
//! Offsets within a logfile are assigned monotonically and never
//! reused. Freed space is reclaimed only by sealing and later
//! collecting the whole logfile.

use crate::error::{WalError, WalResult};
use crate::logfile::Logfile;
use crate::types::LogfileId;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Status of a slot within its logfile's ledger.
///
/// Slots are allocated on demand, so there is no separate free state:
/// a slot exists only once a writer has reserved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Handed to a writer; payload copy may still be in progress.
    Reserved,
    /// Payload copy complete; awaiting flush.
    Used,
    /// Flushed to stable storage.
    Synced,
}

/// A reserved byte range inside a logfile, held by one writer.
///
/// The handle is created by a reservation and consumed by
/// `mark_used`; the status itself is tracked in the allocator's
/// ledger, not in the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    logfile_id: LogfileId,
    offset: u64,
    length: u64,
}

impl Slot {
    /// Returns the id of the logfile the slot lives in.
    #[must_use]
    pub fn logfile_id(&self) -> LogfileId {
        self.logfile_id
    }

    /// Returns the byte offset of the slot within its logfile.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the length of the slot in bytes.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }
}

/// The longest contiguous run of used-but-unsynced bytes in one
/// logfile.
///
/// Regions are ephemeral: computed fresh on each synchroniser
/// iteration, never persisted, and never spanning two logfiles. The
/// slot indices stay valid until the matching [`Slots::release`] call;
/// only the synchroniser holds a region, and only `release` removes
/// ledger entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRegion {
    logfile_id: LogfileId,
    start: u64,
    end: u64,
    first_slot: usize,
    last_slot: usize,
}

impl SyncRegion {
    /// Returns the id of the logfile the region lives in.
    #[must_use]
    pub fn logfile_id(&self) -> LogfileId {
        self.logfile_id
    }

    /// Returns the first byte offset of the region.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Returns the past-the-end byte offset of the region.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }
}

/// One slot's bookkeeping entry.
#[derive(Debug, Clone)]
struct SlotEntry {
    offset: u64,
    length: u64,
    status: SlotStatus,
}

/// Per-logfile slot ledger.
///
/// Entries are ordered by offset. The fully-synced prefix is discarded
/// on release; `synced_position` is the high-water mark of durable
/// bytes.
#[derive(Debug, Default)]
struct Ledger {
    entries: Vec<SlotEntry>,
    synced_position: u64,
}

impl Ledger {
    fn has_used(&self) -> bool {
        self.entries.iter().any(|e| e.status == SlotStatus::Used)
    }

    fn is_drained(&self) -> bool {
        self.entries.iter().all(|e| e.status == SlotStatus::Synced)
    }
}

/// The slot allocator.
///
/// Hands out non-overlapping byte ranges for writers and computes the
/// next flushable region for the synchroniser. Safe for concurrent use
/// by many writers and the single synchroniser.
#[derive(Debug, Default)]
pub struct Slots {
    ledgers: Mutex<BTreeMap<LogfileId, Ledger>>,
}

impl Slots {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an empty ledger for a freshly created logfile.
    pub(crate) fn register(&self, id: LogfileId) {
        self.ledgers.lock().entry(id).or_default();
    }

    /// Reserves `size` bytes in the given logfile.
    ///
    /// Returns `None` if the logfile no longer accepts reservations or
    /// lacks the room; the caller is expected to rotate and retry.
    /// Zero-length reservations are permitted no-op markers.
    ///
    /// Must be called while holding the manager's allocation lock.
    pub(crate) fn reserve_in(&self, logfile: &Logfile, size: u64) -> Option<Slot> {
        let mut ledgers = self.ledgers.lock();
        let offset = logfile.allocate(size)?;

        let ledger = ledgers.entry(logfile.id()).or_default();
        ledger.entries.push(SlotEntry {
            offset,
            length: size,
            status: SlotStatus::Reserved,
        });

        Some(Slot {
            logfile_id: logfile.id(),
            offset,
            length: size,
        })
    }

    /// Transitions a slot from `Reserved` to `Used`.
    ///
    /// The caller must have finished copying its payload into the
    /// slot's byte range before calling this; afterwards the slot is
    /// visible to the synchroniser. Zero-length no-op markers carry no
    /// bytes and are folded straight to `Synced`: they never reach the
    /// synchroniser and never hold up draining.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the slot is unknown or not in the
    /// `Reserved` state.
    pub(crate) fn mark_used(&self, slot: &Slot) -> WalResult<()> {
        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers.get_mut(&slot.logfile_id).ok_or_else(|| {
            WalError::invalid_operation(format!("no ledger for {}", slot.logfile_id))
        })?;

        let index = find_entry(&ledger.entries, slot).ok_or_else(|| {
            WalError::invalid_operation(format!(
                "unknown slot at offset {} in {}",
                slot.offset, slot.logfile_id
            ))
        })?;

        let entry = &mut ledger.entries[index];
        if entry.status != SlotStatus::Reserved {
            return Err(WalError::invalid_operation(format!(
                "slot at offset {} in {} is not reserved",
                slot.offset, slot.logfile_id
            )));
        }

        entry.status = if entry.length == 0 {
            SlotStatus::Synced
        } else {
            SlotStatus::Used
        };
        Ok(())
    }

    /// Computes the next sync region, or `None` if nothing is pending.
    ///
    /// Picks the oldest logfile with at least one used slot and scans
    /// forward from its synced high-water mark over the contiguous run
    /// of used entries. A reserved entry stops the scan: bytes are
    /// never flushed out of order within a logfile. Already-synced
    /// entries (including folded zero-length markers) are skipped
    /// without breaking the run, since they occupy no unsynced bytes.
    ///
    /// Only the synchroniser calls this.
    pub(crate) fn sync_region(&self) -> Option<SyncRegion> {
        let ledgers = self.ledgers.lock();

        let (&logfile_id, ledger) = ledgers.iter().find(|(_, l)| l.has_used())?;

        let mut first_slot = None;
        let mut last_slot = 0;
        let mut end = ledger.synced_position;

        for (index, entry) in ledger.entries.iter().enumerate() {
            match entry.status {
                SlotStatus::Synced => continue,
                SlotStatus::Used => {
                    if first_slot.is_none() {
                        debug_assert_eq!(entry.offset, ledger.synced_position);
                        first_slot = Some(index);
                    }
                    last_slot = index;
                    end = entry.offset + entry.length;
                }
                SlotStatus::Reserved => break,
            }
        }

        let first_slot = first_slot?;
        Some(SyncRegion {
            logfile_id,
            start: ledger.synced_position,
            end,
            first_slot,
            last_slot,
        })
    }

    /// Marks every slot in a flushed region as synced and advances the
    /// logfile's synced high-water mark.
    ///
    /// Must only be called after the flush primitive reported success
    /// for exactly the region's byte range. The fully-synced prefix of
    /// the ledger is discarded; individual slot entries are not needed
    /// once their range is durable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the region's ledger is gone - the
    /// synchroniser never releases a region for a collected logfile.
    pub(crate) fn release(&self, region: &SyncRegion) -> WalResult<()> {
        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers.get_mut(&region.logfile_id).ok_or_else(|| {
            WalError::invalid_operation(format!("no ledger for {}", region.logfile_id))
        })?;

        for entry in &mut ledger.entries[region.first_slot..=region.last_slot] {
            entry.status = SlotStatus::Synced;
        }

        debug_assert!(region.end >= ledger.synced_position);
        ledger.synced_position = region.end;

        let drained = ledger
            .entries
            .iter()
            .take_while(|e| e.status == SlotStatus::Synced)
            .count();
        ledger.entries.drain(..drained);

        Ok(())
    }

    /// Returns true if any logfile has used-but-unsynced bytes.
    pub(crate) fn has_pending(&self) -> bool {
        self.ledgers.lock().values().any(Ledger::has_used)
    }

    /// Returns true if the logfile has no reserved or used slots left.
    ///
    /// This is the sealing precondition: a full logfile may only seal
    /// once everything allocated from it is durable.
    pub(crate) fn is_drained(&self, id: LogfileId) -> bool {
        self.ledgers
            .lock()
            .get(&id)
            .map_or(true, Ledger::is_drained)
    }

    /// Forgets a sealed logfile's ledger.
    pub(crate) fn drop_ledger(&self, id: LogfileId) {
        self.ledgers.lock().remove(&id);
    }

    /// Returns the synced high-water mark of a logfile's ledger.
    #[cfg(test)]
    pub(crate) fn synced_position(&self, id: LogfileId) -> Option<u64> {
        self.ledgers.lock().get(&id).map(|l| l.synced_position)
    }
}

/// Locates the index of a slot's ledger entry.
///
/// Entries are sorted by offset, but zero-length slots share an offset
/// with their successor, so the binary search is followed by a short
/// walk over equal offsets. Identical zero-length markers are
/// interchangeable; a still-reserved entry is preferred.
fn find_entry(entries: &[SlotEntry], slot: &Slot) -> Option<usize> {
    let mut index = entries
        .binary_search_by_key(&slot.offset, |e| e.offset)
        .ok()?;

    // Back up to the first entry with this offset.
    while index > 0 && entries[index - 1].offset == slot.offset {
        index -= 1;
    }

    let mut fallback = None;
    for (i, entry) in entries.iter().enumerate().skip(index) {
        if entry.offset != slot.offset {
            break;
        }
        if entry.length != slot.length {
            continue;
        }
        if entry.status == SlotStatus::Reserved {
            return Some(i);
        }
        fallback.get_or_insert(i);
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logfile::Logfile;
    use proptest::prelude::*;
    use seawall_storage::InMemoryStore;
    use std::sync::Arc;

    fn create_logfile(id: u64, capacity: u64) -> Logfile {
        Logfile::new(
            LogfileId::new(id),
            Arc::new(InMemoryStore::new(capacity)),
        )
    }

    fn setup(capacity: u64) -> (Slots, Logfile) {
        let slots = Slots::new();
        let logfile = create_logfile(1, capacity);
        slots.register(logfile.id());
        (slots, logfile)
    }

    #[test]
    fn reservations_do_not_overlap() {
        let (slots, logfile) = setup(100);

        let a = slots.reserve_in(&logfile, 30).unwrap();
        let b = slots.reserve_in(&logfile, 30).unwrap();
        let c = slots.reserve_in(&logfile, 40).unwrap();

        assert_eq!((a.offset(), a.length()), (0, 30));
        assert_eq!((b.offset(), b.length()), (30, 30));
        assert_eq!((c.offset(), c.length()), (60, 40));
    }

    #[test]
    fn reservation_without_room_fails() {
        let (slots, logfile) = setup(50);

        slots.reserve_in(&logfile, 40).unwrap();
        assert!(slots.reserve_in(&logfile, 20).is_none());
    }

    #[test]
    fn no_region_without_used_slots() {
        let (slots, logfile) = setup(100);

        assert!(slots.sync_region().is_none());

        let _slot = slots.reserve_in(&logfile, 10).unwrap();
        // Reserved but not yet used: still nothing to flush.
        assert!(slots.sync_region().is_none());
    }

    #[test]
    fn region_covers_contiguous_used_run() {
        let (slots, logfile) = setup(100);

        let a = slots.reserve_in(&logfile, 10).unwrap();
        let b = slots.reserve_in(&logfile, 20).unwrap();
        slots.mark_used(&a).unwrap();
        slots.mark_used(&b).unwrap();

        let region = slots.sync_region().unwrap();
        assert_eq!(region.logfile_id(), logfile.id());
        assert_eq!(region.start(), 0);
        assert_eq!(region.end(), 30);
    }

    #[test]
    fn reserved_slot_stops_the_run() {
        let (slots, logfile) = setup(100);

        let a = slots.reserve_in(&logfile, 10).unwrap();
        let b = slots.reserve_in(&logfile, 20).unwrap();
        let c = slots.reserve_in(&logfile, 5).unwrap();
        slots.mark_used(&a).unwrap();
        // b still reserved.
        slots.mark_used(&c).unwrap();

        let region = slots.sync_region().unwrap();
        assert_eq!(region.end(), 10);

        // Once b lands, the next region reaches c.
        slots.release(&region).unwrap();
        slots.mark_used(&b).unwrap();

        let region = slots.sync_region().unwrap();
        assert_eq!(region.start(), 10);
        assert_eq!(region.end(), 35);
    }

    #[test]
    fn blocked_front_yields_no_region() {
        let (slots, logfile) = setup(100);

        let a = slots.reserve_in(&logfile, 10).unwrap();
        let b = slots.reserve_in(&logfile, 10).unwrap();
        slots.mark_used(&b).unwrap();
        let _ = a; // a reserved at the front blocks b's bytes

        assert!(slots.sync_region().is_none());
    }

    #[test]
    fn release_advances_high_water_mark() {
        let (slots, logfile) = setup(100);

        let a = slots.reserve_in(&logfile, 25).unwrap();
        slots.mark_used(&a).unwrap();

        let region = slots.sync_region().unwrap();
        slots.release(&region).unwrap();

        assert_eq!(slots.synced_position(logfile.id()), Some(25));
        assert!(slots.sync_region().is_none());
        assert!(slots.is_drained(logfile.id()));
    }

    #[test]
    fn oldest_logfile_flushes_first() {
        let slots = Slots::new();
        let old = create_logfile(1, 100);
        let new = create_logfile(2, 100);
        slots.register(old.id());
        slots.register(new.id());

        let in_new = slots.reserve_in(&new, 10).unwrap();
        let in_old = slots.reserve_in(&old, 10).unwrap();
        slots.mark_used(&in_new).unwrap();
        slots.mark_used(&in_old).unwrap();

        let region = slots.sync_region().unwrap();
        assert_eq!(region.logfile_id(), old.id());

        slots.release(&region).unwrap();
        let region = slots.sync_region().unwrap();
        assert_eq!(region.logfile_id(), new.id());
    }

    #[test]
    fn region_never_spans_logfiles() {
        let slots = Slots::new();
        let first = create_logfile(1, 20);
        let second = create_logfile(2, 20);
        slots.register(first.id());
        slots.register(second.id());

        let a = slots.reserve_in(&first, 20).unwrap();
        let b = slots.reserve_in(&second, 20).unwrap();
        slots.mark_used(&a).unwrap();
        slots.mark_used(&b).unwrap();

        let region = slots.sync_region().unwrap();
        assert_eq!(region.logfile_id(), first.id());
        assert_eq!(region.end(), 20);
    }

    #[test]
    fn zero_length_slots_are_folded() {
        let (slots, logfile) = setup(100);

        let marker = slots.reserve_in(&logfile, 0).unwrap();
        assert_eq!(marker.length(), 0);
        slots.mark_used(&marker).unwrap();

        // A lone zero-length slot never yields a zero-byte region.
        assert!(slots.sync_region().is_none());
        assert!(slots.is_drained(logfile.id()));

        // Folded markers don't break contiguity for real slots.
        let a = slots.reserve_in(&logfile, 10).unwrap();
        let m = slots.reserve_in(&logfile, 0).unwrap();
        let b = slots.reserve_in(&logfile, 10).unwrap();
        slots.mark_used(&a).unwrap();
        slots.mark_used(&m).unwrap();
        slots.mark_used(&b).unwrap();

        let region = slots.sync_region().unwrap();
        assert_eq!(region.start(), 0);
        assert_eq!(region.end(), 20);
    }

    #[test]
    fn trailing_marker_does_not_block_draining() {
        let (slots, logfile) = setup(100);

        // Real bytes followed by a no-op marker at the tail.
        let a = slots.reserve_in(&logfile, 60).unwrap();
        slots.mark_used(&a).unwrap();
        let marker = slots.reserve_in(&logfile, 0).unwrap();
        slots.mark_used(&marker).unwrap();

        let region = slots.sync_region().unwrap();
        assert_eq!(region.end(), 60);
        slots.release(&region).unwrap();

        // The marker carries no bytes: nothing is left to flush and
        // the ledger reports drained, so the logfile can seal.
        assert!(slots.sync_region().is_none());
        assert!(slots.is_drained(logfile.id()));
    }

    #[test]
    fn mark_used_twice_fails() {
        let (slots, logfile) = setup(100);

        let slot = slots.reserve_in(&logfile, 10).unwrap();
        slots.mark_used(&slot).unwrap();

        let result = slots.mark_used(&slot);
        assert!(matches!(result, Err(WalError::InvalidOperation { .. })));
    }

    #[test]
    fn mark_used_unknown_logfile_fails() {
        let (slots, _logfile) = setup(100);
        let stray = create_logfile(9, 100);
        let slot = Slots::new().reserve_in(&stray, 4).unwrap();

        let result = slots.mark_used(&slot);
        assert!(matches!(result, Err(WalError::InvalidOperation { .. })));
    }

    #[test]
    fn drained_after_prefix_discard() {
        let (slots, logfile) = setup(100);

        for _ in 0..3 {
            let slot = slots.reserve_in(&logfile, 10).unwrap();
            slots.mark_used(&slot).unwrap();
            let region = slots.sync_region().unwrap();
            slots.release(&region).unwrap();
        }

        assert!(slots.is_drained(logfile.id()));
        assert_eq!(slots.synced_position(logfile.id()), Some(30));
    }

    #[test]
    fn dropped_ledger_counts_as_drained() {
        let (slots, logfile) = setup(100);
        slots.drop_ledger(logfile.id());
        assert!(slots.is_drained(logfile.id()));
    }

    proptest! {
        /// Every pair of reservations from one logfile is disjoint and
        /// offsets are assigned monotonically.
        #[test]
        fn reservations_stay_disjoint(sizes in prop::collection::vec(0u64..256, 1..64)) {
            let (slots, logfile) = setup(1 << 20);

            let mut granted: Vec<Slot> = Vec::new();
            for size in sizes {
                if let Some(slot) = slots.reserve_in(&logfile, size) {
                    granted.push(slot);
                }
            }

            for pair in granted.windows(2) {
                // Monotonic offsets, adjacent but never overlapping.
                prop_assert!(pair[0].offset() + pair[0].length() <= pair[1].offset());
            }
        }

        /// Flushing after every batch of writes keeps the synced mark
        /// monotonic and regions contiguous.
        #[test]
        fn synced_mark_is_monotonic(sizes in prop::collection::vec(1u64..128, 1..32)) {
            let (slots, logfile) = setup(1 << 20);

            let mut last_mark = 0u64;
            for size in sizes {
                let slot = slots.reserve_in(&logfile, size).unwrap();
                slots.mark_used(&slot).unwrap();

                let region = slots.sync_region().unwrap();
                prop_assert_eq!(region.start(), last_mark);
                prop_assert!(region.end() > region.start());
                slots.release(&region).unwrap();
                last_mark = region.end();

                prop_assert_eq!(slots.synced_position(logfile.id()), Some(last_mark));
            }
        }
    }
}
