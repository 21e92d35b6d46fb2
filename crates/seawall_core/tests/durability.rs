//! Cross-component durability scenarios.
//!
//! These tests drive the full pipeline - writers, slot allocator,
//! synchroniser thread, and logfile lifecycle - through the public API.

use seawall_core::{LogfileId, LogfileManager, LogfileState, WalConfig, WalError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn small_config() -> WalConfig {
    WalConfig::default()
        .logfile_capacity(120)
        .sync_interval(Duration::from_millis(5))
}

/// Spins until `predicate` holds, with a generous deadline.
fn wait_until(predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn write_rotate_seal_scenario() {
    let wal = LogfileManager::open_in_memory(small_config()).unwrap();

    // Writer A: 100 bytes into logfile 1.
    let a = wal.reserve(100).unwrap();
    assert_eq!(a.logfile_id(), LogfileId::new(1));
    assert_eq!(a.offset(), 0);
    wal.write(&a, &[0xAA; 100]).unwrap();
    wal.mark_used(a).unwrap();
    wal.signal_sync();

    wait_until(|| !wal.has_unsynced_data());

    // Writer B: 50 bytes don't fit in the 120-byte logfile 1, so the
    // reservation rotates: logfile 1 goes full, logfile 2 opens, and
    // B's slot lands at the start of logfile 2.
    let b = wal.reserve(50).unwrap();
    assert_eq!(b.logfile_id(), LogfileId::new(2));
    assert_eq!(b.offset(), 0);
    wal.write(&b, &[0xBB; 50]).unwrap();
    wal.mark_used(b).unwrap();
    wal.signal_sync();

    // Logfile 1 is full and fully synced: it seals. Logfile 2 is the
    // active logfile and must not seal.
    wait_until(|| wal.logfile_state(LogfileId::new(1)) == Some(LogfileState::Sealed));
    assert_eq!(
        wal.logfile_state(LogfileId::new(2)),
        Some(LogfileState::Open)
    );

    wal.close().unwrap();
}

#[test]
fn concurrent_writers_never_overlap() {
    let wal = LogfileManager::open_in_memory(
        WalConfig::default()
            .logfile_capacity(4096)
            .sync_interval(Duration::from_millis(5)),
    )
    .unwrap();

    let mut handles = Vec::new();
    for writer in 0..4u8 {
        let wal = Arc::clone(&wal);
        handles.push(thread::spawn(move || {
            let mut written = Vec::new();
            for record in 0..25u8 {
                let payload = vec![writer * 32 + record; 16 + usize::from(record)];
                let slot = wal.append(&payload).unwrap();
                written.push((slot, payload));
            }
            written
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    wal.close().unwrap();
    assert!(!wal.has_unsynced_data());

    // Per logfile, every granted range is disjoint.
    all.sort_by_key(|(slot, _)| (slot.logfile_id(), slot.offset()));
    for pair in all.windows(2) {
        let (first, _) = &pair[0];
        let (second, _) = &pair[1];
        if first.logfile_id() == second.logfile_id() {
            assert!(
                first.offset() + first.length() <= second.offset(),
                "slots overlap: {first:?} and {second:?}"
            );
        }
    }

    // Every payload is durable and intact.
    for (slot, payload) in &all {
        let store = wal.logfile(slot.logfile_id()).unwrap().store();
        let data = store.read_at(slot.offset(), payload.len()).unwrap();
        assert_eq!(&data, payload);
    }
}

#[test]
fn close_drains_everything_published() {
    let wal = LogfileManager::open_in_memory(small_config()).unwrap();

    let mut written = Vec::new();
    for i in 0..50u8 {
        let payload = vec![i; 30];
        let slot = wal.append(&payload).unwrap();
        written.push((slot, payload));
    }

    // No waiting: close must finish the drain itself.
    wal.close().unwrap();
    assert!(!wal.has_unsynced_data());

    for (slot, payload) in &written {
        let store = wal.logfile(slot.logfile_id()).unwrap().store();
        assert_eq!(&store.read_at(slot.offset(), payload.len()).unwrap(), payload);
    }

    // Every retired logfile sealed, in order; only the active one stays
    // open.
    let ids = wal.logfile_ids();
    let (active, retired) = ids.split_last().unwrap();
    for id in retired {
        assert_eq!(wal.logfile_state(*id), Some(LogfileState::Sealed));
    }
    assert_eq!(wal.logfile_state(*active), Some(LogfileState::Open));
}

#[test]
fn duplicate_signals_collapse_into_one_flush() {
    let wal = LogfileManager::open_in_memory(small_config()).unwrap();

    let slot = wal.reserve(20).unwrap();
    wal.write(&slot, &[7; 20]).unwrap();
    wal.mark_used(slot).unwrap();

    for _ in 0..100 {
        wal.signal_sync();
    }

    wal.close().unwrap();

    // The pending bytes went out in a single flush pass; a hundred
    // signals never mean a hundred flushes of the same region.
    assert_eq!(wal.stats().flush_passes(), 1);
}

#[test]
fn signals_without_data_flush_nothing() {
    let wal = LogfileManager::open_in_memory(small_config()).unwrap();

    for _ in 0..10 {
        wal.signal_sync();
    }
    thread::sleep(Duration::from_millis(20));
    wal.close().unwrap();

    assert_eq!(wal.stats().flush_passes(), 0);
}

#[test]
fn reopen_registers_history_as_sealed() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("wal");

    let first_run_payload = b"from the first run".to_vec();
    {
        let wal = LogfileManager::open(&path, small_config()).unwrap();
        assert_eq!(wal.active_logfile_id(), LogfileId::new(1));
        wal.append(&first_run_payload).unwrap();
        wal.close().unwrap();
    }

    {
        let wal = LogfileManager::open(&path, small_config()).unwrap();

        // The previous run's logfile is sealed history; a fresh logfile
        // is active.
        assert_eq!(
            wal.logfile_state(LogfileId::new(1)),
            Some(LogfileState::Sealed)
        );
        assert_eq!(wal.active_logfile_id(), LogfileId::new(2));

        // Its bytes are still readable through the descriptor.
        let store = wal.logfile(LogfileId::new(1)).unwrap().store();
        let data = store.read_at(0, first_run_payload.len()).unwrap();
        assert_eq!(data, first_run_payload);

        wal.close().unwrap();
    }
}

#[test]
fn directory_lock_is_exclusive() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("wal");

    let wal = LogfileManager::open(&path, small_config()).unwrap();

    let result = LogfileManager::open(&path, small_config());
    assert!(matches!(result, Err(WalError::DirectoryLocked)));

    wal.close().unwrap();
}

#[test]
fn removed_logfile_file_is_deleted() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("wal");

    let wal = LogfileManager::open(&path, small_config()).unwrap();

    // Fill logfile 1 and rotate so it can seal.
    wal.append(&[1; 120]).unwrap();
    wal.append(&[2; 10]).unwrap();
    let id = LogfileId::new(1);
    wait_until(|| wal.logfile_state(id) == Some(LogfileState::Sealed));

    let logfile_file = path.join("logfile-000001.db");
    assert!(logfile_file.exists());

    wal.collect_logfile(id).unwrap();
    wal.remove_logfile(id).unwrap();

    assert!(!logfile_file.exists());
    assert_eq!(wal.logfile_state(id), None);

    wal.close().unwrap();
}
