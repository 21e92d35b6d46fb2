//! Write-ahead log statistics.
//!
//! Provides counters for monitoring the durability pipeline.
//!
//! # Usage
//!
//! ```rust,ignore
//! use seawall_core::{LogfileManager, WalConfig};
//!
//! let wal = LogfileManager::open_in_memory(WalConfig::default())?;
//!
//! // Perform writes...
//!
//! let stats = wal.stats().snapshot();
//! println!("Reservations: {}", stats.reservations);
//! println!("Flush passes: {}", stats.flush_passes);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Write-ahead log counters.
///
/// All counters are atomic, monotonically increasing, and can be read
/// while writers and the synchroniser are active.
#[derive(Debug, Default)]
pub struct WalStats {
    /// Total slot reservations granted.
    reservations: AtomicU64,
    /// Total bytes reserved.
    bytes_reserved: AtomicU64,
    /// Total logfile rotations.
    rotations: AtomicU64,
    /// Total flush passes the synchroniser has run (one per region).
    flush_passes: AtomicU64,
    /// Total flush failures (each is retried on a later pass).
    flush_failures: AtomicU64,
    /// Total logfiles sealed.
    logfiles_sealed: AtomicU64,
}

impl WalStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a granted reservation.
    pub(crate) fn record_reservation(&self, bytes: u64) {
        self.reservations.fetch_add(1, Ordering::Relaxed);
        self.bytes_reserved.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a logfile rotation.
    pub(crate) fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful flush of one sync region.
    pub(crate) fn record_flush_pass(&self) {
        self.flush_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed flush.
    pub(crate) fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a sealed logfile.
    pub(crate) fn record_seal(&self) {
        self.logfiles_sealed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total slot reservations granted.
    pub fn reservations(&self) -> u64 {
        self.reservations.load(Ordering::Relaxed)
    }

    /// Returns the total bytes reserved.
    pub fn bytes_reserved(&self) -> u64 {
        self.bytes_reserved.load(Ordering::Relaxed)
    }

    /// Returns the total logfile rotations.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Returns the total successful flush passes.
    pub fn flush_passes(&self) -> u64 {
        self.flush_passes.load(Ordering::Relaxed)
    }

    /// Returns the total flush failures.
    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    /// Returns the total logfiles sealed.
    pub fn logfiles_sealed(&self) -> u64 {
        self.logfiles_sealed.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reservations: self.reservations(),
            bytes_reserved: self.bytes_reserved(),
            rotations: self.rotations(),
            flush_passes: self.flush_passes(),
            flush_failures: self.flush_failures(),
            logfiles_sealed: self.logfiles_sealed(),
        }
    }
}

/// A point-in-time snapshot of WAL statistics.
///
/// Unlike `WalStats`, this is a plain struct that can be compared or
/// passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total slot reservations granted.
    pub reservations: u64,
    /// Total bytes reserved.
    pub bytes_reserved: u64,
    /// Total logfile rotations.
    pub rotations: u64,
    /// Total successful flush passes.
    pub flush_passes: u64,
    /// Total flush failures.
    pub flush_failures: u64,
    /// Total logfiles sealed.
    pub logfiles_sealed: u64,
}
