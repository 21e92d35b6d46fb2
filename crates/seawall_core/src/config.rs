//! Write-ahead log configuration.

use std::time::Duration;

/// Configuration for opening a write-ahead log.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Whether to create the WAL directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Fixed capacity of each logfile in bytes.
    pub logfile_capacity: u64,

    /// Upper bound on how long the synchroniser sleeps between flush
    /// passes when no writer has signalled.
    pub sync_interval: Duration,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            logfile_capacity: 32 * 1024 * 1024,       // 32 MB
            sync_interval: Duration::from_millis(100), // safety-net flush
        }
    }
}

impl WalConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the WAL directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the fixed per-logfile capacity.
    #[must_use]
    pub const fn logfile_capacity(mut self, size: u64) -> Self {
        self.logfile_capacity = size;
        self
    }

    /// Sets the synchroniser's idle flush interval.
    #[must_use]
    pub const fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}
