//! # Seawall Core
//!
//! The write-ahead log durability pipeline for Seawall.
//!
//! Concurrent writers reserve disjoint byte ranges ("slots") inside the
//! active logfile, copy their payload, and publish the slot. A single
//! background synchroniser flushes exactly the written-but-not-yet-durable
//! byte ranges to stable storage, then advances logfile lifecycle state
//! (open → full → sealed → eligible for collection). Writers never
//! serialize behind a flush, and the single-flusher design rules out
//! flush/flush races by construction.
//!
//! ## The writer contract
//!
//! ```rust
//! use seawall_core::{LogfileManager, WalConfig};
//!
//! let wal = LogfileManager::open_in_memory(WalConfig::default()).unwrap();
//!
//! let payload = b"one durable record";
//! let slot = wal.reserve(payload.len() as u64).unwrap();
//! wal.write(&slot, payload).unwrap();
//! wal.mark_used(slot).unwrap();
//! wal.signal_sync();
//!
//! // close() drains the synchroniser: every published write is on
//! // stable storage when it returns.
//! wal.close().unwrap();
//! ```
//!
//! ## Durability guarantee
//!
//! A write is durable once the synchroniser has flushed and released
//! its slot's byte range. Callers observe either success or an explicit
//! failure; there is no silent partial-success state. A failed flush is
//! retried until it succeeds, and a clean shutdown drains everything
//! published before the stop was observed.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod logfile;
mod manager;
mod slots;
mod stats;
mod synchroniser;
mod types;

pub use config::WalConfig;
pub use error::{WalError, WalResult};
pub use logfile::{Logfile, LogfileState};
pub use manager::LogfileManager;
pub use slots::Slot;
pub use stats::{StatsSnapshot, WalStats};
pub use types::LogfileId;
