//! # Seawall Storage
//!
//! Logfile store trait and implementations for Seawall.
//!
//! This crate provides the lowest-level storage abstraction for the
//! write-ahead log. Logfile stores are **opaque byte regions** of fixed
//! capacity - they do not interpret the data they hold.
//!
//! ## Design Principles
//!
//! - Stores are fixed-capacity random-access byte regions
//! - No knowledge of Seawall record formats, slots, or sealing
//! - Must be `Send + Sync` for concurrent writer access
//! - Seawall core owns all layout interpretation
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral logfiles
//! - [`FileStore`] - For persistent logfiles using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use seawall_storage::{LogfileStore, InMemoryStore};
//!
//! let store = InMemoryStore::new(64);
//! store.write_at(0, b"hello world").unwrap();
//! store.sync_range(0, 11).unwrap();
//! let data = store.read_at(0, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::LogfileStore;
