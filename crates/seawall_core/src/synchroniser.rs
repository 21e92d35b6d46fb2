//! The background synchroniser.
//!
//! A single worker thread owns all flush I/O: it wakes when a writer
//! signals pending data (or on a bounded timeout as a safety net),
//! pulls the next sync region from the slot allocator, flushes it to
//! stable storage, releases it, and seals logfiles that are full and
//! fully synced. Concentrating flushing in one thread removes
//! flush/flush races and double-fsync by construction.
//!
//! ## Failure policy
//!
//! A failed flush is logged and the region stays used, so the next
//! pass retries it; nothing is ever dropped silently. A logfile id
//! that no longer resolves is a broken contract - the process aborts
//! rather than continue without a durability guarantee.

use crate::manager::LogfileManager;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared state between writers, the worker thread, and `stop()`.
#[derive(Debug, Default)]
struct SyncState {
    /// Pending sync requests. Additive; duplicate signals are cheap
    /// because a flush pass drains whatever is pending regardless of
    /// the count.
    waiting: u32,
    /// Cooperative stop flag, checked once per loop iteration.
    stop: bool,
    /// Set by the worker after its final drain.
    stopped: bool,
}

/// Condition-variable plumbing for the synchroniser thread.
#[derive(Debug, Default)]
pub(crate) struct Synchroniser {
    state: Mutex<SyncState>,
    condvar: Condvar,
}

impl Synchroniser {
    /// Signals that a writer has unsynced data.
    ///
    /// Non-blocking and callable from any thread.
    pub(crate) fn signal(&self) {
        let mut state = self.state.lock();
        state.waiting = state.waiting.saturating_add(1);
        self.condvar.notify_one();
    }

    /// Sets the stop flag and wakes the worker.
    pub(crate) fn request_stop(&self) {
        let mut state = self.state.lock();
        state.stop = true;
        self.condvar.notify_all();
    }

    /// Blocks until the worker has acknowledged termination.
    pub(crate) fn await_stopped(&self) {
        let mut state = self.state.lock();
        while !state.stopped {
            self.condvar.wait(&mut state);
        }
    }

    /// Snapshot of the pending-request counter.
    fn waiting(&self) -> u32 {
        self.state.lock().waiting
    }
}

/// The synchroniser main loop.
///
/// Runs on the dedicated thread spawned by the manager; returns only
/// after a stop request and the final drain.
pub(crate) fn run(manager: Arc<LogfileManager>) {
    debug!("synchroniser started");
    let sync = manager.synchroniser();

    loop {
        let waiting = sync.waiting();

        // One pass runs whether we were signalled or the idle timeout
        // fired; the timeout doubles as a periodic safety-net flush.
        flush_pass(&manager);

        let mut state = sync.state.lock();
        if waiting > 0 {
            debug_assert!(state.waiting >= waiting);
            state.waiting -= waiting;
        }
        if state.stop {
            break;
        }
        if state.waiting == 0 {
            sync.condvar
                .wait_for(&mut state, manager.config().sync_interval);
            if state.stop {
                break;
            }
        }
    }

    final_drain(&manager);

    let mut state = sync.state.lock();
    state.stopped = true;
    sync.condvar.notify_all();
    debug!("synchroniser stopped");
}

/// Outcome of a single flush pass.
enum PassOutcome {
    /// A region was flushed and released.
    Flushed,
    /// A region existed but its flush failed; it stays used.
    FlushFailed,
    /// Nothing was pending.
    Idle,
}

/// Steps 3-6 of the loop: region, flush, release, seal.
fn flush_pass(manager: &LogfileManager) -> PassOutcome {
    let outcome = match manager.slots().sync_region() {
        Some(region) => {
            // Resolve the logfile to its store. A dangling id here
            // breaks the durability contract; there is no way to
            // continue safely.
            let logfile = match manager.logfile(region.logfile_id()) {
                Ok(logfile) => logfile,
                Err(err) => {
                    error!(
                        logfile = %region.logfile_id(),
                        %err,
                        "sync region references an unresolvable logfile"
                    );
                    std::process::abort();
                }
            };

            match logfile.store().sync_range(region.start(), region.end()) {
                Ok(()) => {
                    if let Err(err) = manager.slots().release(&region) {
                        error!(
                            logfile = %region.logfile_id(),
                            %err,
                            "flushed region could not be released"
                        );
                        std::process::abort();
                    }
                    manager.stats().record_flush_pass();
                    PassOutcome::Flushed
                }
                Err(err) => {
                    // Leave the region used; the next pass retries it.
                    warn!(
                        logfile = %region.logfile_id(),
                        start = region.start(),
                        end = region.end(),
                        %err,
                        "unable to sync logfile region"
                    );
                    manager.stats().record_flush_failure();
                    PassOutcome::FlushFailed
                }
            }
        }
        None => PassOutcome::Idle,
    };

    if let Err(err) = manager.seal_logfiles() {
        error!(%err, "sealing scan failed");
        std::process::abort();
    }

    outcome
}

/// Flushes until nothing is pending, so no acknowledged write is left
/// unsynced by a clean shutdown.
///
/// A flush error abandons the drain after logging it: the remaining
/// regions are in the same position as after a crash, and the store
/// was unable to accept them anyway.
fn final_drain(manager: &LogfileManager) {
    loop {
        match flush_pass(manager) {
            PassOutcome::Flushed => continue,
            PassOutcome::Idle => break,
            PassOutcome::FlushFailed => {
                warn!("abandoning final drain after flush failure");
                break;
            }
        }
    }
}
