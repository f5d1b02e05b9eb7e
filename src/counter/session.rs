//! Local session tracking.
//!
//! Counts clients attached to this process. The value only feeds shutdown
//! reconciliation; it is never displayed or transmitted.
//!
//! Every connect/disconnect that touches the global counter holds a
//! [`MutationPermit`] while it does. Sealing the tracker stops new permits
//! and waits for outstanding ones, so the sealed count covers exactly the
//! sessions whose store updates have landed. After the seal, every local
//! session belongs to shutdown reconciliation.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::counter::error::IntegrityWarning;
use crate::observability::metrics;

/// Per-process count of attached clients.
#[derive(Debug, Default)]
pub struct LocalSessionTracker {
    sessions: AtomicI64,
    violations: AtomicU64,
    sealed: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Held while a session's store update is in flight.
#[derive(Debug)]
pub struct MutationPermit<'a> {
    tracker: &'a LocalSessionTracker,
}

impl Drop for MutationPermit<'_> {
    fn drop(&mut self) {
        if self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

impl LocalSessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly attached client. Returns the new count.
    pub fn increment(&self) -> i64 {
        let value = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_local_sessions(value);
        value
    }

    /// Record a detached client. Returns the new count.
    ///
    /// Going below zero is reported as an integrity warning and left as is,
    /// so the defect stays visible at shutdown.
    pub fn decrement(&self) -> i64 {
        let value = self.sessions.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_local_sessions(value);
        if value < 0 {
            self.violations.fetch_add(1, Ordering::Relaxed);
            IntegrityWarning::NegativeLocalSessions { value }.report();
        }
        value
    }

    pub fn current_value(&self) -> i64 {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Number of decrements that took the count below zero.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Permission to change the global counter for one session, or `None`
    /// once the tracker is sealed.
    pub fn begin_mutation(&self) -> Option<MutationPermit<'_>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let permit = MutationPermit { tracker: self };
        if self.sealed.load(Ordering::SeqCst) {
            return None;
        }
        Some(permit)
    }

    /// Stop handing out permits, wait for outstanding ones, and return the
    /// final session count.
    pub async fn seal(&self) -> i64 {
        self.sealed.store(true, Ordering::SeqCst);
        loop {
            let idle = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            idle.await;
        }
        self.current_value()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }
}
