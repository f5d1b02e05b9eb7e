//! Process lifecycle state machine.
//!
//! # States
//! ```text
//! Starting → Running → Draining → Terminated
//! ```
//!
//! - Starting → Running: counter initialized, bus subscribed, listener serving
//! - Running → Draining: termination signal received
//! - Draining → Terminated: reconciliation finished or grace period elapsed
//!
//! Transitions are compare-and-swap, so a stale caller cannot move the
//! process backwards.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Terminated = 3,
}

impl From<u8> for ProcessState {
    fn from(val: u8) -> Self {
        match val {
            0 => ProcessState::Starting,
            1 => ProcessState::Running,
            2 => ProcessState::Draining,
            _ => ProcessState::Terminated,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Draining => "draining",
            ProcessState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot move from {expected} to {target}: process is {actual}")]
pub struct LifecycleError {
    pub expected: ProcessState,
    pub target: ProcessState,
    pub actual: ProcessState,
}

/// Shared handle to the process state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: Arc<AtomicU8>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ProcessState::Starting as u8)),
        }
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn mark_running(&self) -> Result<(), LifecycleError> {
        self.transition(ProcessState::Starting, ProcessState::Running)
    }

    pub fn begin_draining(&self) -> Result<(), LifecycleError> {
        self.transition(ProcessState::Running, ProcessState::Draining)
    }

    pub fn mark_terminated(&self) -> Result<(), LifecycleError> {
        self.transition(ProcessState::Draining, ProcessState::Terminated)
    }

    /// Whether new clients should be accepted.
    pub fn accepting(&self) -> bool {
        self.state() == ProcessState::Running
    }

    fn transition(&self, from: ProcessState, to: ProcessState) -> Result<(), LifecycleError> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| {
                tracing::info!(from = %from, to = %to, "Lifecycle transition");
            })
            .map_err(|actual| LifecycleError {
                expected: from,
                target: to,
                actual: ProcessState::from(actual),
            })
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ProcessState::Starting);
        assert!(!lifecycle.accepting());

        lifecycle.mark_running().unwrap();
        assert!(lifecycle.accepting());

        lifecycle.begin_draining().unwrap();
        assert_eq!(lifecycle.state(), ProcessState::Draining);
        assert!(!lifecycle.accepting());

        lifecycle.mark_terminated().unwrap();
        assert_eq!(lifecycle.state(), ProcessState::Terminated);
    }

    #[test]
    fn test_invalid_transition() {
        let lifecycle = Lifecycle::new();
        let err = lifecycle.begin_draining().unwrap_err();
        assert_eq!(err.actual, ProcessState::Starting);
        assert_eq!(
            err.to_string(),
            "cannot move from running to draining: process is starting"
        );
        assert_eq!(lifecycle.state(), ProcessState::Starting);
    }

    #[test]
    fn test_shared_handle() {
        let lifecycle = Lifecycle::new();
        let observer = lifecycle.clone();
        lifecycle.mark_running().unwrap();
        assert_eq!(observer.state(), ProcessState::Running);
    }
}
