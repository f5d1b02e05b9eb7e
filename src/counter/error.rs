//! Counter protocol errors and integrity warnings.

use thiserror::Error;

use crate::observability::metrics;

/// Errors surfaced by store and bus calls.
#[derive(Debug, Error)]
pub enum CounterError {
    /// Store connection or command failed.
    #[error("counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// Publish or subscribe failed.
    #[error("change bus unavailable: {0}")]
    BusUnavailable(String),

    /// The store holds something that is not an integer.
    #[error("counter store returned a malformed value: {0}")]
    MalformedValue(String),

    /// A bounded call did not finish in time.
    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: &'static str, millis: u64 },

    /// Shutdown reconciliation already owns this process's sessions.
    #[error("process is draining; new sessions are not counted")]
    Draining,
}

impl CounterError {
    /// Whether the store mutation was applied before the error occurred.
    ///
    /// Coordinator operations mutate the store first and publish second, so a
    /// bus failure means the count already moved and the matching
    /// disconnect must still run.
    pub fn mutation_applied(&self) -> bool {
        matches!(self, CounterError::BusUnavailable(_))
    }
}

/// Result type for counter operations.
pub type CounterResult<T> = Result<T, CounterError>;

/// Bookkeeping inconsistencies. Logged and counted, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityWarning {
    /// More local disconnects than connects were recorded.
    NegativeLocalSessions { value: i64 },
    /// The global counter was observed below zero.
    NegativeGlobalValue { value: i64 },
    /// Shutdown found fewer clients in the store than attached locally.
    StoreBelowLocalSessions { global: i64, local: i64 },
}

impl IntegrityWarning {
    /// Metric label for this warning.
    pub fn kind(&self) -> &'static str {
        match self {
            IntegrityWarning::NegativeLocalSessions { .. } => "negative_local_sessions",
            IntegrityWarning::NegativeGlobalValue { .. } => "negative_global_value",
            IntegrityWarning::StoreBelowLocalSessions { .. } => "store_below_local_sessions",
        }
    }

    /// Log the warning and bump its metric.
    pub fn report(&self) {
        metrics::record_integrity_warning(self.kind());
        match *self {
            IntegrityWarning::NegativeLocalSessions { value } => {
                tracing::warn!(local_sessions = value, "Integrity warning: local session count went negative");
            }
            IntegrityWarning::NegativeGlobalValue { value } => {
                tracing::warn!(value, "Integrity warning: global counter is negative");
            }
            IntegrityWarning::StoreBelowLocalSessions { global, local } => {
                tracing::warn!(
                    global,
                    local_sessions = local,
                    "Integrity warning: global counter is smaller than local session count"
                );
            }
        }
    }
}
