//! Shutdown reconciliation.
//!
//! Clients still attached when the process stops never run their disconnect
//! handler. Before exiting, the process removes them from the global counter
//! in one corrective write and publishes the result.
//!
//! Sealing the local session tracker comes first. From then on local
//! connects and disconnects stop touching the store, so every session
//! attached here is accounted for by this one write. The seal holds even
//! when the correction fails.
//!
//! The read-compute-write here is not atomic: a connect or disconnect landing
//! on another process between the read and the write is overwritten.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::counter::bus::ChangeBus;
use crate::counter::error::{CounterError, CounterResult, IntegrityWarning};
use crate::counter::event::ChangeEvent;
use crate::counter::session::LocalSessionTracker;
use crate::counter::store::CounterStore;
use crate::observability::metrics;

/// What a reconciliation attempt did.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// No local sessions were outstanding.
    NothingToRemove,
    /// The global counter was corrected.
    Corrected { observed: i64, removed: i64, value: i64 },
    /// A store or bus call failed; the drift stays.
    Failed(CounterError),
    /// The grace period ran out first.
    TimedOut,
    /// Reconciliation had already run in this process.
    AlreadyRan,
}

impl ReconcileOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::NothingToRemove => "nothing_to_remove",
            ReconcileOutcome::Corrected { .. } => "corrected",
            ReconcileOutcome::Failed(_) => "failed",
            ReconcileOutcome::TimedOut => "timed_out",
            ReconcileOutcome::AlreadyRan => "already_ran",
        }
    }
}

/// One-shot corrective adjustment run during graceful termination.
pub struct ShutdownReconciler {
    store: Arc<dyn CounterStore>,
    bus: Arc<dyn ChangeBus>,
    sessions: Arc<LocalSessionTracker>,
    key: String,
    channel: String,
    call_timeout: Duration,
    started: AtomicBool,
}

impl ShutdownReconciler {
    pub fn new(
        store: Arc<dyn CounterStore>,
        bus: Arc<dyn ChangeBus>,
        sessions: Arc<LocalSessionTracker>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            store,
            bus,
            sessions,
            key: config.counter_key.clone(),
            channel: config.updates_channel.clone(),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            started: AtomicBool::new(false),
        }
    }

    /// Run reconciliation, giving up when `grace` elapses.
    pub async fn reconcile_within(&self, grace: Duration) -> ReconcileOutcome {
        let outcome = match tokio::time::timeout(grace, self.reconcile()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let grace_ms = grace.as_millis() as u64;
                tracing::warn!(
                    grace_ms,
                    local_sessions = self.sessions.current_value(),
                    "Grace period elapsed before reconciliation finished; count may drift"
                );
                ReconcileOutcome::TimedOut
            }
        };
        metrics::record_reconcile(outcome.label());
        outcome
    }

    /// Remove this process's outstanding sessions from the global counter.
    ///
    /// Only the first call does anything. Errors are logged and returned in
    /// the outcome, never propagated.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Reconciliation already ran; ignoring");
            return ReconcileOutcome::AlreadyRan;
        }

        let local = self.sessions.seal().await;
        if local < 0 {
            IntegrityWarning::NegativeLocalSessions { value: local }.report();
            return ReconcileOutcome::NothingToRemove;
        }
        if local == 0 {
            tracing::info!("No local sessions outstanding; nothing to reconcile");
            return ReconcileOutcome::NothingToRemove;
        }

        tracing::info!(local_sessions = local, "Removing local sessions from global counter");
        match self.correct(local).await {
            Ok((observed, value)) => {
                tracing::info!(observed, removed = local, value, "Global counter reconciled");
                ReconcileOutcome::Corrected { observed, removed: local, value }
            }
            Err(e) => {
                tracing::error!(error = %e, local_sessions = local, "Reconciliation failed; count will drift");
                ReconcileOutcome::Failed(e)
            }
        }
    }

    async fn correct(&self, local: i64) -> CounterResult<(i64, i64)> {
        let observed = self
            .bounded("get", self.store.get(&self.key))
            .await?
            .unwrap_or(0);
        if observed < local {
            IntegrityWarning::StoreBelowLocalSessions { global: observed, local }.report();
        }

        let value = (observed - local).max(0);
        self.bounded("set", self.store.set(&self.key, value)).await?;
        self.bounded(
            "publish",
            self.bus.publish(&self.channel, ChangeEvent::new(value).to_message()),
        )
        .await?;
        Ok((observed, value))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = CounterResult<T>>,
    ) -> CounterResult<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.inspect_err(|_| metrics::record_store_error(operation)),
            Err(_) => {
                metrics::record_store_error(operation);
                Err(CounterError::Timeout {
                    operation,
                    millis: self.call_timeout.as_millis() as u64,
                })
            }
        }
    }
}
