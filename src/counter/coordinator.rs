//! Counter coordination.
//!
//! # Responsibilities
//! - Apply local connects/disconnects to the shared store atomically
//! - Publish every resulting value on the change bus
//! - Relay change events from the bus to local clients
//! - Initialize the counter key on cold start
//!
//! # Design Decisions
//! - The store is the single source of truth; this process only keeps a
//!   read-only mirror of the last value seen on the bus
//! - Store first, publish second: a bus failure never hides a lost mutation
//! - Remote events are forwarded without deduplication

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::broadcast;

use crate::config::StoreConfig;
use crate::counter::bus::{BusSubscription, ChangeBus};
use crate::counter::error::{CounterError, CounterResult, IntegrityWarning};
use crate::counter::event::ChangeEvent;
use crate::counter::fanout::Fanout;
use crate::counter::session::LocalSessionTracker;
use crate::counter::store::CounterStore;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

const UNSEEN: i64 = i64::MIN;

/// Result of cold-start initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The key already existed with this value.
    Existing(i64),
    /// This process created the key with 0.
    Created,
    /// The key was absent on read but another process created it first.
    CreatedElsewhere,
}

/// Per-process coordinator of the global connection counter.
pub struct CounterCoordinator {
    store: Arc<dyn CounterStore>,
    bus: Arc<dyn ChangeBus>,
    fanout: Arc<dyn Fanout>,
    sessions: Arc<LocalSessionTracker>,
    key: String,
    channel: String,
    last_seen: AtomicI64,
    negative_observations: AtomicU64,
}

impl CounterCoordinator {
    pub fn new(
        store: Arc<dyn CounterStore>,
        bus: Arc<dyn ChangeBus>,
        fanout: Arc<dyn Fanout>,
        sessions: Arc<LocalSessionTracker>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            store,
            bus,
            fanout,
            sessions,
            key: config.counter_key.clone(),
            channel: config.updates_channel.clone(),
            last_seen: AtomicI64::new(UNSEEN),
            negative_observations: AtomicU64::new(0),
        }
    }

    /// Make sure the counter key exists without clobbering a live value.
    pub async fn initialize(&self) -> CounterResult<InitOutcome> {
        if let Some(value) = self.store.get(&self.key).await? {
            tracing::info!(key = %self.key, value, "Global counter found");
            self.check_global(value);
            return Ok(InitOutcome::Existing(value));
        }

        if self.store.set_if_absent(&self.key, 0).await? {
            tracing::info!(key = %self.key, "Global counter initialized to 0");
            Ok(InitOutcome::Created)
        } else {
            tracing::info!(key = %self.key, "Global counter initialized by another process");
            Ok(InitOutcome::CreatedElsewhere)
        }
    }

    /// Open a subscription to the change channel.
    pub async fn subscribe(&self) -> CounterResult<BusSubscription> {
        self.bus.subscribe(&self.channel).await.inspect_err(|_| {
            metrics::record_store_error("subscribe");
        })
    }

    /// A client attached to this process.
    ///
    /// Returns the post-increment global value. Once shutdown reconciliation
    /// has sealed the session count, the store is left alone and
    /// [`CounterError::Draining`] is returned.
    pub async fn on_local_connect(&self) -> CounterResult<i64> {
        let Some(_permit) = self.sessions.begin_mutation() else {
            tracing::debug!("Client arrived after reconciliation sealed the count; not counted");
            return Err(CounterError::Draining);
        };

        let value = self.store.incr(&self.key).await.inspect_err(|_| {
            metrics::record_store_error("incr");
        })?;
        let local = self.sessions.increment();
        self.check_global(value);

        tracing::info!(value, local_sessions = local, "Client connected");
        self.publish(value).await?;
        Ok(value)
    }

    /// A client detached from this process.
    ///
    /// Returns the post-decrement global value, which is not clamped, or
    /// `None` when shutdown reconciliation has already removed this
    /// process's sessions from the count.
    pub async fn on_local_disconnect(&self) -> CounterResult<Option<i64>> {
        let Some(_permit) = self.sessions.begin_mutation() else {
            tracing::debug!("Client left after reconciliation sealed the count; store untouched");
            return Ok(None);
        };

        let local = self.sessions.decrement();
        let value = self.store.decr(&self.key).await.inspect_err(|_| {
            metrics::record_store_error("decr");
        })?;
        self.check_global(value);

        tracing::info!(value, local_sessions = local, "Client disconnected");
        self.publish(value).await?;
        Ok(Some(value))
    }

    /// A change event arrived on the bus, from this or another process.
    pub fn on_remote_change_event(&self, event: ChangeEvent) {
        self.last_seen.store(event.value, Ordering::SeqCst);
        metrics::record_global_value(event.value);
        metrics::record_change_event();
        tracing::debug!(value = event.value, "Relaying change event");
        self.fanout.broadcast_to_all_local_clients(&self.channel, event);
    }

    /// Decode a raw bus message and relay it.
    pub fn handle_bus_message(&self, raw: &str) {
        match raw.parse::<ChangeEvent>() {
            Ok(event) => self.on_remote_change_event(event),
            Err(e) => {
                tracing::warn!(message = %raw, error = %e, "Ignoring malformed change event");
            }
        }
    }

    /// Relay bus messages to local clients until shutdown, resubscribing
    /// with backoff whenever the subscription drops.
    pub async fn run_relay(
        self: Arc<Self>,
        mut subscription: BusSubscription,
        mut backoff: Backoff,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            loop {
                tokio::select! {
                    message = subscription.next() => match message {
                        Some(raw) => self.handle_bus_message(&raw),
                        None => break,
                    },
                    _ = shutdown.recv() => {
                        tracing::info!("Change relay received shutdown signal, exiting loop");
                        return;
                    }
                }
            }

            tracing::warn!(channel = %self.channel, "Change bus subscription lost, resubscribing");
            subscription = loop {
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.recv() => return,
                }

                let attempt = tokio::select! {
                    result = self.subscribe() => result,
                    _ = shutdown.recv() => return,
                };
                match attempt {
                    Ok(subscription) => {
                        tracing::info!(attempts = backoff.attempt(), "Change bus subscription restored");
                        backoff.reset();
                        break subscription;
                    }
                    Err(e) => {
                        tracing::error!(attempt = backoff.attempt(), error = %e, "Resubscribe failed");
                    }
                }
            };
        }
    }

    /// Last value seen on the bus, if any.
    pub fn last_seen(&self) -> Option<i64> {
        match self.last_seen.load(Ordering::SeqCst) {
            UNSEEN => None,
            value => Some(value),
        }
    }

    pub fn sessions(&self) -> &Arc<LocalSessionTracker> {
        &self.sessions
    }

    /// Integrity warnings raised by this process so far.
    pub fn integrity_warnings(&self) -> u64 {
        self.negative_observations.load(Ordering::Relaxed) + self.sessions.violations()
    }

    async fn publish(&self, value: i64) -> CounterResult<()> {
        self.bus
            .publish(&self.channel, ChangeEvent::new(value).to_message())
            .await
            .map_err(|e| {
                metrics::record_store_error("publish");
                tracing::warn!(value, error = %e, "Count updated but change event not published");
                match e {
                    CounterError::BusUnavailable(_) => e,
                    other => CounterError::BusUnavailable(other.to_string()),
                }
            })
    }

    fn check_global(&self, value: i64) {
        if value < 0 {
            self.negative_observations.fetch_add(1, Ordering::Relaxed);
            IntegrityWarning::NegativeGlobalValue { value }.report();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::fanout::LocalBroadcaster;
    use crate::store::{MemoryBus, MemoryStore};
    use std::time::Duration;

    struct Harness {
        store: Arc<MemoryStore>,
        bus: Arc<MemoryBus>,
        broadcaster: Arc<LocalBroadcaster>,
        coordinator: Arc<CounterCoordinator>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryBus::new());
        let broadcaster = Arc::new(LocalBroadcaster::new());
        let coordinator = Arc::new(CounterCoordinator::new(
            store.clone(),
            bus.clone(),
            broadcaster.clone(),
            Arc::new(LocalSessionTracker::new()),
            &StoreConfig::default(),
        ));
        Harness { store, bus, broadcaster, coordinator }
    }

    const KEY: &str = "chat:connection-count";
    const CHANNEL: &str = "chat:connection-count-updated";

    #[tokio::test]
    async fn test_initialize_creates_once() {
        let h = harness();
        assert_eq!(h.coordinator.initialize().await.unwrap(), InitOutcome::Created);
        assert_eq!(h.store.peek(KEY), Some(0));

        h.coordinator.on_local_connect().await.unwrap();
        assert_eq!(h.coordinator.initialize().await.unwrap(), InitOutcome::Existing(1));
        assert_eq!(h.store.peek(KEY), Some(1));
    }

    #[tokio::test]
    async fn test_connect_publishes_new_value() {
        let h = harness();
        h.coordinator.initialize().await.unwrap();

        assert_eq!(h.coordinator.on_local_connect().await.unwrap(), 1);
        assert_eq!(h.coordinator.on_local_connect().await.unwrap(), 2);
        assert_eq!(h.coordinator.on_local_disconnect().await.unwrap(), Some(1));

        assert_eq!(h.store.peek(KEY), Some(1));
        assert_eq!(h.coordinator.sessions().current_value(), 1);
        assert_eq!(h.bus.published(CHANNEL), vec!["1", "2", "1"]);
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let h = harness();
        h.store.set_unavailable(true);

        let err = h.coordinator.on_local_connect().await.unwrap_err();
        assert!(matches!(err, CounterError::StoreUnavailable(_)));
        assert!(!err.mutation_applied());
        assert_eq!(h.coordinator.sessions().current_value(), 0);
        assert!(h.bus.published(CHANNEL).is_empty());
    }

    #[tokio::test]
    async fn test_bus_failure_after_increment() {
        let h = harness();
        h.bus.set_unavailable(true);

        let err = h.coordinator.on_local_connect().await.unwrap_err();
        assert!(err.mutation_applied());
        assert_eq!(h.store.peek(KEY), Some(1));
        assert_eq!(h.coordinator.sessions().current_value(), 1);
    }

    #[tokio::test]
    async fn test_extra_disconnect_is_flagged_not_clamped() {
        let h = harness();
        h.coordinator.initialize().await.unwrap();

        h.coordinator.on_local_connect().await.unwrap();
        h.coordinator.on_local_disconnect().await.unwrap();
        assert_eq!(h.coordinator.integrity_warnings(), 0);

        assert_eq!(h.coordinator.on_local_disconnect().await.unwrap(), Some(-1));
        assert_eq!(h.store.peek(KEY), Some(-1));
        assert_eq!(h.coordinator.sessions().current_value(), -1);
        // One for the store value, one for the local count.
        assert_eq!(h.coordinator.integrity_warnings(), 2);
        assert_eq!(h.bus.published(CHANNEL).last().map(String::as_str), Some("-1"));
    }

    #[tokio::test]
    async fn test_sealed_sessions_leave_store_alone() {
        let h = harness();
        h.coordinator.initialize().await.unwrap();
        h.coordinator.on_local_connect().await.unwrap();
        h.coordinator.on_local_connect().await.unwrap();

        assert_eq!(h.coordinator.sessions().seal().await, 2);

        assert_eq!(h.coordinator.on_local_disconnect().await.unwrap(), None);
        let err = h.coordinator.on_local_connect().await.unwrap_err();
        assert!(matches!(err, CounterError::Draining));
        assert!(!err.mutation_applied());

        assert_eq!(h.store.peek(KEY), Some(2));
        assert_eq!(h.coordinator.sessions().current_value(), 2);
        assert_eq!(h.bus.published(CHANNEL), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_remote_event_forwarded_verbatim() {
        let h = harness();
        let mut client = h.broadcaster.subscribe();

        h.coordinator.on_remote_change_event(ChangeEvent::new(17));
        h.coordinator.on_remote_change_event(ChangeEvent::new(17));

        for _ in 0..2 {
            let message = client.recv().await.unwrap();
            assert_eq!(message.channel, CHANNEL);
            assert_eq!(message.event, ChangeEvent::new(17));
        }
        assert_eq!(h.coordinator.last_seen(), Some(17));
    }

    #[tokio::test]
    async fn test_malformed_message_skipped() {
        let h = harness();
        let mut client = h.broadcaster.subscribe();

        h.coordinator.handle_bus_message("not-a-number");
        h.coordinator.handle_bus_message("5");

        assert_eq!(client.recv().await.unwrap().event, ChangeEvent::new(5));
        assert_eq!(h.coordinator.last_seen(), Some(5));
    }

    #[tokio::test]
    async fn test_relay_resubscribes_after_loss() {
        let h = harness();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut client = h.broadcaster.subscribe();

        let subscription = h.coordinator.subscribe().await.unwrap();
        let relay = tokio::spawn(h.coordinator.clone().run_relay(
            subscription,
            Backoff::new(10, 20),
            shutdown_rx,
        ));

        h.coordinator.on_local_connect().await.unwrap();
        assert_eq!(client.recv().await.unwrap().event.value, 1);

        h.bus.close_subscriptions();
        tokio::time::sleep(Duration::from_millis(100)).await;

        h.coordinator.on_local_connect().await.unwrap();
        let message = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.event.value, 2);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), relay).await.unwrap().unwrap();
    }
}
