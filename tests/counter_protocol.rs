//! Protocol properties checked directly against coordinators.

use std::sync::{Arc, Mutex};

use connection_counter::config::StoreConfig;
use connection_counter::counter::{
    ChangeBus, ChangeEvent, CounterCoordinator, CounterStore, Fanout, InitOutcome,
    LocalSessionTracker, ReconcileOutcome, ShutdownReconciler,
};
use connection_counter::resilience::backoff::Backoff;
use tokio::sync::broadcast;

mod common;

use common::{Cluster, CHANNEL, KEY};

/// Fan-out that records everything it is asked to deliver.
#[derive(Default)]
struct RecordingFanout {
    delivered: Mutex<Vec<(String, ChangeEvent)>>,
}

impl RecordingFanout {
    fn values(&self) -> Vec<i64> {
        self.delivered.lock().unwrap().iter().map(|(_, e)| e.value).collect()
    }
}

impl Fanout for RecordingFanout {
    fn broadcast_to_all_local_clients(&self, channel: &str, event: ChangeEvent) {
        self.delivered.lock().unwrap().push((channel.to_string(), event));
    }
}

fn coordinator(cluster: &Cluster, fanout: Arc<RecordingFanout>) -> Arc<CounterCoordinator> {
    Arc::new(CounterCoordinator::new(
        cluster.store.clone(),
        cluster.bus.clone(),
        fanout,
        Arc::new(LocalSessionTracker::new()),
        &StoreConfig::default(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialization_creates_once() {
    let cluster = Cluster::new();
    let coordinators: Vec<_> = (0..16)
        .map(|_| coordinator(&cluster, Arc::new(RecordingFanout::default())))
        .collect();

    let tasks: Vec<_> = coordinators
        .iter()
        .cloned()
        .map(|c| tokio::spawn(async move { c.initialize().await.unwrap() }))
        .collect();

    let mut created = 0;
    for task in tasks {
        if task.await.unwrap() == InitOutcome::Created {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(cluster.count(), Some(0));
}

#[tokio::test]
async fn test_late_start_does_not_reset_live_value() {
    let cluster = Cluster::new();
    let a = coordinator(&cluster, Arc::new(RecordingFanout::default()));
    a.initialize().await.unwrap();
    a.on_local_connect().await.unwrap();
    a.on_local_connect().await.unwrap();

    let b = coordinator(&cluster, Arc::new(RecordingFanout::default()));
    assert_eq!(b.initialize().await.unwrap(), InitOutcome::Existing(2));
    assert_eq!(cluster.count(), Some(2));
}

#[tokio::test]
async fn test_fanout_fidelity_across_processes() {
    let cluster = Cluster::new();
    let (shutdown_tx, _) = broadcast::channel(1);

    let fanout_a = Arc::new(RecordingFanout::default());
    let fanout_b = Arc::new(RecordingFanout::default());
    let a = coordinator(&cluster, fanout_a.clone());
    let b = coordinator(&cluster, fanout_b.clone());

    for c in [&a, &b] {
        let subscription = c.subscribe().await.unwrap();
        tokio::spawn(c.clone().run_relay(subscription, Backoff::new(10, 50), shutdown_tx.subscribe()));
    }

    a.on_local_connect().await.unwrap();
    b.on_local_connect().await.unwrap();
    a.on_local_disconnect().await.unwrap();
    // A value injected by some other publisher is relayed untouched.
    cluster.bus.publish(CHANNEL, "41".into()).await.unwrap();

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while fanout_a.values().len() < 4 || fanout_b.values().len() < 4 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert_eq!(fanout_a.values(), vec![1, 2, 1, 41]);
    assert_eq!(fanout_b.values(), vec![1, 2, 1, 41]);
    assert!(fanout_a
        .delivered
        .lock()
        .unwrap()
        .iter()
        .all(|(channel, _)| channel == CHANNEL));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_more_disconnects_than_connects_is_flagged() {
    let cluster = Cluster::new();
    let c = coordinator(&cluster, Arc::new(RecordingFanout::default()));
    c.initialize().await.unwrap();

    for _ in 0..2 {
        c.on_local_connect().await.unwrap();
    }
    for _ in 0..3 {
        c.on_local_disconnect().await.unwrap();
    }

    assert_eq!(cluster.count(), Some(-1));
    assert!(c.integrity_warnings() >= 1);
    assert_eq!(c.sessions().violations(), 1);
}

#[tokio::test]
async fn test_reconcile_subtracts_exactly_local_sessions() {
    for (global, local) in [(5_i64, 3_i64), (3, 3), (10, 1)] {
        let cluster = Cluster::new();
        cluster.store.set(KEY, global).await.unwrap();

        let sessions = Arc::new(LocalSessionTracker::new());
        for _ in 0..local {
            sessions.increment();
        }
        let reconciler = ShutdownReconciler::new(
            cluster.store.clone(),
            cluster.bus.clone(),
            sessions,
            &StoreConfig::default(),
        );

        let outcome = reconciler.reconcile().await;
        assert!(matches!(outcome, ReconcileOutcome::Corrected { .. }));
        assert_eq!(cluster.count(), Some(global - local));
        assert_eq!(cluster.bus.published(CHANNEL), vec![(global - local).to_string()]);
    }
}
