//! Startup orchestration.
//!
//! # Responsibilities
//! - Wire the counter core to the store, bus and fan-out
//! - Initialize the global counter key
//! - Subscribe to the change bus before any client is accepted
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and the process exits non-zero
//! - The subscription is live before the listener serves, so the first
//!   client sees its own connect

use std::sync::Arc;

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::config::AppConfig;
use crate::counter::{
    BusSubscription, CounterCoordinator, CounterError, InitOutcome, LocalBroadcaster,
    LocalSessionTracker, ShutdownReconciler,
};
use crate::lifecycle::state::Lifecycle;
use crate::store::Backends;

/// Conditions that stop the process before it serves anything.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot reach counter store: {0}")]
    Store(CounterError),

    #[error("counter initialization failed: {0}")]
    Initialize(CounterError),

    #[error("change bus subscription failed: {0}")]
    Subscribe(CounterError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the transport needs, fully initialized.
pub struct Services {
    pub config: AppConfig,
    pub coordinator: Arc<CounterCoordinator>,
    pub reconciler: Arc<ShutdownReconciler>,
    pub broadcaster: Arc<LocalBroadcaster>,
    pub lifecycle: Lifecycle,
    pub subscription: BusSubscription,
    pub init: InitOutcome,
}

/// Build and initialize the counter services on top of `backends`.
pub async fn prepare(config: AppConfig, backends: Backends) -> Result<Services, StartupError> {
    let lifecycle = Lifecycle::new();
    let sessions = Arc::new(LocalSessionTracker::new());
    let broadcaster = Arc::new(LocalBroadcaster::new());

    let coordinator = Arc::new(CounterCoordinator::new(
        backends.store.clone(),
        backends.bus.clone(),
        broadcaster.clone(),
        sessions.clone(),
        &config.store,
    ));
    let reconciler = Arc::new(ShutdownReconciler::new(
        backends.store,
        backends.bus,
        sessions,
        &config.store,
    ));

    let init = coordinator.initialize().await.map_err(StartupError::Initialize)?;
    let subscription = coordinator.subscribe().await.map_err(StartupError::Subscribe)?;

    tracing::info!(
        key = %config.store.counter_key,
        channel = %config.store.updates_channel,
        init = ?init,
        "Counter services ready"
    );

    Ok(Services {
        config,
        coordinator,
        reconciler,
        broadcaster,
        lifecycle,
        subscription,
        init,
    })
}
