//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, CORS)
//! - Bind server to listener
//! - Run the change relay for the lifetime of the server
//! - Drain: reconcile the counter, then close local sockets

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::counter::{CounterCoordinator, LocalBroadcaster, ShutdownReconciler};
use crate::http::{status, websocket};
use crate::lifecycle::{Lifecycle, Services, Shutdown};
use crate::resilience::backoff::Backoff;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<CounterCoordinator>,
    pub broadcaster: Arc<LocalBroadcaster>,
    pub lifecycle: Lifecycle,
    pub shutdown: Shutdown,
    pub port: u16,
}

/// HTTP/WebSocket server for the connection counter.
pub struct HttpServer {
    services: Services,
    shutdown: Shutdown,
}

impl HttpServer {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            shutdown: Shutdown::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.services.lifecycle.clone()
    }

    pub fn coordinator(&self) -> Arc<CounterCoordinator> {
        self.services.coordinator.clone()
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let cors = match config.cors.allowed_origin.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new().allow_origin(origin),
            Err(_) => {
                tracing::warn!(origin = %config.cors.allowed_origin, "Invalid CORS origin; cross-origin requests disabled");
                CorsLayer::new()
            }
        };

        Router::new()
            .route("/healthcheck", get(status::healthcheck))
            .route("/count", get(status::count))
            .route("/ws", get(websocket::ws_handler))
            .with_state(state)
            .layer(cors.allow_methods([Method::GET]))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `signal` resolves, then drain.
    pub async fn run<F>(self, listener: TcpListener, signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let Services {
            config,
            coordinator,
            reconciler,
            broadcaster,
            lifecycle,
            subscription,
            ..
        } = self.services;
        let shutdown = self.shutdown;

        let relay = tokio::spawn(coordinator.clone().run_relay(
            subscription,
            Backoff::from_config(&config.relay),
            shutdown.subscribe(),
        ));

        let state = AppState {
            coordinator,
            broadcaster,
            lifecycle: lifecycle.clone(),
            shutdown: shutdown.clone(),
            port: addr.port(),
        };
        let app = Self::build_router(&config, state);

        if let Err(e) = lifecycle.mark_running() {
            tracing::warn!(error = %e, "Unexpected lifecycle state at startup");
        }
        tracing::info!(address = %addr, "HTTP server starting");

        let grace = Duration::from_millis(config.shutdown.grace_period_ms);
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(drain(signal, lifecycle, reconciler, shutdown.clone(), grace))
            .await;

        // Also reached when serving failed before any signal.
        shutdown.trigger();
        if let Err(e) = relay.await {
            tracing::error!(error = %e, "Change relay task failed");
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Wait for `signal`, reconcile under the grace period, then tell local
/// sockets to close.
async fn drain<F>(
    signal: F,
    lifecycle: Lifecycle,
    reconciler: Arc<ShutdownReconciler>,
    shutdown: Shutdown,
    grace: Duration,
) where
    F: Future<Output = ()>,
{
    signal.await;
    tracing::info!("Shutting down");
    if let Err(e) = lifecycle.begin_draining() {
        tracing::warn!(error = %e, "Drain requested outside running state");
    }

    let outcome = reconciler.reconcile_within(grace).await;
    tracing::info!(outcome = ?outcome, "Shutdown reconciliation finished");

    if let Err(e) = lifecycle.mark_terminated() {
        tracing::warn!(error = %e, "Unexpected lifecycle state at termination");
    }
    shutdown.trigger();
}
