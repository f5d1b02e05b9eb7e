//! Connection Counter
//!
//! A live count of connected clients shared by every instance behind a load
//! balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!          ┌──────────── instance A ────────────┐      ┌──────────── instance B ────────────┐
//!  client ─┼─▶ /ws ─▶ coordinator ─▶ INCR/DECR ─┼──┐ ┌─┼─ INCR/DECR ◀─ coordinator ◀─ /ws ◀─┼─ client
//!          │              ▲          PUBLISH    │  │ │ │  PUBLISH          ▲                 │
//!          │              │                     │  ▼ ▼ │                   │                 │
//!          │         relay + fan-out ◀──────────┼─ store / bus ───────────┼──▶ relay + fan-out│
//!          │                                    │  (Redis)                │                  │
//!          │  shutdown: store -= local sessions │                         │                  │
//!          └────────────────────────────────────┘      └──────────────────────────────────────┘
//! ```

use connection_counter::config::loader::load_from_environment;
use connection_counter::http::HttpServer;
use connection_counter::lifecycle::{prepare, signals, StartupError};
use connection_counter::observability::{logging, metrics};
use connection_counter::store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_from_environment();
    logging::init_logging(
        loaded
            .as_ref()
            .map(|c| c.observability.log_format)
            .unwrap_or_default(),
    );

    tracing::info!("connection-counter v{} starting", env!("CARGO_PKG_VERSION"));

    let config = loaded.map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        StartupError::Config(e)
    })?;

    tracing::info!(
        bind_address = %config.listener.bind_address(),
        cors_origin = %config.cors.allowed_origin,
        grace_period_ms = config.shutdown.grace_period_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let backends = store::connect(&config.store).await.map_err(|e| {
        tracing::error!(error = %e, "Counter store unavailable");
        StartupError::Store(e)
    })?;

    let address = config.listener.bind_address();
    let services = prepare(config, backends).await?;

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address: address.clone(), source })?;

    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(services);
    server.run(listener, signals::wait_for_termination()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
