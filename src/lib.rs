//! Distributed live connection counter.
//!
//! Keeps one global count of connected WebSocket clients across many
//! stateless instances, broadcasts every change to all clients, and removes
//! a terminating instance's clients from the count before it exits.

pub mod config;
pub mod counter;
pub mod http;
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::AppConfig;
pub use counter::{CounterCoordinator, LocalSessionTracker, ShutdownReconciler};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
