//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Coordinator, reconciler, transport produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Client ID flows through every per-connection log line
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
