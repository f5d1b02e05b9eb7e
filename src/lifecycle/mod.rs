//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Connect store/bus → Initialize counter → Subscribe → Serve
//!
//! Shutdown (shutdown.rs, driven by http::server):
//!     Signal received → Draining → Reconcile (bounded) → Terminated
//!     → close local sockets → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful drain
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then store, then listeners
//! - Reconciliation runs before sockets close, under a hard grace period
//! - State transitions are explicit (state.rs) and exposed on /healthcheck

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use shutdown::Shutdown;
pub use startup::{prepare, Services, StartupError};
pub use state::{Lifecycle, LifecycleError, ProcessState};
