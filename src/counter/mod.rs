//! Distributed connection counter protocol.
//!
//! # Data Flow
//! ```text
//! Client connect (transport)
//!     → coordinator.rs: INCR store → session.rs +1 → publish value
//!
//! Client disconnect (transport)
//!     → coordinator.rs: session.rs -1 → DECR store → publish value
//!
//! Change bus message (any process)
//!     → coordinator.rs relay → fanout.rs → every local client
//!
//! Graceful termination
//!     → session.rs seal (no further store updates from this process)
//!     → reconcile.rs: store -= local sessions (floor 0) → publish value
//! ```
//!
//! # Design Decisions
//! - The store is the only writable copy of the count
//! - Change events carry absolute values, so duplicates are harmless
//! - Integrity problems are logged and counted, never thrown

pub mod bus;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod fanout;
pub mod reconcile;
pub mod session;
pub mod store;

pub use bus::{BusSubscription, ChangeBus};
pub use coordinator::{CounterCoordinator, InitOutcome};
pub use error::{CounterError, CounterResult, IntegrityWarning};
pub use event::ChangeEvent;
pub use fanout::{Fanout, FanoutMessage, LocalBroadcaster};
pub use reconcile::{ReconcileOutcome, ShutdownReconciler};
pub use session::{LocalSessionTracker, MutationPermit};
pub use store::CounterStore;
