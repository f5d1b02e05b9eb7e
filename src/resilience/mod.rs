//! Resilience patterns.
//!
//! # Data Flow
//! ```text
//! Change bus subscription lost
//!     → backoff.rs (exponential delay with jitter)
//!     → resubscribe
//!     → reset on success
//! ```
//!
//! # Design Decisions
//! - Jitter spreads reconnects when many instances lose the bus together
//! - Connect/disconnect mutations are never retried here; the transport
//!   decides what to do with a failed count update

pub mod backoff;
