//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, CORS, tracing)
//!     → /ws          → websocket.rs (counted client session)
//!     → /healthcheck → status.rs (liveness, port, lifecycle state)
//!     → /count       → status.rs (last value seen on the bus)
//! ```

pub mod server;
pub mod status;
pub mod websocket;

pub use server::{AppState, HttpServer};
