//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML, path from COUNTER_CONFIG)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (PORT, HOST, CORS_ORIGIN, REDIS_URL, ...)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared by value with all subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - A missing store address is a validation error: counting is meaningless
//!   without the store

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AppConfig;
pub use schema::CorsConfig;
pub use schema::ListenerConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::RelayConfig;
pub use schema::ShutdownConfig;
pub use schema::StoreConfig;
