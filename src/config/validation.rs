//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject a missing or unsupported store address
//! - Validate value ranges (timeouts > 0, non-empty key and channel)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// Store URL schemes the service knows how to connect to.
pub const SUPPORTED_SCHEMES: &[&str] = &["redis", "rediss", "memory"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.store.url.trim().is_empty() {
        errors.push(ValidationError::new("store.url", "store address is required"));
    } else {
        match url::Url::parse(&config.store.url) {
            Ok(parsed) if SUPPORTED_SCHEMES.contains(&parsed.scheme()) => {}
            Ok(parsed) => errors.push(ValidationError::new(
                "store.url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "store.url",
                format!("invalid address: {}", e),
            )),
        }
    }

    if config.store.counter_key.is_empty() {
        errors.push(ValidationError::new("store.counter_key", "must not be empty"));
    }
    if config.store.updates_channel.is_empty() {
        errors.push(ValidationError::new("store.updates_channel", "must not be empty"));
    }
    if config.store.call_timeout_ms == 0 {
        errors.push(ValidationError::new("store.call_timeout_ms", "must be greater than 0"));
    }
    if config.store.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("store.connect_timeout_ms", "must be greater than 0"));
    }
    if config.shutdown.grace_period_ms == 0 {
        errors.push(ValidationError::new("shutdown.grace_period_ms", "must be greater than 0"));
    }
    if config.relay.reconnect_base_delay_ms > config.relay.reconnect_max_delay_ms {
        errors.push(ValidationError::new(
            "relay.reconnect_base_delay_ms",
            "must not exceed reconnect_max_delay_ms",
        ));
    }
    if config.cors.allowed_origin.parse::<axum::http::HeaderValue>().is_err() {
        errors.push(ValidationError::new("cors.allowed_origin", "not a valid header value"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
