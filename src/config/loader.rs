//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_VAR: &str = "COUNTER_CONFIG";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => {
                write!(f, "Invalid value for {}: '{}'", var, value)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML config file. Validation happens once the environment has
/// been applied on top.
pub fn read_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Overlay environment variables on top of `config`.
///
/// `lookup` abstracts `std::env::var` so tests don't touch the process
/// environment.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        config.listener.port = port
            .parse()
            .map_err(|_| ConfigError::Env { var: "PORT", value: port })?;
    }
    if let Some(host) = lookup("HOST") {
        config.listener.host = host;
    }
    if let Some(origin) = lookup("CORS_ORIGIN") {
        config.cors.allowed_origin = origin;
    }
    // REDIS_URL wins over the legacy variable name.
    if let Some(url) = lookup("REDIS_URL").or_else(|| lookup("UPSTASH_REDIS_REST_URL")) {
        config.store.url = url;
    }
    if let Some(grace) = lookup("SHUTDOWN_GRACE_MS") {
        config.shutdown.grace_period_ms = grace
            .parse()
            .map_err(|_| ConfigError::Env { var: "SHUTDOWN_GRACE_MS", value: grace })?;
    }
    Ok(())
}

/// Build the configuration from the optional file named by
/// `COUNTER_CONFIG`, then environment overrides, then validation.
pub fn load_with<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match lookup(CONFIG_PATH_VAR) {
        Some(path) => read_config_file(Path::new(&path))?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, &lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// [`load_with`] over the process environment. Empty variables count as unset.
pub fn load_from_environment() -> Result<AppConfig, ConfigError> {
    load_with(|key: &str| std::env::var(key).ok().filter(|v| !v.is_empty()))
}
