//! Shared counter store and change bus adapters.
//!
//! # Data Flow
//! ```text
//! StoreConfig.url
//!     redis:// | rediss://  → redis.rs (RedisStore + RedisBus)
//!     memory://             → memory.rs (MemoryStore + MemoryBus)
//!     → Backends (trait objects handed to the coordinator)
//! ```
//!
//! # Design Decisions
//! - Store and bus are separate trait objects even when one server backs both
//! - Connection failures at startup are fatal; counting needs the store

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::counter::{ChangeBus, CounterError, CounterResult, CounterStore};

pub use memory::{MemoryBus, MemoryStore};
pub use self::redis::{RedisBus, RedisStore};

/// Store and bus handles for one process.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn CounterStore>,
    pub bus: Arc<dyn ChangeBus>,
}

impl Backends {
    /// Fresh in-memory backends.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            bus: Arc::new(MemoryBus::new()),
        }
    }
}

/// Connect the store and bus named by `config.url`.
pub async fn connect(config: &StoreConfig) -> CounterResult<Backends> {
    let url = url::Url::parse(&config.url)
        .map_err(|e| CounterError::StoreUnavailable(format!("invalid store address: {}", e)))?;

    if url.scheme() == "memory" {
        tracing::warn!("Using in-memory store; counts are not shared with other processes");
        return Ok(Backends::in_memory());
    }

    let client = self::redis::open_client(&config.url)?;
    let timeout_ms = config.connect_timeout_ms;
    let connecting = async {
        let store = RedisStore::connect(&client).await?;
        let bus = RedisBus::connect(client.clone()).await?;
        Ok::<_, CounterError>(Backends {
            store: Arc::new(store),
            bus: Arc::new(bus),
        })
    };

    tokio::time::timeout(Duration::from_millis(timeout_ms), connecting)
        .await
        .map_err(|_| CounterError::Timeout { operation: "store connect", millis: timeout_ms })?
}
