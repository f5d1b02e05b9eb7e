//! Shared counter store contract.

use async_trait::async_trait;

use crate::counter::error::CounterResult;

/// Key-value store holding the global counter.
///
/// Every call must be atomic across all processes sharing the store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value, or `None` when the key does not exist.
    async fn get(&self, key: &str) -> CounterResult<Option<i64>>;

    /// Unconditional write.
    async fn set(&self, key: &str, value: i64) -> CounterResult<()>;

    /// Write only if the key is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: i64) -> CounterResult<bool>;

    /// Atomic increment by one, returning the new value.
    async fn incr(&self, key: &str) -> CounterResult<i64>;

    /// Atomic decrement by one, returning the new value.
    async fn decr(&self, key: &str) -> CounterResult<i64>;
}
