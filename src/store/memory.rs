//! In-process store and bus.
//!
//! Used by tests and by single-node development (`memory://`). Several
//! servers in one process can share one instance to behave like separate
//! processes against one Redis. Failure and latency can be injected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;

use crate::counter::{BusSubscription, ChangeBus, CounterError, CounterResult, CounterStore};

const CHANNEL_CAPACITY: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared counter store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, i64>>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Read a value without going through the async contract.
    pub fn peek(&self, key: &str) -> Option<i64> {
        lock(&self.values).get(key).copied()
    }

    async fn enter(&self) -> CounterResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CounterError::StoreUnavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }

    fn add(&self, key: &str, delta: i64) -> i64 {
        let mut values = lock(&self.values);
        let value = values.entry(key.to_string()).or_insert(0);
        *value += delta;
        *value
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> CounterResult<Option<i64>> {
        self.enter().await?;
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: i64) -> CounterResult<()> {
        self.enter().await?;
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: i64) -> CounterResult<bool> {
        self.enter().await?;
        let mut values = lock(&self.values);
        if values.contains_key(key) {
            return Ok(false);
        }
        values.insert(key.to_string(), value);
        Ok(true)
    }

    async fn incr(&self, key: &str) -> CounterResult<i64> {
        self.enter().await?;
        Ok(self.add(key, 1))
    }

    async fn decr(&self, key: &str) -> CounterResult<i64> {
        self.enter().await?;
        Ok(self.add(key, -1))
    }
}

/// Publish/subscribe bus held in memory.
#[derive(Debug, Default)]
pub struct MemoryBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    published: Mutex<Vec<(String, String)>>,
    unavailable: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish/subscribe fail with `BusUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// End every open subscription, as a dropped connection would.
    pub fn close_subscriptions(&self) {
        lock(&self.channels).clear();
    }

    /// Messages published on `channel`, oldest first.
    pub fn published(&self, channel: &str) -> Vec<String> {
        lock(&self.published)
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn check(&self) -> CounterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CounterError::BusUnavailable("memory bus marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeBus for MemoryBus {
    async fn publish(&self, channel: &str, message: String) -> CounterResult<()> {
        self.check()?;
        lock(&self.published).push((channel.to_string(), message.clone()));
        if let Some(tx) = lock(&self.channels).get(channel) {
            // No receivers is not an error for pub/sub.
            let _ = tx.send(message);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> CounterResult<BusSubscription> {
        self.check()?;
        let rx = lock(&self.channels)
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let messages = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(messages.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_operations() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", 0).await.unwrap());
        assert!(!store.set_if_absent("k", 5).await.unwrap());
        assert_eq!(store.incr("k").await.unwrap(), 1);
        assert_eq!(store.incr("k").await.unwrap(), 2);
        assert_eq!(store.decr("k").await.unwrap(), 1);
        store.set("k", 10).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_store_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.incr("k").await, Err(CounterError::StoreUnavailable(_))));
        assert_eq!(store.peek("k"), None);

        store.set_unavailable(false);
        assert_eq!(store.incr("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bus_delivers_to_all_subscribers() {
        let bus = MemoryBus::new();
        let mut a = bus.subscribe("updates").await.unwrap();
        let mut b = bus.subscribe("updates").await.unwrap();

        bus.publish("updates", "4".into()).await.unwrap();
        bus.publish("other", "9".into()).await.unwrap();

        assert_eq!(a.next().await.unwrap(), "4");
        assert_eq!(b.next().await.unwrap(), "4");
        assert_eq!(bus.published("updates"), vec!["4".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_subscription_ends() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe("updates").await.unwrap();
        bus.close_subscriptions();
        assert!(sub.next().await.is_none());
    }
}
