//! Redis-backed store and bus.
//!
//! # Responsibilities
//! - Run counter commands over one multiplexed connection
//! - Publish change events on the same connection
//! - Open a dedicated pub/sub connection per subscription
//!
//! # Design Decisions
//! - `SETNX` gives atomic set-if-absent for cold-start initialization
//! - `INCRBY`/`DECRBY` return the post-mutation value in one round-trip
//! - Type errors (non-integer value under the key) map to `MalformedValue`

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ErrorKind, RedisError};

use crate::counter::{BusSubscription, ChangeBus, CounterError, CounterResult, CounterStore};

fn store_error(e: RedisError) -> CounterError {
    match e.kind() {
        ErrorKind::TypeError => CounterError::MalformedValue(e.to_string()),
        _ => CounterError::StoreUnavailable(e.to_string()),
    }
}

fn bus_error(e: RedisError) -> CounterError {
    CounterError::BusUnavailable(e.to_string())
}

/// Open a client for `url`. Only parses the address; no I/O happens here.
pub fn open_client(url: &str) -> CounterResult<Client> {
    Client::open(url).map_err(|e| CounterError::StoreUnavailable(format!("invalid store address: {}", e)))
}

/// Counter store on a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect a multiplexed command connection.
    pub async fn connect(client: &Client) -> CounterResult<Self> {
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error)?;
        tracing::info!(addr = ?client.get_connection_info().addr, "Connected to counter store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> CounterResult<Option<i64>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(store_error)
    }

    async fn set(&self, key: &str, value: i64) -> CounterResult<()> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await.map_err(store_error)
    }

    async fn set_if_absent(&self, key: &str, value: i64) -> CounterResult<bool> {
        let mut conn = self.conn.clone();
        conn.set_nx(key, value).await.map_err(store_error)
    }

    async fn incr(&self, key: &str) -> CounterResult<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, 1).await.map_err(store_error)
    }

    async fn decr(&self, key: &str) -> CounterResult<i64> {
        let mut conn = self.conn.clone();
        conn.decr(key, 1).await.map_err(store_error)
    }
}

/// Change bus on Redis pub/sub.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    conn: MultiplexedConnection,
}

impl RedisBus {
    /// Publishing reuses `conn`; subscriptions get their own connection from
    /// `client` because a subscribed connection cannot issue commands.
    pub fn new(client: Client, conn: MultiplexedConnection) -> Self {
        Self { client, conn }
    }

    pub async fn connect(client: Client) -> CounterResult<Self> {
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(bus_error)?;
        Ok(Self::new(client, conn))
    }
}

#[async_trait]
impl ChangeBus for RedisBus {
    async fn publish(&self, channel: &str, message: String) -> CounterResult<()> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, message).await.map_err(bus_error)?;
        tracing::trace!(channel, receivers, "Published change event");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> CounterResult<BusSubscription> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(bus_error)?;
        pubsub.subscribe(channel).await.map_err(bus_error)?;
        tracing::info!(channel, "Subscribed to change bus");

        let messages = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable bus message");
                    None
                }
            }
        });
        Ok(messages.boxed())
    }
}
