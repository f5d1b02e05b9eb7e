//! Shared utilities for integration tests.
//!
//! Nodes run in this process and share one `MemoryStore`/`MemoryBus`, which
//! behaves like several instances sharing one Redis.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use connection_counter::config::AppConfig;
use connection_counter::counter::CounterCoordinator;
use connection_counter::http::HttpServer;
use connection_counter::lifecycle::{prepare, Lifecycle};
use connection_counter::store::{Backends, MemoryBus, MemoryStore};
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub const KEY: &str = "chat:connection-count";
pub const CHANNEL: &str = "chat:connection-count-updated";

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Store and bus shared by every node of one test.
#[derive(Clone, Default)]
pub struct Cluster {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<MemoryBus>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self) -> Backends {
        Backends {
            store: self.store.clone(),
            bus: self.bus.clone(),
        }
    }

    pub fn count(&self) -> Option<i64> {
        self.store.peek(KEY)
    }

    /// Poll the store until it holds `expected`.
    pub async fn wait_for_store(&self, expected: i64) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.count() != Some(expected) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "store stuck at {:?}, expected {}",
                self.count(),
                expected
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn start_node(&self) -> Node {
        let mut config = AppConfig::default();
        config.store.url = "memory://".into();
        config.shutdown.grace_period_ms = 1_000;
        self.start_node_with(config).await
    }

    pub async fn start_node_with(&self, config: AppConfig) -> Node {
        let services = prepare(config, self.backends()).await.unwrap();
        let server = HttpServer::new(services);
        let coordinator = server.coordinator();
        let lifecycle = server.lifecycle();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .run(listener, async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        Node {
            addr,
            coordinator,
            lifecycle,
            stop: Some(stop_tx),
            handle,
        }
    }
}

/// One running server instance.
pub struct Node {
    pub addr: SocketAddr,
    pub coordinator: Arc<CounterCoordinator>,
    pub lifecycle: Lifecycle,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl Node {
    pub async fn connect(&self) -> Client {
        let (socket, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("websocket handshake failed");
        socket
    }

    /// Send the termination signal and wait for the server to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), &mut self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Next count pushed to `client`.
pub async fn next_count(client: &mut Client) -> i64 {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no update within 5s")
            .expect("socket closed")
            .expect("socket error");
        if !message.is_text() {
            continue;
        }
        let frame: serde_json::Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
        assert_eq!(frame["event"], CHANNEL);
        return frame["data"]["count"].as_i64().expect("count is an integer");
    }
}

/// Read updates until `expected` arrives.
pub async fn wait_for_count(client: &mut Client, expected: i64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        assert!(tokio::time::Instant::now() < deadline, "never saw count {}", expected);
        if next_count(client).await == expected {
            return;
        }
    }
}
