//! Broadcast fan-out to locally connected clients.

use tokio::sync::broadcast;

use crate::counter::event::ChangeEvent;

const FANOUT_CAPACITY: usize = 64;

/// Transport capability to emit an event to every local client.
pub trait Fanout: Send + Sync {
    fn broadcast_to_all_local_clients(&self, channel: &str, event: ChangeEvent);
}

/// One fan-out delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutMessage {
    pub channel: String,
    pub event: ChangeEvent,
}

/// Fan-out over a tokio broadcast channel; each client holds a receiver.
///
/// A lagging receiver skips stale values. Every value is a full replacement,
/// so only the newest one matters.
pub struct LocalBroadcaster {
    tx: broadcast::Sender<FanoutMessage>,
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FANOUT_CAPACITY);
        Self { tx }
    }

    /// New client subscribes to the broadcast stream.
    pub fn subscribe(&self) -> broadcast::Receiver<FanoutMessage> {
        self.tx.subscribe()
    }

    /// Number of clients currently subscribed.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Fanout for LocalBroadcaster {
    fn broadcast_to_all_local_clients(&self, channel: &str, event: ChangeEvent) {
        // Err only means nobody is attached right now.
        let _ = self.tx.send(FanoutMessage {
            channel: channel.to_string(),
            event,
        });
    }
}
