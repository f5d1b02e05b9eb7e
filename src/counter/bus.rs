//! Change bus contract.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::counter::error::CounterResult;

/// Raw messages received on a subscribed channel.
///
/// The stream ends when the underlying subscription is lost.
pub type BusSubscription = BoxStream<'static, String>;

/// Publish/subscribe channel shared by every process.
#[async_trait]
pub trait ChangeBus: Send + Sync {
    /// Deliver `message` to every current subscriber of `channel`.
    async fn publish(&self, channel: &str, message: String) -> CounterResult<()>;

    /// Subscribe to `channel`. The subscription is active once this returns.
    async fn subscribe(&self, channel: &str) -> CounterResult<BusSubscription>;
}
