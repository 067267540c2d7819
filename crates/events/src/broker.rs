//! Named-channel publish/subscribe transport.
//!
//! [`InMemoryBroker`] keeps one `tokio::sync::broadcast` sender per channel
//! name. A channel exists only while it has at least one [`Subscription`]:
//! the first subscribe creates it and dropping the last subscription
//! removes it. Publishing to a channel nobody listens on drops the payload
//! and reports zero receivers; nothing is buffered for later subscribers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

/// Default per-channel buffer. Slow subscribers that fall further behind
/// skip the oldest messages.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broker tuning loaded from the environment.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl BrokerConfig {
    /// | Env Var            | Default |
    /// |--------------------|---------|
    /// | `CHANNEL_CAPACITY` | `256`   |
    pub fn from_env() -> Self {
        let channel_capacity = std::env::var("CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY);
        Self { channel_capacity }
    }
}

/// Errors from the broker transport itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("broker transport failure: {0}")]
    Transport(String),
}

/// The subscription's channel went away (transport disconnect).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("channel {0} closed")]
    Closed(String),
}

/// Publish/subscribe over named channels.
#[async_trait]
pub trait ChannelBroker: Send + Sync {
    /// Deliver `payload` to every current subscriber of `channel`.
    /// Returns the number of subscribers reached.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError>;

    /// Start receiving every payload published to `channel` from now on.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;
}

type ChannelTable = RwLock<HashMap<String, broadcast::Sender<String>>>;

/// In-process broker. Cheap to clone; clones share the same channels.
#[derive(Clone)]
pub struct InMemoryBroker {
    // std lock: `Subscription::drop` must prune synchronously.
    channels: Arc<ChannelTable>,
    capacity: usize,
}

impl InMemoryBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: config.channel_capacity.max(1),
        }
    }

    /// Number of channels that currently have subscribers.
    pub fn channel_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Drop the channel's sender so every subscription on it observes
    /// [`SubscriptionError::Closed`]. Returns `false` if the channel did not
    /// exist.
    pub fn close_channel(&self, channel: &str) -> bool {
        let removed = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel)
            .is_some();
        if removed {
            tracing::info!(channel, "Channel closed");
        }
        removed
    }

    /// Close every channel.
    pub fn shutdown(&self) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let count = channels.len();
        channels.clear();
        tracing::info!(count, "Closed all broker channels");
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(&BrokerConfig::default())
    }
}

#[async_trait]
impl ChannelBroker for InMemoryBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BrokerError> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = channels.get(channel) else {
            tracing::trace!(channel, "Publish with no subscribers dropped");
            return Ok(0);
        };
        // A SendError only means every receiver is gone.
        Ok(sender.send(payload).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let receiver = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        tracing::debug!(channel, "Subscribed");
        Ok(Subscription {
            channel: channel.to_string(),
            receiver: Some(receiver),
            table: Arc::downgrade(&self.channels),
        })
    }
}

/// A live subscription to one channel. Dropping it unsubscribes.
pub struct Subscription {
    channel: String,
    receiver: Option<broadcast::Receiver<String>>,
    table: std::sync::Weak<ChannelTable>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next payload.
    ///
    /// Cancel-safe. If this subscription fell behind, the skipped messages
    /// are logged and delivery continues with the oldest retained one.
    pub async fn recv(&mut self) -> Result<String, SubscriptionError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(SubscriptionError::Closed(self.channel.clone()));
        };
        loop {
            match receiver.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        skipped,
                        "Subscription lagged, messages were dropped",
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SubscriptionError::Closed(self.channel.clone()));
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut channels = table.write().unwrap_or_else(PoisonError::into_inner);
        // Release the receiver while holding the lock so concurrent drops
        // observe each other's counts.
        drop(self.receiver.take());
        let empty = channels
            .get(&self.channel)
            .is_some_and(|sender| sender.receiver_count() == 0);
        if empty {
            channels.remove(&self.channel);
            tracing::debug!(channel = %self.channel, "Unsubscribed, channel removed");
        }
    }
}
