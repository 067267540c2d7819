//! Per-job progress channels.
//!
//! - [`ChannelBroker`]: named-channel publish/subscribe transport.
//! - [`InMemoryBroker`]: in-process broker backed by one
//!   `tokio::sync::broadcast` channel per name.
//! - [`BroadcastPublisher`]: serializes [`ProgressEvent`]s onto a job's
//!   channel with a bounded wait.
//!
//! [`ProgressEvent`]: pinrelay_core::messages::ProgressEvent

pub mod broker;
pub mod publisher;

pub use broker::{BrokerConfig, BrokerError, ChannelBroker, InMemoryBroker, Subscription, SubscriptionError};
pub use publisher::{BroadcastPublisher, PublishError};
