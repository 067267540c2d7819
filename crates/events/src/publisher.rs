//! Publishes progress events onto a job's channel.

use std::sync::Arc;
use std::time::Duration;

use pinrelay_core::channels::job_channel;
use pinrelay_core::error::CoreError;
use pinrelay_core::messages::ProgressEvent;
use pinrelay_core::types::JobId;

use crate::broker::{BrokerError, ChannelBroker};

/// Default bound on a single publish call.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("invalid event: {0}")]
    Invalid(#[from] CoreError),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] BrokerError),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

/// Fire-and-forget publisher used by stage-tasks.
///
/// Events published while nobody is subscribed are dropped. Callers treat
/// a [`PublishError`] as non-fatal to the stage.
#[derive(Clone)]
pub struct BroadcastPublisher {
    broker: Arc<dyn ChannelBroker>,
    timeout: Duration,
}

impl BroadcastPublisher {
    pub fn new(broker: Arc<dyn ChannelBroker>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    /// Publish `event` on the job's channel. Returns how many subscribers
    /// received it.
    pub async fn publish(&self, job_id: JobId, event: &ProgressEvent) -> Result<usize, PublishError> {
        event.validate()?;
        let payload = event.to_json()?;
        let channel = job_channel(job_id);

        let reached = tokio::time::timeout(self.timeout, self.broker.publish(&channel, payload))
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))??;

        tracing::debug!(
            %job_id,
            event_type = event.type_name(),
            reached,
            "Event published",
        );
        Ok(reached)
    }
}
