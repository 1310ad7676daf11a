// Notification publisher for NATS JetStream

use crate::errors::QueueError;
use crate::queue::nats::NatsClient;
use crate::queue::Publisher;
use async_nats::jetstream::context::PublishAckFuture;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Publishes notifications and waits for the JetStream ack of each one
pub struct NatsPublisher {
    client: NatsClient,
    subject: String,
    publish_timeout: Duration,
    closed: AtomicBool,
}

impl NatsPublisher {
    pub fn new(client: NatsClient) -> Self {
        let subject = client.publish_subject();
        let publish_timeout = Duration::from_secs(client.settings().publish_timeout_seconds);
        Self {
            client,
            subject,
            publish_timeout,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    #[instrument(skip(self, payload), fields(subject = %self.subject, bytes = payload.len()))]
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let publish_future: PublishAckFuture = self
            .client
            .jetstream()
            .publish(self.subject.clone(), payload.to_vec().into())
            .await
            .map_err(|e| QueueError::PublishFailed(format!("Failed to publish message: {}", e)))?;

        match tokio::time::timeout(self.publish_timeout, publish_future).await {
            Ok(Ok(ack)) => {
                debug!(stream_sequence = ack.sequence, "Notification published");
                Ok(())
            }
            Ok(Err(e)) => Err(QueueError::PublishFailed(format!(
                "Failed to get publish acknowledgment: {}",
                e
            ))),
            Err(_) => Err(QueueError::Timeout(format!(
                "Publish acknowledgment timeout after {:?}",
                self.publish_timeout
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn close(&self) -> Result<(), QueueError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.client
            .client()
            .flush()
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to flush publisher: {}", e)))?;

        info!("Notification publisher closed");
        Ok(())
    }
}
