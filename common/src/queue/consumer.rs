// Notification consumer for NATS JetStream

use crate::errors::QueueError;
use crate::queue::nats::NatsClient;
use crate::queue::{Consumer, Delivery, DeliveryStream};
use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::{AckKind, Message};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Durable pull consumer feeding a bounded delivery channel
pub struct NatsConsumer {
    consumer: PullConsumer,
    buffer: usize,
    closed: CancellationToken,
}

impl NatsConsumer {
    /// Bind to the durable consumer, creating it if missing
    #[instrument(skip(client))]
    pub async fn new(client: &NatsClient, buffer: usize) -> Result<Self, QueueError> {
        let consumer = client.get_or_create_consumer().await?;
        Ok(Self {
            consumer,
            buffer: buffer.max(1),
            closed: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl Consumer for NatsConsumer {
    #[instrument(skip(self, token))]
    async fn consume(&self, token: CancellationToken) -> Result<DeliveryStream, QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed);
        }

        let mut messages = self.consumer.messages().await.map_err(|e| {
            QueueError::ConsumeFailed(format!("Failed to create message stream: {}", e))
        })?;

        let (tx, rx) = mpsc::channel::<Box<dyn Delivery>>(self.buffer);
        let closed = self.closed.clone();

        tokio::spawn(async move {
            info!("Consumer started, waiting for messages");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = closed.cancelled() => break,
                    next = messages.next() => match next {
                        Some(Ok(message)) => {
                            // Unsettled messages are redelivered after ack_wait
                            if tx.send(Box::new(NatsDelivery::new(message))).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Error receiving message");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        None => {
                            warn!("Message stream ended unexpectedly");
                            break;
                        }
                    },
                }
            }
            info!("Consumer stopped");
        });

        Ok(rx)
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.cancel();
        Ok(())
    }
}

/// Maps delivery settlement onto JetStream ack kinds.
///
/// JetStream has no batch acknowledgement, so `multiple` settles only this
/// message.
pub struct NatsDelivery {
    message: Message,
}

impl NatsDelivery {
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    async fn settle(&self, kind: AckKind) -> Result<(), QueueError> {
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| QueueError::AckFailed(format!("Failed to settle message: {}", e)))
    }
}

#[async_trait]
impl Delivery for NatsDelivery {
    fn body(&self) -> &[u8] {
        &self.message.payload
    }

    async fn ack(&self, _multiple: bool) -> Result<(), QueueError> {
        self.settle(AckKind::Ack).await
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.settle(settle_kind(requeue)).await
    }

    async fn nack(&self, _multiple: bool, requeue: bool) -> Result<(), QueueError> {
        self.settle(settle_kind(requeue)).await
    }
}

/// Requeue asks for redelivery; otherwise the message is dropped for good
fn settle_kind(requeue: bool) -> AckKind {
    if requeue {
        AckKind::Nak(None)
    } else {
        AckKind::Term
    }
}
