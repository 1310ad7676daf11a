// Queue boundary between the notification scheduler and the sender

pub mod consumer;
pub mod memory;
pub mod nats;
pub mod publisher;

pub use consumer::{NatsConsumer, NatsDelivery};
pub use memory::{MemoryQueue, QueueStats};
pub use nats::NatsClient;
pub use publisher::NatsPublisher;

use crate::errors::QueueError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Publish side of the notification queue
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Hand a serialized notification to the broker
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError>;

    /// Flush and release the publisher; later publishes fail with `Closed`
    async fn close(&self) -> Result<(), QueueError>;
}

/// A received message awaiting settlement
#[async_trait]
pub trait Delivery: Send + Sync {
    fn body(&self) -> &[u8];

    async fn ack(&self, multiple: bool) -> Result<(), QueueError>;

    async fn reject(&self, requeue: bool) -> Result<(), QueueError>;

    async fn nack(&self, multiple: bool, requeue: bool) -> Result<(), QueueError>;
}

/// Deliveries in arrival order. Closes when the source ends or the consume
/// token is cancelled.
pub type DeliveryStream = mpsc::Receiver<Box<dyn Delivery>>;

/// Consume side of the notification queue
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn consume(&self, token: CancellationToken) -> Result<DeliveryStream, QueueError>;

    async fn close(&self) -> Result<(), QueueError>;
}
