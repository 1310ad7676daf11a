// Notification sender: consumes notifications and marks their events processed

use crate::config::AckPolicy;
use crate::errors::QueueError;
use crate::models::Notification;
use crate::queue::{Consumer, Delivery};
use crate::storage::EventRepository;
use crate::telemetry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// What happened to a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Decoded and the event marked processed
    Processed,
    /// Payload did not decode; rejected without requeue
    Malformed,
    /// Decoded but the store update failed
    StoreFailed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Processed => "processed",
            DeliveryOutcome::Malformed => "malformed",
            DeliveryOutcome::StoreFailed => "store_failed",
        }
    }
}

pub struct NotificationSender {
    repository: Arc<dyn EventRepository>,
    consumer: Arc<dyn Consumer>,
    ack_policy: AckPolicy,
}

impl NotificationSender {
    pub fn new(
        repository: Arc<dyn EventRepository>,
        consumer: Arc<dyn Consumer>,
        ack_policy: AckPolicy,
    ) -> Self {
        Self {
            repository,
            consumer,
            ack_policy,
        }
    }

    /// Consume until the delivery stream closes.
    ///
    /// Cancelling `token` stops new receives; deliveries already handed over
    /// are still settled. Per-delivery failures never end the loop.
    #[instrument(skip(self, token), fields(ack_policy = ?self.ack_policy))]
    pub async fn run(&self, token: CancellationToken) -> Result<(), QueueError> {
        info!("Starting notification sender");
        let mut deliveries = self.consumer.consume(token).await?;

        while let Some(delivery) = deliveries.recv().await {
            let outcome = self.handle_delivery(delivery.as_ref()).await;
            telemetry::record_notification_consumed(outcome.as_str());
        }

        info!("Delivery stream closed, notification sender stopped");
        Ok(())
    }

    /// Decode, mark processed and settle one delivery according to the ack policy
    pub async fn handle_delivery(&self, delivery: &dyn Delivery) -> DeliveryOutcome {
        let notification = match Notification::from_payload(delivery.body()) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, "Dropping malformed notification");
                settle(delivery.reject(false).await, "reject");
                return DeliveryOutcome::Malformed;
            }
        };

        let event_id = notification.event_id;
        debug!(
            event_id = %event_id,
            user_id = %notification.user_id,
            event_title = %notification.event_title,
            event_date = %notification.event_date,
            "Notification received"
        );

        if self.ack_policy == AckPolicy::OnReceipt {
            settle(delivery.ack(false).await, "ack");
        }

        match self.repository.set_events_processed_status(&[event_id]).await {
            Ok(()) => {
                if self.ack_policy == AckPolicy::AfterProcessed {
                    settle(delivery.ack(false).await, "ack");
                }
                info!(event_id = %event_id, "Event marked processed");
                DeliveryOutcome::Processed
            }
            Err(e) => {
                error!(event_id = %event_id, error = %e, "Failed to mark event processed");
                if self.ack_policy == AckPolicy::AfterProcessed {
                    settle(delivery.nack(false, true).await, "nack");
                }
                DeliveryOutcome::StoreFailed
            }
        }
    }

    /// Close the consumer owned by this sender
    pub async fn shutdown(&self) -> Result<(), QueueError> {
        self.consumer.close().await
    }
}

fn settle(result: Result<(), QueueError>, action: &'static str) {
    if let Err(e) = result {
        error!(action = action, error = %e, "Failed to settle delivery");
    }
}
