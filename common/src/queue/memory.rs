// In-process notification queue over a bounded channel

use crate::errors::QueueError;
use crate::queue::{Consumer, Delivery, DeliveryStream, Publisher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Settlement counters, shared by the queue and its deliveries
#[derive(Debug, Default)]
pub struct QueueStats {
    published: AtomicUsize,
    acked: AtomicUsize,
    rejected: AtomicUsize,
    requeued: AtomicUsize,
}

impl QueueStats {
    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    /// Deliveries dropped without requeue
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    pub fn requeued(&self) -> usize {
        self.requeued.load(Ordering::SeqCst)
    }
}

/// Bounded in-memory queue implementing both sides of the boundary.
///
/// Requeued deliveries travel on a separate unbounded channel and are
/// redelivered ahead of newly published ones, so a requeue never fails
/// for lack of capacity.
pub struct MemoryQueue {
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    receiver: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    requeue: mpsc::UnboundedSender<Vec<u8>>,
    requeued: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    consuming: AtomicBool,
    closed: CancellationToken,
    stats: Arc<QueueStats>,
}

impl MemoryQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (requeue_tx, requeue_rx) = mpsc::unbounded_channel();
        Self {
            capacity,
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(Mutex::new(rx)),
            requeue: requeue_tx,
            requeued: Arc::new(Mutex::new(requeue_rx)),
            consuming: AtomicBool::new(false),
            closed: CancellationToken::new(),
            stats: Arc::new(QueueStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Publisher for MemoryQueue {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        let sender = self.sender.lock().await.clone().ok_or(QueueError::Closed)?;
        sender
            .send(payload.to_vec())
            .await
            .map_err(|_| QueueError::Closed)?;

        self.stats.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.sender.lock().await.take();
        Ok(())
    }
}

#[async_trait]
impl Consumer for MemoryQueue {
    #[instrument(skip(self, token))]
    async fn consume(&self, token: CancellationToken) -> Result<DeliveryStream, QueueError> {
        if self.closed.is_cancelled() {
            return Err(QueueError::Closed);
        }
        if self.consuming.swap(true, Ordering::SeqCst) {
            return Err(QueueError::ConsumeFailed(
                "Queue already has an active consumer".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel::<Box<dyn Delivery>>(self.capacity);
        let receiver = Arc::clone(&self.receiver);
        let requeued = Arc::clone(&self.requeued);
        let requeue = self.requeue.clone();
        let stats = Arc::clone(&self.stats);
        let closed = self.closed.clone();

        tokio::spawn(async move {
            let mut receiver = receiver.lock().await;
            let mut requeued = requeued.lock().await;
            loop {
                let body = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = closed.cancelled() => break,
                    Some(body) = requeued.recv() => body,
                    body = receiver.recv() => match body {
                        Some(body) => body,
                        None => break,
                    },
                };

                let delivery = MemoryDelivery {
                    body,
                    requeue: requeue.clone(),
                    stats: Arc::clone(&stats),
                    settled: AtomicBool::new(false),
                };
                if tx.send(Box::new(delivery)).await.is_err() {
                    break;
                }
            }
            debug!("Memory consumer stopped");
        });

        Ok(rx)
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.cancel();
        Ok(())
    }
}

struct MemoryDelivery {
    body: Vec<u8>,
    requeue: mpsc::UnboundedSender<Vec<u8>>,
    stats: Arc<QueueStats>,
    settled: AtomicBool,
}

impl MemoryDelivery {
    fn settle_once(&self) -> Result<(), QueueError> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AckFailed("Delivery already settled".to_string()));
        }
        Ok(())
    }

    fn drop_or_requeue(&self, requeue: bool) -> Result<(), QueueError> {
        self.settle_once()?;
        if !requeue {
            self.stats.rejected.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        if let Err(e) = self.requeue.send(self.body.clone()) {
            // Leave the delivery unsettled so the caller may settle it another way
            self.settled.store(false, Ordering::SeqCst);
            warn!(error = %e, "Failed to requeue delivery");
            return Err(QueueError::AckFailed(format!(
                "Failed to requeue delivery: {}",
                e
            )));
        }
        self.stats.requeued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn ack(&self, _multiple: bool) -> Result<(), QueueError> {
        self.settle_once()?;
        self.stats.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.drop_or_requeue(requeue)
    }

    async fn nack(&self, _multiple: bool, requeue: bool) -> Result<(), QueueError> {
        self.drop_or_requeue(requeue)
    }
}
