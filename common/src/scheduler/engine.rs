// Notification scheduler: periodic sweep of due events onto the queue

use crate::errors::SchedulerError;
use crate::models::Notification;
use crate::queue::Publisher;
use crate::storage::EventRepository;
use crate::telemetry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Shortest accepted poll interval; `tokio::time::interval` rejects zero
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Where the scheduler is in its tick cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Querying,
    Publishing,
    Stopped,
}

/// Reads due events from the store and publishes one notification per event.
///
/// Publishing is at-least-once: an event stays due until the sender marks it
/// processed, so a later tick may publish it again.
pub struct NotificationScheduler {
    repository: Arc<dyn EventRepository>,
    publisher: Arc<dyn Publisher>,
    poll_interval: Duration,
    state: watch::Sender<SchedulerState>,
}

impl NotificationScheduler {
    pub fn new(
        repository: Arc<dyn EventRepository>,
        publisher: Arc<dyn Publisher>,
        poll_interval: Duration,
    ) -> Self {
        let poll_interval = if poll_interval < MIN_POLL_INTERVAL {
            warn!(?poll_interval, "Poll interval too short, using {:?}", MIN_POLL_INTERVAL);
            MIN_POLL_INTERVAL
        } else {
            poll_interval
        };

        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            repository,
            publisher,
            poll_interval,
            state,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }

    /// Run one tick at `now`. Returns the number of notifications published.
    ///
    /// The first failure aborts the rest of the batch.
    #[instrument(skip(self))]
    pub async fn process_due_events(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let started = Instant::now();

        self.set_state(SchedulerState::Querying);
        let events = self.repository.read_events_to_notify(now).await?;
        telemetry::update_due_events(events.len());

        self.set_state(SchedulerState::Publishing);
        for event in &events {
            let payload = Notification::from(event).to_payload()?;
            self.publisher.publish(&payload).await?;
            telemetry::record_notification_published();
            debug!(event_id = %event.id, user_id = %event.user_id, "Notification published");
        }

        self.set_state(SchedulerState::Idle);
        telemetry::record_tick_duration(started.elapsed().as_secs_f64());
        Ok(events.len())
    }

    /// Tick every poll interval until `token` is cancelled.
    ///
    /// Cancellation is observed between ticks; a tick in progress publishes its
    /// whole batch first. Any tick error stops the loop and is returned.
    #[instrument(
        skip(self, token),
        fields(poll_interval_ms = self.poll_interval.as_millis() as u64)
    )]
    pub async fn run(&self, token: CancellationToken) -> Result<(), SchedulerError> {
        info!("Starting notification scheduler");

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break Ok(());
                }
                _ = ticker.tick() => {
                    match self.process_due_events(Utc::now()).await {
                        Ok(0) => debug!("No events due for notification"),
                        Ok(count) => info!(notifications = count, "Published due notifications"),
                        Err(e) => {
                            error!(error = %e, "Scheduler tick failed");
                            break Err(e);
                        }
                    }
                }
            }
        };

        self.set_state(SchedulerState::Stopped);
        info!("Notification scheduler stopped");
        result
    }

    /// Close the publisher owned by this scheduler
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.set_state(SchedulerState::Stopped);
        self.publisher.close().await?;
        Ok(())
    }
}
