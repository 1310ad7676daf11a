// Repository contract shared by the in-memory and PostgreSQL backends

use crate::errors::StoreError;
use crate::models::Event;
use crate::storage::window::{Period, TimeWindow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

/// EventRepository is the store every component talks to.
///
/// Implementations own the canonical event set and all derived indices.
/// Mutations are atomic across indices: no reader observes a partial update.
/// The store always assigns event IDs on creation; a caller-supplied ID is
/// discarded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Open the backing resource. A second call fails with `AlreadyConnected`.
    async fn connect(&self, dsn: &str) -> Result<(), StoreError>;

    /// Release the backing resource. Safe to call when never connected.
    async fn close(&self);

    /// Store a new event under a freshly generated ID and return the stored record
    async fn create_event(&self, event: Event) -> Result<Event, StoreError>;

    /// Replace the event with the same ID; the stored `processed` flag is kept
    async fn update_event(&self, event: Event) -> Result<(), StoreError>;

    async fn delete_event(&self, id: Uuid) -> Result<(), StoreError>;

    async fn get_event(&self, id: Uuid) -> Result<Event, StoreError>;

    /// Events owned by `user_id` overlapping `window`, ordered by `starts_at`
    async fn read_events_in_window(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<Event>, StoreError>;

    /// Unprocessed events whose notification is due at `now`, ordered by `starts_at`
    async fn read_events_to_notify(&self, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError>;

    /// Mark events processed. Unknown IDs are ignored.
    async fn set_events_processed_status(&self, ids: &[Uuid]) -> Result<(), StoreError>;

    async fn read_daily_events(
        &self,
        user_id: &str,
        date: DateTime<Tz>,
    ) -> Result<Vec<Event>, StoreError> {
        self.read_events_in_window(user_id, TimeWindow::for_period(Period::Daily, &date))
            .await
    }

    async fn read_weekly_events(
        &self,
        user_id: &str,
        date: DateTime<Tz>,
    ) -> Result<Vec<Event>, StoreError> {
        self.read_events_in_window(user_id, TimeWindow::for_period(Period::Weekly, &date))
            .await
    }

    async fn read_monthly_events(
        &self,
        user_id: &str,
        date: DateTime<Tz>,
    ) -> Result<Vec<Event>, StoreError> {
        self.read_events_in_window(user_id, TimeWindow::for_period(Period::Monthly, &date))
            .await
    }
}
