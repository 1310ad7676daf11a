use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{QueueError, StoreError};

// ============================================================================
// Event Models
// ============================================================================

/// Event is a user-owned time interval with notification metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub user_id: String,
    /// Lead time before `starts_at` at which the notification becomes due
    #[serde(default)]
    pub notify_interval: Duration,
    #[serde(default)]
    pub processed: bool,
}

impl Event {
    /// Build an unsaved event; the store assigns the ID on creation
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            title: title.into(),
            description: String::new(),
            starts_at,
            ends_at,
            user_id: user_id.into(),
            notify_interval: Duration::ZERO,
            processed: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_notify_interval(mut self, notify_interval: Duration) -> Self {
        self.notify_interval = notify_interval;
        self
    }

    /// Check the invariants every stored event must satisfy
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.starts_at >= self.ends_at {
            return Err(StoreError::InvalidEvent(format!(
                "starts_at ({}) must be before ends_at ({})",
                self.starts_at, self.ends_at
            )));
        }
        if self.user_id.is_empty() {
            return Err(StoreError::InvalidEvent("user_id cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Instant at which the notification for this event opens.
    ///
    /// Saturates to the earliest representable instant when the interval
    /// reaches past it, which makes such an event due immediately.
    pub fn notify_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.notify_interval)
            .ok()
            .and_then(|lead| self.starts_at.checked_sub_signed(lead))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Notify-due predicate: unprocessed, lead time elapsed, not yet ended
    pub fn is_notify_due(&self, now: DateTime<Utc>) -> bool {
        !self.processed && self.notify_at() <= now && self.ends_at >= now
    }
}

// ============================================================================
// Notification Models
// ============================================================================

/// Notification is the queue message projected from a due event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event_id: Uuid,
    pub event_title: String,
    pub event_date: DateTime<Utc>,
    pub user_id: String,
}

impl From<&Event> for Notification {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id,
            event_title: event.title.clone(),
            event_date: event.starts_at,
            user_id: event.user_id.clone(),
        }
    }
}

impl Notification {
    /// Serialize for the queue
    pub fn to_payload(&self) -> Result<Vec<u8>, QueueError> {
        serde_json::to_vec(self).map_err(|e| {
            QueueError::SerializationFailed(format!("Failed to serialize notification: {}", e))
        })
    }

    /// Deserialize a queue payload; anything unparseable is a malformed message
    pub fn from_payload(payload: &[u8]) -> Result<Self, QueueError> {
        serde_json::from_slice(payload).map_err(|e| {
            QueueError::MalformedMessage(format!("Failed to deserialize notification: {}", e))
        })
    }
}
