// In-memory event store with by-ID, by-user and start-ordered indices

use crate::errors::StoreError;
use crate::models::Event;
use crate::storage::repository::EventRepository;
use crate::storage::window::TimeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Ordering key for the start-time indices; the ID breaks ties between equal starts
type StartKey = (DateTime<Utc>, Uuid);

/// All indices over the event set. Only ever mutated under the write guard.
#[derive(Debug, Default)]
struct Indices {
    by_id: HashMap<Uuid, Event>,
    by_user: HashMap<String, BTreeSet<StartKey>>,
    by_start: BTreeSet<StartKey>,
}

impl Indices {
    fn insert(&mut self, event: Event) {
        let key = (event.starts_at, event.id);
        self.by_user
            .entry(event.user_id.clone())
            .or_default()
            .insert(key);
        self.by_start.insert(key);
        self.by_id.insert(event.id, event);
    }

    fn remove(&mut self, id: &Uuid) -> Option<Event> {
        let event = self.by_id.remove(id)?;
        let key = (event.starts_at, event.id);
        if let Some(keys) = self.by_user.get_mut(&event.user_id) {
            keys.remove(&key);
            if keys.is_empty() {
                self.by_user.remove(&event.user_id);
            }
        }
        self.by_start.remove(&key);
        Some(event)
    }

    fn collect(&self, keys: impl Iterator<Item = StartKey>) -> impl Iterator<Item = &Event> {
        keys.filter_map(move |(_, id)| self.by_id.get(&id))
    }
}

/// Range of keys that start strictly before `end`
fn starting_before(end: DateTime<Utc>) -> (Bound<StartKey>, Bound<StartKey>) {
    (Bound::Unbounded, Bound::Excluded((end, Uuid::nil())))
}

/// In-memory `EventRepository`.
///
/// One `RwLock` guards every index, so each mutation lands in all of them
/// inside a single critical section.
#[derive(Debug, Default)]
pub struct MemoryEventRepository {
    indices: RwLock<Indices>,
    connected: AtomicBool,
}

impl MemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub async fn len(&self) -> usize {
        self.indices.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Check that every index references exactly the stored event set
    pub async fn indices_consistent(&self) -> bool {
        let indices = self.indices.read().await;
        let user_total: usize = indices.by_user.values().map(BTreeSet::len).sum();
        indices.by_start.len() == indices.by_id.len()
            && user_total == indices.by_id.len()
            && indices.by_start.iter().all(|(starts_at, id)| {
                indices
                    .by_id
                    .get(id)
                    .is_some_and(|event| event.starts_at == *starts_at)
            })
            && indices.by_user.iter().all(|(user_id, keys)| {
                !keys.is_empty()
                    && keys.iter().all(|(_, id)| {
                        indices
                            .by_id
                            .get(id)
                            .is_some_and(|event| &event.user_id == user_id)
                    })
            })
    }
}

#[async_trait]
impl EventRepository for MemoryEventRepository {
    async fn connect(&self, _dsn: &str) -> Result<(), StoreError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyConnected);
        }
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    #[instrument(skip(self, event), fields(user_id = %event.user_id))]
    async fn create_event(&self, mut event: Event) -> Result<Event, StoreError> {
        event.validate()?;
        event.id = Uuid::new_v4();
        event.processed = false;

        let mut indices = self.indices.write().await;
        if indices.by_id.contains_key(&event.id) {
            return Err(StoreError::AlreadyExists(event.id));
        }
        indices.insert(event.clone());

        debug!(event_id = %event.id, "Event created");
        Ok(event)
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn update_event(&self, mut event: Event) -> Result<(), StoreError> {
        event.validate()?;

        let mut indices = self.indices.write().await;
        let previous = indices
            .remove(&event.id)
            .ok_or(StoreError::NotFound(event.id))?;
        event.processed = previous.processed;
        indices.insert(event);

        debug!("Event updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, id: Uuid) -> Result<(), StoreError> {
        let mut indices = self.indices.write().await;
        indices.remove(&id).ok_or(StoreError::NotFound(id))?;

        debug!("Event deleted");
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Event, StoreError> {
        self.indices
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    #[instrument(skip(self))]
    async fn read_events_in_window(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<Event>, StoreError> {
        let indices = self.indices.read().await;
        let Some(keys) = indices.by_user.get(user_id) else {
            return Ok(Vec::new());
        };

        let events = indices
            .collect(keys.range(starting_before(window.end)).copied())
            .filter(|event| window.overlaps(event.starts_at, event.ends_at))
            .cloned()
            .collect();
        Ok(events)
    }

    #[instrument(skip(self))]
    async fn read_events_to_notify(&self, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        let indices = self.indices.read().await;
        let events: Vec<Event> = indices
            .collect(indices.by_start.iter().copied())
            .filter(|event| event.is_notify_due(now))
            .cloned()
            .collect();

        debug!(count = events.len(), "Found events due for notification");
        Ok(events)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn set_events_processed_status(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut indices = self.indices.write().await;
        for id in ids {
            // Only the flag changes, so the ordered indices stay valid
            if let Some(event) = indices.by_id.get_mut(id) {
                event.processed = true;
            }
        }
        Ok(())
    }
}
