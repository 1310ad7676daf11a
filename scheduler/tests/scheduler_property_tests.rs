// Property-based tests for the notification scheduler

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::errors::QueueError;
use common::models::{Event, Notification};
use common::queue::Publisher;
use common::scheduler::{NotificationScheduler, SchedulerState};
use common::storage::{EventRepository, MemoryEventRepository};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Publisher that keeps every payload it is handed
struct MockPublisher {
    published: tokio::sync::Mutex<Vec<Vec<u8>>>,
}

impl MockPublisher {
    fn new() -> Self {
        Self {
            published: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    async fn published_ids(&self) -> Vec<Uuid> {
        self.published
            .lock()
            .await
            .iter()
            .map(|payload| Notification::from_payload(payload).unwrap().event_id)
            .collect()
    }
}

#[async_trait::async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        self.published.lock().await.push(payload.to_vec());
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// (start offset minutes, duration minutes, notify interval minutes)
fn event_specs() -> impl Strategy<Value = Vec<(i64, i64, u64)>> {
    prop::collection::vec((-240i64..240, 1i64..180, 0u64..120), 0..20)
}

async fn seed(repository: &MemoryEventRepository, specs: &[(i64, i64, u64)]) -> Vec<Event> {
    let mut stored = Vec::new();
    for (i, (offset, length, notify)) in specs.iter().enumerate() {
        let starts_at = base() + Duration::minutes(*offset);
        let event = Event::new(
            format!("user-{}", i % 3),
            format!("event-{i}"),
            starts_at,
            starts_at + Duration::minutes(*length),
        )
        .with_notify_interval(std::time::Duration::from_secs(notify * 60));
        stored.push(repository.create_event(event).await.unwrap());
    }
    stored
}

/// *For any* event set and instant, one tick publishes exactly the events
/// whose notification is due.
#[test]
fn property_tick_publishes_exactly_due_events() {
    proptest!(|(specs in event_specs(), now_offset in -300i64..300)| {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let now = base() + Duration::minutes(now_offset);

        let (expected, published, count) = runtime.block_on(async {
            let repository = Arc::new(MemoryEventRepository::new());
            let stored = seed(&repository, &specs).await;

            let publisher = Arc::new(MockPublisher::new());
            let scheduler = NotificationScheduler::new(
                repository.clone(),
                publisher.clone(),
                std::time::Duration::from_secs(10),
            );
            let count = scheduler.process_due_events(now).await.unwrap();

            let expected: BTreeSet<Uuid> = stored
                .iter()
                .filter(|event| event.is_notify_due(now))
                .map(|event| event.id)
                .collect();
            (expected, publisher.published_ids().await, count)
        });

        prop_assert_eq!(count, expected.len());
        prop_assert_eq!(published.len(), expected.len());
        let published_set: BTreeSet<Uuid> = published.iter().copied().collect();
        prop_assert_eq!(published_set, expected);
    });
}

/// *For any* event set, once every published event is marked processed a
/// second tick at the same instant publishes nothing.
#[test]
fn property_processed_events_are_not_republished() {
    proptest!(|(specs in event_specs(), now_offset in -300i64..300)| {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let now = base() + Duration::minutes(now_offset);

        let (first, second) = runtime.block_on(async {
            let repository = Arc::new(MemoryEventRepository::new());
            seed(&repository, &specs).await;

            let publisher = Arc::new(MockPublisher::new());
            let scheduler = NotificationScheduler::new(
                repository.clone(),
                publisher.clone(),
                std::time::Duration::from_secs(10),
            );

            let first = scheduler.process_due_events(now).await.unwrap();
            let ids = publisher.published_ids().await;
            repository.set_events_processed_status(&ids).await.unwrap();
            let second = scheduler.process_due_events(now).await.unwrap();
            (first, second)
        });

        prop_assert!(first <= specs.len());
        prop_assert_eq!(second, 0);
    });
}

#[tokio::test]
async fn test_tick_returns_to_idle() {
    let repository = Arc::new(MemoryEventRepository::new());
    seed(&repository, &[(10, 60, 15)]).await;

    let scheduler = NotificationScheduler::new(
        repository,
        Arc::new(MockPublisher::new()),
        std::time::Duration::from_secs(10),
    );
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    let count = scheduler
        .process_due_events(base() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);

    scheduler.shutdown().await.unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}
