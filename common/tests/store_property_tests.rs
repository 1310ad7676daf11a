// Property-based tests for the in-memory event store

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::errors::StoreError;
use common::models::Event;
use common::storage::{EventRepository, MemoryEventRepository, TimeWindow};
use proptest::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

#[derive(Debug, Clone)]
enum Op {
    Create { user: u8, offset_hours: i64, length_minutes: i64 },
    Delete { index: usize },
    Move { index: usize, offset_hours: i64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..3, 0i64..24 * 40, 1i64..600).prop_map(
            |(user, offset_hours, length_minutes)| Op::Create {
                user,
                offset_hours,
                length_minutes,
            }
        ),
        1 => any::<usize>().prop_map(|index| Op::Delete { index }),
        1 => (any::<usize>(), 0i64..24 * 40)
            .prop_map(|(index, offset_hours)| Op::Move { index, offset_hours }),
    ]
}

/// Apply `ops`, tracking the live set on the side
async fn apply(repo: &MemoryEventRepository, ops: &[Op]) -> (Vec<Event>, Vec<Uuid>) {
    let mut live: Vec<Event> = Vec::new();
    let mut deleted = Vec::new();

    for op in ops {
        match op {
            Op::Create { user, offset_hours, length_minutes } => {
                let starts_at = base() + Duration::hours(*offset_hours);
                let event = Event::new(
                    format!("user-{user}"),
                    "event",
                    starts_at,
                    starts_at + Duration::minutes(*length_minutes),
                );
                live.push(repo.create_event(event).await.unwrap());
            }
            Op::Delete { index } if !live.is_empty() => {
                let event = live.remove(index % live.len());
                repo.delete_event(event.id).await.unwrap();
                deleted.push(event.id);
            }
            Op::Move { index, offset_hours } if !live.is_empty() => {
                let i = index % live.len();
                let length = live[i].ends_at - live[i].starts_at;
                live[i].starts_at = base() + Duration::hours(*offset_hours);
                live[i].ends_at = live[i].starts_at + length;
                repo.update_event(live[i].clone()).await.unwrap();
            }
            _ => {}
        }
    }

    (live, deleted)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// *For any* sequence of creates, moves and deletes, every window read
    /// returns exactly the live events of that user overlapping the window,
    /// ordered by start, and never a deleted one
    #[test]
    fn property_window_reads_match_live_set(
        ops in prop::collection::vec(op(), 0..40),
        day in 0i64..40,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result: Result<(), TestCaseError> = runtime.block_on(async {
            let repo = MemoryEventRepository::new();
            let (live, deleted) = apply(&repo, &ops).await;

            prop_assert!(repo.indices_consistent().await);
            prop_assert_eq!(repo.len().await, live.len());

            let window = TimeWindow::weekly(&(base() + Duration::days(day)));
            for user in 0..3u8 {
                let user_id = format!("user-{user}");
                let found = repo.read_events_in_window(&user_id, window).await.unwrap();

                let mut expected: Vec<&Event> = live
                    .iter()
                    .filter(|e| e.user_id == user_id && window.overlaps(e.starts_at, e.ends_at))
                    .collect();
                expected.sort_by_key(|e| (e.starts_at, e.id));

                let found_ids: Vec<Uuid> = found.iter().map(|e| e.id).collect();
                let expected_ids: Vec<Uuid> = expected.iter().map(|e| e.id).collect();
                prop_assert_eq!(found_ids, expected_ids);
                prop_assert!(found.iter().all(|e| !deleted.contains(&e.id)));
            }

            for id in &deleted {
                prop_assert!(matches!(repo.get_event(*id).await, Err(StoreError::NotFound(_))));
            }
            Ok(())
        });
        result?;
    }

    /// *For any* number of creates, assigned IDs are unique and non-nil
    #[test]
    fn property_created_ids_are_unique(count in 1usize..100) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let ids = runtime.block_on(async {
            let repo = MemoryEventRepository::new();
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                let event = Event::new("user", "event", base(), base() + Duration::hours(1));
                ids.push(repo.create_event(event).await.unwrap().id);
            }
            ids
        });

        let unique: HashSet<Uuid> = ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), count);
        prop_assert!(!unique.contains(&Uuid::nil()));
    }
}
