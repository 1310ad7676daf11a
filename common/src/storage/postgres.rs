// PostgreSQL event store

use crate::config::DatabaseConfig;
use crate::db::DbPool;
use crate::errors::{classify_sqlx_error, StoreError};
use crate::models::Event;
use crate::storage::repository::EventRepository;
use crate::storage::window::TimeWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const EVENT_COLUMNS: &str =
    "id, title, description, starts_at, ends_at, user_id, notify_interval_us, processed";

/// `EventRepository` backed by the `events` table.
///
/// The pool is created by `connect` and dropped by `close`; every other
/// operation fails with `NotConnected` outside that span.
pub struct PostgresEventRepository {
    config: DatabaseConfig,
    pool: RwLock<Option<DbPool>>,
}

impl PostgresEventRepository {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    async fn pool(&self) -> Result<DbPool, StoreError> {
        self.pool.read().await.clone().ok_or(StoreError::NotConnected)
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        self.pool().await?.migrate().await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.pool().await?.health_check().await?;
        Ok(())
    }
}

/// Stored as BIGINT microseconds; durations past `i64::MAX` saturate
fn interval_to_micros(interval: Duration) -> i64 {
    i64::try_from(interval.as_micros()).unwrap_or(i64::MAX)
}

fn event_from_row(row: &PgRow) -> Result<Event, sqlx::Error> {
    let notify_interval_us: i64 = row.try_get("notify_interval_us")?;
    Ok(Event {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        user_id: row.try_get("user_id")?,
        notify_interval: Duration::from_micros(notify_interval_us.max(0) as u64),
        processed: row.try_get("processed")?,
    })
}

fn events_from_rows(operation: &'static str, rows: &[PgRow]) -> Result<Vec<Event>, StoreError> {
    rows.iter()
        .map(|row| event_from_row(row).map_err(|e| StoreError::storage(operation, e)))
        .collect()
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    #[instrument(skip(self, dsn))]
    async fn connect(&self, dsn: &str) -> Result<(), StoreError> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Err(StoreError::AlreadyConnected);
        }

        let dsn = if dsn.is_empty() { self.config.url.as_str() } else { dsn };
        let pool = DbPool::connect(dsn, &self.config).await?;
        if self.config.run_migrations {
            pool.migrate().await?;
        }
        *slot = Some(pool);

        info!("Event store connected");
        Ok(())
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
    }

    #[instrument(skip(self, event), fields(user_id = %event.user_id))]
    async fn create_event(&self, mut event: Event) -> Result<Event, StoreError> {
        event.validate()?;
        event.id = Uuid::new_v4();
        event.processed = false;

        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO events (
                id, title, description, starts_at, ends_at,
                user_id, notify_interval_us, processed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(&event.user_id)
        .bind(interval_to_micros(event.notify_interval))
        .execute(pool.pool())
        .await
        .map_err(|e| classify_sqlx_error("create_event", event.id, e))?;

        debug!(event_id = %event.id, "Event created");
        Ok(event)
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn update_event(&self, event: Event) -> Result<(), StoreError> {
        event.validate()?;

        let pool = self.pool().await?;
        let result = sqlx::query(
            r#"
            UPDATE events
            SET title = $2, description = $3, starts_at = $4, ends_at = $5,
                user_id = $6, notify_interval_us = $7
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(&event.user_id)
        .bind(interval_to_micros(event.notify_interval))
        .execute(pool.pool())
        .await
        .map_err(|e| StoreError::storage("update_event", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(event.id));
        }

        debug!("Event updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, id: Uuid) -> Result<(), StoreError> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(pool.pool())
            .await
            .map_err(|e| StoreError::storage("delete_event", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        debug!("Event deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_event(&self, id: Uuid) -> Result<Event, StoreError> {
        let pool = self.pool().await?;
        let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(pool.pool())
            .await
            .map_err(|e| StoreError::storage("get_event", e))?
            .ok_or(StoreError::NotFound(id))?;

        event_from_row(&row).map_err(|e| StoreError::storage("get_event", e))
    }

    #[instrument(skip(self))]
    async fn read_events_in_window(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> Result<Vec<Event>, StoreError> {
        let pool = self.pool().await?;
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE user_id = $1 AND starts_at < $3 AND ends_at > $2 \
             ORDER BY starts_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(pool.pool())
            .await
            .map_err(|e| StoreError::storage("read_events_in_window", e))?;

        events_from_rows("read_events_in_window", &rows)
    }

    #[instrument(skip(self))]
    async fn read_events_to_notify(&self, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        let pool = self.pool().await?;
        // Compare in numeric microseconds so huge intervals cannot overflow
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE NOT processed \
               AND ends_at >= $1 \
               AND EXTRACT(EPOCH FROM (starts_at - $1)) * 1000000 <= notify_interval_us \
             ORDER BY starts_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .fetch_all(pool.pool())
            .await
            .map_err(|e| StoreError::storage("read_events_to_notify", e))?;

        let events = events_from_rows("read_events_to_notify", &rows)?;
        debug!(count = events.len(), "Found events due for notification");
        Ok(events)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn set_events_processed_status(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let pool = self.pool().await?;
        sqlx::query("UPDATE events SET processed = TRUE WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool.pool())
            .await
            .map_err(|e| StoreError::storage("set_events_processed_status", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_micros_saturates() {
        assert_eq!(interval_to_micros(Duration::from_secs(15 * 60)), 900_000_000);
        assert_eq!(interval_to_micros(Duration::ZERO), 0);
        assert_eq!(interval_to_micros(Duration::from_secs(u64::MAX)), i64::MAX);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let repo = PostgresEventRepository::new(DatabaseConfig::default());

        assert!(matches!(repo.get_event(Uuid::new_v4()).await, Err(StoreError::NotConnected)));
        assert!(matches!(
            repo.read_events_to_notify(Utc::now()).await,
            Err(StoreError::NotConnected)
        ));
        assert!(matches!(repo.health_check().await, Err(StoreError::NotConnected)));
        // Empty batches never touch the pool
        assert!(repo.set_events_processed_status(&[]).await.is_ok());
        // Closing a never-connected store is a no-op
        repo.close().await;
    }
}
