// Bootstrap utilities shared by the scheduler and sender binaries

use crate::config::{Settings, StorageBackend};
use crate::queue::NatsClient;
use crate::storage::{EventRepository, MemoryEventRepository, PostgresEventRepository};
use crate::telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Install logging and, when a port is configured, the metrics exporter
pub fn init_telemetry(settings: &Settings) -> Result<()> {
    let observability = &settings.observability;
    telemetry::init_logging(
        &observability.log_level,
        observability.log_format,
        observability.tracing_endpoint.as_deref(),
    )?;

    if let Some(port) = observability.metrics_port {
        telemetry::init_metrics(port)?;
    }
    Ok(())
}

/// Build the configured event store and connect it
#[tracing::instrument(skip(settings), fields(backend = ?settings.storage.backend))]
pub async fn init_repository(settings: &Settings) -> Result<Arc<dyn EventRepository>> {
    info!("Initializing event store");

    let repository: Arc<dyn EventRepository> = match settings.storage.backend {
        StorageBackend::Memory => {
            warn!("Using the in-memory event store; events are lost on restart");
            Arc::new(MemoryEventRepository::new())
        }
        StorageBackend::Postgres => {
            Arc::new(PostgresEventRepository::new(settings.database.clone()))
        }
    };

    repository
        .connect(&settings.database.url)
        .await
        .context("Failed to connect event store")?;

    info!("Event store initialized");
    Ok(repository)
}

/// Connect to NATS and make sure the notification stream exists
#[tracing::instrument(skip(settings))]
pub async fn init_nats_client(settings: &Settings) -> Result<NatsClient> {
    info!("Initializing NATS client");

    let nats_client = NatsClient::new(settings.nats.clone())
        .await
        .context("Failed to initialize NATS client")?;
    nats_client
        .initialize_stream()
        .await
        .context("Failed to initialize notification stream")?;

    info!("NATS client initialized");
    Ok(nats_client)
}

/// Resolves on Ctrl+C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_memory_backend_is_connected_and_usable() {
        let settings = Settings::default();
        let repository = init_repository(&settings).await.unwrap();

        let now = Utc::now();
        let stored = repository
            .create_event(Event::new("user-1", "Standup", now, now + Duration::minutes(15)))
            .await
            .unwrap();
        assert_eq!(repository.get_event(stored.id).await.unwrap(), stored);

        // Already connected by bootstrap
        assert!(repository.connect("").await.is_err());
    }

    #[tokio::test]
    async fn test_postgres_backend_reports_connection_failure() {
        let mut settings = Settings::default();
        settings.storage.backend = StorageBackend::Postgres;
        settings.database.url = "postgresql://postgres@127.0.0.1:1/none".to_string();
        settings.database.connect_timeout_seconds = 1;

        assert!(init_repository(&settings).await.is_err());
    }
}
