// Scheduler binary entry point

use common::bootstrap::{init_nats_client, init_repository, init_telemetry, shutdown_signal};
use common::config::Settings;
use common::queue::{NatsPublisher, Publisher};
use common::scheduler::NotificationScheduler;
use common::telemetry::shutdown_tracer;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_telemetry(&settings)?;
    info!("Starting calendar notification scheduler");

    let repository = init_repository(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize event store");
        e
    })?;

    let nats_client = init_nats_client(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize NATS client");
        e
    })?;
    let publisher = Arc::new(NatsPublisher::new(nats_client)) as Arc<dyn Publisher>;
    info!("Notification publisher initialized");

    let scheduler = NotificationScheduler::new(
        Arc::clone(&repository),
        publisher,
        Duration::from_secs(settings.scheduler.poll_interval_seconds),
    );

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown");
        signal_token.cancel();
    });

    let result = scheduler.run(token).await;

    if let Err(e) = scheduler.shutdown().await {
        error!(error = %e, "Failed to close notification publisher");
    }
    repository.close().await;
    shutdown_tracer();

    match result {
        Ok(()) => {
            info!("Scheduler stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Scheduler terminated with an error");
            Err(e.into())
        }
    }
}
