// Sender binary entry point

use common::bootstrap::{init_nats_client, init_repository, init_telemetry, shutdown_signal};
use common::config::Settings;
use common::queue::{Consumer, NatsConsumer};
use common::sender::NotificationSender;
use common::telemetry::shutdown_tracer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_telemetry(&settings)?;
    info!(
        ack_policy = ?settings.sender.ack_policy,
        "Starting calendar notification sender"
    );

    let repository = init_repository(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize event store");
        e
    })?;

    let nats_client = init_nats_client(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize NATS client");
        e
    })?;
    let consumer = NatsConsumer::new(&nats_client, settings.sender.delivery_buffer)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create notification consumer");
            e
        })?;
    let consumer = Arc::new(consumer) as Arc<dyn Consumer>;
    info!("Notification consumer initialized");

    let sender = NotificationSender::new(
        Arc::clone(&repository),
        consumer,
        settings.sender.ack_policy,
    );

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown");
        signal_token.cancel();
    });

    let result = sender.run(token).await;

    if let Err(e) = sender.shutdown().await {
        error!(error = %e, "Failed to close notification consumer");
    }
    repository.close().await;
    shutdown_tracer();

    result.map_err(|e| {
        error!(error = %e, "Sender terminated with an error");
        e.into()
    })
}
