// NATS JetStream client for the notification stream

use crate::config::NatsSettings;
use crate::errors::QueueError;
use async_nats::jetstream::{
    consumer::{pull::Config as PullConfig, AckPolicy, PullConsumer},
    stream::{Config as StreamConfig, RetentionPolicy, Stream},
    Context as JetStreamContext,
};
use std::time::Duration;
use tracing::{info, instrument};

/// NATS JetStream client
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: JetStreamContext,
    settings: NatsSettings,
}

impl NatsClient {
    /// Wrap an already connected `async_nats::Client`
    pub fn from_client(client: async_nats::Client, settings: NatsSettings) -> Self {
        let jetstream = async_nats::jetstream::new(client.clone());
        Self {
            client,
            jetstream,
            settings,
        }
    }

    /// Connect to the NATS server
    #[instrument(skip(settings), fields(url = %settings.url))]
    pub async fn new(settings: NatsSettings) -> Result<Self, QueueError> {
        info!("Connecting to NATS server");

        let client = async_nats::connect(&settings.url)
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to connect to NATS: {}", e)))?;

        info!("Connected to NATS server successfully");
        Ok(Self::from_client(client, settings))
    }

    /// Subject pattern the stream captures
    pub fn stream_subjects(&self) -> String {
        format!("{}.>", self.settings.subject_prefix)
    }

    /// Subject notifications are published on
    pub fn publish_subject(&self) -> String {
        format!("{}.events", self.settings.subject_prefix)
    }

    /// Create the notification stream if missing. Work-queue retention drops
    /// a message once it is acknowledged or terminated.
    #[instrument(skip(self), fields(stream_name = %self.settings.stream_name))]
    pub async fn initialize_stream(&self) -> Result<Stream, QueueError> {
        info!("Initializing JetStream stream");

        let stream_config = StreamConfig {
            name: self.settings.stream_name.clone(),
            subjects: vec![self.stream_subjects()],
            retention: RetentionPolicy::WorkQueue,
            max_age: Duration::from_secs(self.settings.max_age_seconds),
            max_messages: self.settings.max_messages,
            ..Default::default()
        };

        let stream = self
            .jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| QueueError::StreamCreation(format!("Failed to create stream: {}", e)))?;

        info!("Stream initialized successfully");
        Ok(stream)
    }

    /// Durable pull consumer with explicit acknowledgement
    #[instrument(skip(self), fields(consumer_name = %self.settings.consumer_name))]
    pub async fn get_or_create_consumer(&self) -> Result<PullConsumer, QueueError> {
        let stream = self
            .jetstream
            .get_stream(&self.settings.stream_name)
            .await
            .map_err(|e| QueueError::ConsumerCreation(format!("Stream not found: {}", e)))?;

        let consumer_config = PullConfig {
            durable_name: Some(self.settings.consumer_name.clone()),
            ack_policy: AckPolicy::Explicit,
            max_deliver: self.settings.max_deliver,
            ack_wait: Duration::from_secs(self.settings.ack_wait_seconds),
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(&self.settings.consumer_name, consumer_config)
            .await
            .map_err(|e| {
                QueueError::ConsumerCreation(format!("Failed to create consumer: {}", e))
            })?;

        info!("Consumer created successfully");
        Ok(consumer)
    }

    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    pub fn settings(&self) -> &NatsSettings {
        &self.settings
    }

    /// Verify the stream is reachable
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), QueueError> {
        self.jetstream
            .get_stream(&self.settings.stream_name)
            .await
            .map_err(|e| QueueError::Connection(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}
