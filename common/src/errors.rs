// Error handling framework for the event store and the notification pipeline

use thiserror::Error;
use uuid::Uuid;

/// Event store errors, shared by every `EventRepository` backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Event not found: {0}")]
    NotFound(Uuid),

    #[error("Event already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Repository is already connected")]
    AlreadyConnected,

    #[error("Repository is not connected")]
    NotConnected,

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Storage operation '{operation}' failed: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl StoreError {
    /// Wrap a backend failure with the name of the operation that hit it
    pub fn storage(operation: &'static str, source: sqlx::Error) -> Self {
        StoreError::Storage { operation, source }
    }

    /// Stable, protocol-neutral code for the transport layer to map onto its own error codes
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::AlreadyExists(_) => "ALREADY_EXISTS",
            StoreError::AlreadyConnected => "ALREADY_CONNECTED",
            StoreError::NotConnected => "NOT_CONNECTED",
            StoreError::InvalidEvent(_) => "INVALID_ARGUMENT",
            StoreError::Storage { .. } | StoreError::Database(_) => "STORAGE_ERROR",
        }
    }
}

/// Database pool errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Queue-related errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to connect to queue: {0}")]
    Connection(String),

    #[error("Failed to create stream: {0}")]
    StreamCreation(String),

    #[error("Failed to create consumer: {0}")]
    ConsumerCreation(String),

    #[error("Failed to publish message: {0}")]
    PublishFailed(String),

    #[error("Failed to consume message: {0}")]
    ConsumeFailed(String),

    #[error("Failed to acknowledge message: {0}")]
    AckFailed(String),

    #[error("Message serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Queue is closed")]
    Closed,

    #[error("Queue operation timeout: {0}")]
    Timeout(String),
}

/// Errors that stop the notification scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to read due events: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to publish notification: {0}")]
    Queue(#[from] QueueError),
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}

/// Map a sqlx failure onto the store taxonomy, keeping unique violations distinct
pub(crate) fn classify_sqlx_error(
    operation: &'static str,
    id: Uuid,
    err: sqlx::Error,
) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::AlreadyExists(id);
        }
    }
    StoreError::storage(operation, err)
}
