// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "CALENDAR_CONFIG_DIR";

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub nats: NatsSettings,
    pub scheduler: SchedulerSettings,
    pub sender: SenderSettings,
    pub observability: ObservabilityConfig,
}

/// Which `EventRepository` implementation a process runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/calendar".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_seconds: 30,
            run_migrations: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsSettings {
    pub url: String,
    pub stream_name: String,
    pub subject_prefix: String,
    pub consumer_name: String,
    pub max_age_seconds: u64,
    pub max_messages: i64,
    pub max_deliver: i64,
    pub ack_wait_seconds: u64,
    pub publish_timeout_seconds: u64,
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stream_name: "NOTIFICATIONS".to_string(),
            subject_prefix: "notifications".to_string(),
            consumer_name: "notification-sender".to_string(),
            max_age_seconds: 86400, // 24 hours
            max_messages: 1_000_000,
            max_deliver: 10,
            ack_wait_seconds: 30,
            publish_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10,
        }
    }
}

/// When the sender settles a delivery relative to marking the event processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Acknowledge as soon as the payload decodes; a failed store update loses the mark
    #[default]
    OnReceipt,
    /// Acknowledge only after the store update; failures are requeued for redelivery
    AfterProcessed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderSettings {
    pub ack_policy: AckPolicy,
    pub delivery_buffer: usize,
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            ack_policy: AckPolicy::OnReceipt,
            delivery_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
    pub tracing_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_port: None,
            tracing_endpoint: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));
        Self::load_from_path(config_dir)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides, not committed
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("CALENDAR")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.backend == StorageBackend::Postgres {
            if self.database.url.is_empty() {
                return Err("Database URL cannot be empty for the postgres backend".to_string());
            }
            if self.database.max_connections == 0 {
                return Err("Database max_connections must be greater than 0".to_string());
            }
            if self.database.min_connections > self.database.max_connections {
                return Err(
                    "Database min_connections cannot exceed max_connections".to_string(),
                );
            }
        }

        if self.nats.url.is_empty() {
            return Err("NATS URL cannot be empty".to_string());
        }
        if self.nats.stream_name.is_empty() {
            return Err("NATS stream_name cannot be empty".to_string());
        }
        if self.nats.subject_prefix.is_empty() {
            return Err("NATS subject_prefix cannot be empty".to_string());
        }
        if self.nats.consumer_name.is_empty() {
            return Err("NATS consumer_name cannot be empty".to_string());
        }

        if self.scheduler.poll_interval_seconds == 0 {
            return Err("Scheduler poll_interval_seconds must be greater than 0".to_string());
        }

        if self.sender.delivery_buffer == 0 {
            return Err("Sender delivery_buffer must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.sender.ack_policy, AckPolicy::OnReceipt);
    }

    #[test]
    fn test_validation_catches_zero_poll_interval() {
        let mut settings = Settings::default();
        settings.scheduler.poll_interval_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_empty_database_url_for_postgres() {
        let mut settings = Settings::default();
        settings.database.url = String::new();
        assert!(settings.validate().is_ok());

        settings.storage.backend = StorageBackend::Postgres;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_delivery_buffer() {
        let mut settings = Settings::default();
        settings.sender.delivery_buffer = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_shipped_defaults_select_shared_store() {
        let config_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config");
        let settings = Settings::load_from_path(config_dir).unwrap();
        assert_eq!(settings.storage.backend, StorageBackend::Postgres);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
            [storage]
            backend = "postgres"

            [database]
            url = "postgresql://calendar:calendar@db/calendar"

            [scheduler]
            poll_interval_seconds = 3

            [sender]
            ack_policy = "after_processed"
            "#,
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.storage.backend, StorageBackend::Postgres);
        assert_eq!(settings.database.url, "postgresql://calendar:calendar@db/calendar");
        assert_eq!(settings.scheduler.poll_interval_seconds, 3);
        assert_eq!(settings.sender.ack_policy, AckPolicy::AfterProcessed);
        // Untouched sections keep their defaults
        assert_eq!(settings.nats.stream_name, "NOTIFICATIONS");
        assert!(settings.validate().is_ok());
    }
}
