// Telemetry module for structured logging, metrics, and tracing

use crate::config::LogFormat;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "calendar";

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence over `log_level`. When `tracing_endpoint` is
/// set, spans are also exported over OTLP.
pub fn init_logging(
    log_level: &str,
    format: LogFormat,
    tracing_endpoint: Option<&str>,
) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_filter(env_filter)
            .boxed(),
    };

    let registry = tracing_subscriber::registry().with(fmt_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        log_format = ?format,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized"
    );

    Ok(())
}

/// OTLP tracer registered as the global provider
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(endpoint = endpoint, "OpenTelemetry tracer initialized");
    Ok(tracer)
}

/// Flush remaining spans; call once on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Install the Prometheus exporter and describe the pipeline metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "notifications_published_total",
        "Total number of notifications published by the scheduler"
    );
    describe_counter!(
        "notifications_consumed_total",
        "Total number of deliveries handled by the sender, by outcome"
    );
    describe_histogram!(
        "scheduler_tick_duration_seconds",
        "Duration of one scheduler tick in seconds"
    );
    describe_gauge!(
        "scheduler_due_events",
        "Number of events found due in the last scheduler tick"
    );

    tracing::info!(
        metrics_port = metrics_port,
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_notification_published() {
    counter!("notifications_published_total").increment(1);
}

#[inline]
pub fn record_notification_consumed(outcome: &'static str) {
    counter!("notifications_consumed_total", "outcome" => outcome).increment(1);
}

#[inline]
pub fn record_tick_duration(duration_seconds: f64) {
    histogram!("scheduler_tick_duration_seconds").record(duration_seconds);
}

#[inline]
pub fn update_due_events(count: usize) {
    gauge!("scheduler_due_events").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_reports_error() {
        // Only one global subscriber can be installed per process
        let first = init_logging("info", LogFormat::Json, None);
        let second = init_logging("debug", LogFormat::Pretty, None);
        assert!(first.is_err() || second.is_err());
    }

    #[test]
    fn test_metrics_recording_without_exporter() {
        record_notification_published();
        record_notification_consumed("processed");
        record_tick_duration(0.25);
        update_due_events(3);
    }
}
