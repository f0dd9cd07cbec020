use anyhow::{Error, Result, anyhow};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::recording::register_metrics;

pub const SERVICE_NAME: &str = "notification-dispatch";

/// Installs the global subscriber: env-filtered JSON logs plus an
/// OpenTelemetry layer so every span carries a trace id.
///
/// Keep the returned provider alive for the life of the process and shut it
/// down on exit.
pub fn init_tracing() -> Result<SdkTracerProvider, Error> {
    let provider = SdkTracerProvider::builder().build();
    let tracer = provider.tracer(SERVICE_NAME);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(true))
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(provider)
}

pub fn init_metrics() -> Result<PrometheusHandle, Error> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("Failed to install Prometheus recorder: {}", e))?;

    register_metrics();

    Ok(handle)
}
