use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::LoggingConfig;
use crate::{CrossrankError, Result};

/// Keeps the span exporter alive; dropping it flushes pending spans.
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.provider.take() {
            let _ = provider.shutdown();
        }
    }
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn fmt_layer<S>(json_logs: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span> + 'static,
{
    if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    }
}

pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<TelemetryGuard> {
    if config.otel {
        return init_with_otel(service_name, config);
    }

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer(config.json))
        .try_init()
        .map_err(|err| CrossrankError::Telemetry(err.to_string()))?;
    Ok(TelemetryGuard::default())
}

#[cfg(feature = "otel")]
fn init_with_otel(service_name: &str, config: &LoggingConfig) -> Result<TelemetryGuard> {
    use opentelemetry::global;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::SpanExporter;
    use opentelemetry_otlp::WithExportConfig as _;
    use opentelemetry_sdk::Resource;

    let mut exporter = SpanExporter::builder().with_http();
    if let Some(endpoint) = config.otel_endpoint.as_deref() {
        exporter = exporter.with_endpoint(endpoint.to_string());
    }
    let exporter = exporter
        .build()
        .map_err(|err| CrossrankError::Telemetry(err.to_string()))?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder_empty()
                .with_service_name(service_name.to_string())
                .build(),
        )
        .build();
    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer(service_name.to_string());
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer(config.json))
        .with(otel_layer)
        .try_init()
        .map_err(|err| CrossrankError::Telemetry(err.to_string()))?;

    Ok(TelemetryGuard {
        provider: Some(provider),
    })
}

#[cfg(not(feature = "otel"))]
fn init_with_otel(_service_name: &str, _config: &LoggingConfig) -> Result<TelemetryGuard> {
    Err(CrossrankError::Telemetry(
        "otel export requires `--features otel`".to_string(),
    ))
}
