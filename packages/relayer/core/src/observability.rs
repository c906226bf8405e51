//! Observability for the relayer binary.
//!
//! Human readable logs go to stderr so that command output on stdout stays
//! machine readable. When an OTLP endpoint is configured, spans and log
//! records are exported as well.

use std::str::FromStr;

use anyhow::{Context, Result};
use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    logs::SdkLoggerProvider,
    propagation::TraceContextPropagator,
    resource::Resource,
    trace::{Sampler, SdkTracerProvider, SpanExporter, Tracer},
};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging settings taken from the global command line flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// The log level (`trace`, `debug`, `info`, `warn` or `error`).
    pub level: String,
    /// Whether spans and logs are exported over OTLP.
    pub use_otel: bool,
    /// The service name reported to the collector.
    pub service_name: String,
    /// The OTLP gRPC endpoint. The exporter default is used when unset.
    pub otel_endpoint: Option<String>,
}

impl ObservabilityConfig {
    /// Settings for `service_name`, exporting only when `otel_endpoint` is set.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        level: impl Into<String>,
        otel_endpoint: Option<String>,
    ) -> Self {
        Self {
            level: level.into(),
            use_otel: otel_endpoint.is_some(),
            service_name: service_name.into(),
            otel_endpoint,
        }
    }

    /// The parsed log level. Unknown values fall back to `info`.
    #[must_use]
    pub fn level(&self) -> Level {
        Level::from_str(&self.level).unwrap_or(Level::INFO)
    }
}

/// Shuts down the OpenTelemetry providers on drop.
pub struct ObservabilityGuard {
    tracer_provider: Option<SdkTracerProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.shutdown();
        }
        // Dropping the logger provider flushes its processors.
        drop(self.logger_provider.take());
    }
}

/// Install the global tracing subscriber.
///
/// The returned guard must outlive every command so that buffered spans are
/// flushed before the process exits.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_observability(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let filter = || EnvFilter::new(config.level().as_str().to_lowercase());
    let fmt_layer = || {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
    };

    if !config.use_otel {
        try_init_subscriber(Registry::default().with(filter()).with(fmt_layer()))?;
        return Ok(ObservabilityGuard {
            tracer_provider: None,
            logger_provider: None,
        });
    }

    match (setup_otlp_tracer(config), setup_otlp_logger(config)) {
        (Ok((tracer, tracer_provider)), Ok(logger_provider)) => {
            let subscriber = Registry::default()
                .with(filter())
                .with(fmt_layer())
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .with(OpenTelemetryTracingBridge::new(&logger_provider));
            try_init_subscriber(subscriber)?;
            Ok(ObservabilityGuard {
                tracer_provider: Some(tracer_provider),
                logger_provider: Some(logger_provider),
            })
        }
        (Err(e), _) | (_, Err(e)) => {
            try_init_subscriber(Registry::default().with(filter()).with(fmt_layer()))?;
            tracing::warn!(error = %e, "OpenTelemetry disabled");
            Ok(ObservabilityGuard {
                tracer_provider: None,
                logger_provider: None,
            })
        }
    }
}

fn try_init_subscriber(subscriber: impl SubscriberInitExt) -> Result<()> {
    subscriber
        .try_init()
        .context("failed to set global default subscriber")
}

fn resource(config: &ObservabilityConfig) -> Resource {
    Resource::builder()
        .with_attributes(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build()
}

fn setup_otlp_tracer(config: &ObservabilityConfig) -> Result<(Tracer, SdkTracerProvider)> {
    let provider = SdkTracerProvider::builder()
        .with_resource(resource(config))
        .with_sampler(Sampler::AlwaysOn)
        .with_batch_exporter(build_span_exporter(config)?)
        .build();
    let tracer = provider.tracer(config.service_name.clone());
    Ok((tracer, provider))
}

fn build_span_exporter(config: &ObservabilityConfig) -> Result<impl SpanExporter> {
    let mut builder = opentelemetry_otlp::SpanExporter::builder().with_tonic();
    if let Some(endpoint) = &config.otel_endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    Ok(builder.build()?)
}

fn setup_otlp_logger(config: &ObservabilityConfig) -> Result<SdkLoggerProvider> {
    let mut builder = opentelemetry_otlp::LogExporter::builder().with_tonic();
    if let Some(endpoint) = &config.otel_endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    Ok(SdkLoggerProvider::builder()
        .with_resource(resource(config))
        .with_batch_exporter(builder.build()?)
        .build())
}
