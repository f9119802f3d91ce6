//! Logging, tracing and metrics for Switchboard
//!
//! [`init`] installs the `tracing` subscriber and, when an OTLP exporter is
//! configured, trace and metric export. Pipeline metrics are recorded
//! through the [`Telemetry`] trait so callers can inject their own sink.

#![allow(clippy::must_use_candidate)]

mod metadata;
pub mod metrics;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use switchboard_config::TelemetryConfig;
use switchboard_config::telemetry::{ExportProtocol, ExporterConfig};

pub use metrics::{InferenceLabels, NoopTelemetry, OtelTelemetry, Telemetry};
pub use opentelemetry::metrics::Meter;

/// Instrumentation scope for Switchboard's own meters and tracers
pub const INSTRUMENTATION_SCOPE: &str = "switchboard";

/// Keeps telemetry providers alive; flushes and shuts them down on drop
pub struct TelemetryGuard {
    meter_provider: Option<SdkMeterProvider>,
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Meter for pipeline instruments, from the global provider
    pub fn meter(&self) -> Meter {
        global::meter(INSTRUMENTATION_SCOPE)
    }

    /// Whether metrics are exported
    pub const fn exports_metrics(&self) -> bool {
        self.meter_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown meter provider: {e}");
        }
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown tracer provider: {e}");
        }
    }
}

/// Initialize logging and OTLP export
///
/// Must be called once, from within a Tokio runtime when an exporter is
/// configured. The returned guard must be held for the lifetime of the
/// process.
///
/// # Errors
///
/// Returns an error if an OTLP exporter cannot be built
pub fn init(config: Option<&TelemetryConfig>, log_filter: &str) -> anyhow::Result<TelemetryGuard> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let mut guard = TelemetryGuard {
        meter_provider: None,
        tracer_provider: None,
    };

    let Some(config) = config.filter(|c| c.has_exporter()) else {
        tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        return Ok(guard);
    };

    let resource = metadata::build_resource(config);

    if let Some(exporter) = config.metrics_exporter() {
        let provider = init_metrics(config, exporter, resource.clone())?;
        global::set_meter_provider(provider.clone());
        guard.meter_provider = Some(provider);
    }

    let otel_layer = match config.trace_exporter() {
        Some(exporter) => {
            let provider = init_tracer(config, exporter, resource)?;
            let tracer = provider.tracer(INSTRUMENTATION_SCOPE);
            global::set_tracer_provider(provider.clone());
            guard.tracer_provider = Some(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    Ok(guard)
}

fn init_metrics(
    config: &TelemetryConfig,
    exporter: &ExporterConfig,
    resource: opentelemetry_sdk::Resource,
) -> anyhow::Result<SdkMeterProvider> {
    use opentelemetry_otlp::MetricExporter;
    use opentelemetry_sdk::metrics::PeriodicReader;

    let metric_exporter = match exporter.protocol {
        ExportProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(exporter.endpoint.as_str())
            .build(),
        ExportProtocol::HttpProto => MetricExporter::builder()
            .with_http()
            .with_endpoint(exporter.endpoint.as_str())
            .build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build metrics exporter: {e}"))?;

    let interval = config
        .metrics
        .as_ref()
        .map_or(std::time::Duration::from_secs(30), |m| m.interval);

    let reader = PeriodicReader::builder(metric_exporter).with_interval(interval).build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

fn init_tracer(
    config: &TelemetryConfig,
    exporter: &ExporterConfig,
    resource: opentelemetry_sdk::Resource,
) -> anyhow::Result<SdkTracerProvider> {
    use opentelemetry_otlp::SpanExporter;
    use opentelemetry_sdk::trace::Sampler;

    let span_exporter = match exporter.protocol {
        ExportProtocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(exporter.endpoint.as_str())
            .build(),
        ExportProtocol::HttpProto => SpanExporter::builder()
            .with_http()
            .with_endpoint(exporter.endpoint.as_str())
            .build(),
    }
    .map_err(|e| anyhow::anyhow!("failed to build span exporter: {e}"))?;

    let sampling_rate = config.tracing.as_ref().map_or(1.0, |t| t.sampling_rate);
    let sampler = if sampling_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if sampling_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sampling_rate)
    };

    let sampler = if config.tracing.as_ref().is_none_or(|t| t.parent_based) {
        Sampler::ParentBased(Box::new(sampler))
    } else {
        sampler
    };

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(sampler)
        .with_batch_exporter(span_exporter)
        .build())
}
