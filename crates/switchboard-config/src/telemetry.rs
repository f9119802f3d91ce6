use std::{collections::HashMap, time::Duration};

use serde::Deserialize;
use url::Url;

/// Telemetry configuration
///
/// Logging to stdout is always on; OTLP export of traces and metrics is
/// enabled by configuring an exporter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name reported in resource attributes
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Additional resource attributes
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
    /// Exporter shared by traces and metrics
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
    /// Trace export settings
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
    /// Metric export settings
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl TelemetryConfig {
    /// Whether any OTLP exporter is configured
    pub fn has_exporter(&self) -> bool {
        self.exporter.is_some()
            || self.tracing.as_ref().is_some_and(|t| t.exporter.is_some())
            || self.metrics.as_ref().is_some_and(|m| m.exporter.is_some())
    }

    /// Exporter for traces, falling back to the shared one
    pub fn trace_exporter(&self) -> Option<&ExporterConfig> {
        self.tracing
            .as_ref()
            .and_then(|t| t.exporter.as_ref())
            .or(self.exporter.as_ref())
    }

    /// Exporter for metrics, falling back to the shared one
    pub fn metrics_exporter(&self) -> Option<&ExporterConfig> {
        self.metrics
            .as_ref()
            .and_then(|m| m.exporter.as_ref())
            .or(self.exporter.as_ref())
    }
}

/// OTLP exporter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    /// Collector endpoint
    pub endpoint: Url,
    /// Export protocol
    #[serde(default)]
    pub protocol: ExportProtocol,
}

/// OTLP export protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProtocol {
    #[default]
    Grpc,
    HttpProto,
}

/// Trace export settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracingConfig {
    /// Sampling ratio between 0.0 and 1.0
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Respect the parent span's sampling decision
    #[serde(default = "default_true")]
    pub parent_based: bool,
    /// Exporter override for traces
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

/// Metric export settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Periodic export interval
    #[serde(default = "default_interval", deserialize_with = "crate::duration::deserialize")]
    pub interval: Duration,
    /// Exporter override for metrics
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
}

fn default_service_name() -> String {
    "switchboard".to_owned()
}

const fn default_sampling_rate() -> f64 {
    1.0
}

const fn default_true() -> bool {
    true
}

const fn default_interval() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_exporter_overrides_shared() {
        let config: TelemetryConfig = toml::from_str(
            r#"
            service_name = "gateway"

            [exporter]
            endpoint = "http://collector:4317"

            [metrics]
            interval = "10s"
            exporter = { endpoint = "http://metrics:4318", protocol = "http_proto" }
            "#,
        )
        .unwrap();

        assert!(config.has_exporter());
        assert_eq!(config.trace_exporter().unwrap().endpoint.as_str(), "http://collector:4317/");
        let metrics = config.metrics_exporter().unwrap();
        assert_eq!(metrics.protocol, ExportProtocol::HttpProto);
        assert_eq!(config.metrics.unwrap().interval, Duration::from_secs(10));
    }

    #[test]
    fn no_exporter_by_default() {
        let config: TelemetryConfig = toml::from_str("").unwrap();
        assert_eq!(config.service_name, "switchboard");
        assert!(!config.has_exporter());
    }
}
