use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource as semconv;
use switchboard_config::TelemetryConfig;

/// Resource describing this process, from configuration
pub fn build_resource(config: &TelemetryConfig) -> Resource {
    let service_name = if config.service_name.is_empty() {
        "switchboard".to_owned()
    } else {
        config.service_name.clone()
    };

    let attributes = [
        KeyValue::new(semconv::SERVICE_NAME, service_name),
        KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
    ]
    .into_iter()
    .chain(
        config
            .resource_attributes
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
    );

    Resource::builder().with_attributes(attributes).build()
}
