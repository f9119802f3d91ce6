//! Pipeline assembled around test doubles

use std::sync::Arc;

use switchboard_adapters::{Adapter, AdapterRegistry};
use switchboard_budget::BudgetTracker;
use switchboard_config::Config;
use switchboard_core::{Context, InferenceRequest, InferenceResponse, UseCase};
use switchboard_events::EventPublisher;
use switchboard_pipeline::{Components, InferenceError, InferenceService};
use switchboard_policy::PolicyEngine;
use switchboard_routing::Router;
use switchboard_telemetry::Telemetry;
use tokio_util::sync::CancellationToken;

use super::doubles::{RecordingPublisher, RecordingTelemetry};

/// A pipeline whose side effects are observable
pub struct TestPipeline {
    pub service: InferenceService,
    pub events: Arc<RecordingPublisher>,
    pub telemetry: Arc<RecordingTelemetry>,
}

impl TestPipeline {
    /// Build from TOML configuration, registering the given adapters on top
    /// of those the configuration defines
    pub fn new(raw: &str, adapters: &[Arc<dyn Adapter>]) -> Self {
        let events = Arc::new(RecordingPublisher::default());
        Self::with_publisher(raw, adapters, Arc::clone(&events) as Arc<dyn EventPublisher>, events)
    }

    /// Same as [`TestPipeline::new`] but events go to `publisher`; the
    /// returned recorder stays empty unless it is that publisher
    pub fn with_publisher(
        raw: &str,
        adapters: &[Arc<dyn Adapter>],
        publisher: Arc<dyn EventPublisher>,
        events: Arc<RecordingPublisher>,
    ) -> Self {
        let config = Config::from_toml(raw).unwrap();
        let telemetry = Arc::new(RecordingTelemetry::default());

        let mut registry = AdapterRegistry::from_config(&config.providers).unwrap();
        for adapter in adapters {
            registry.register(Arc::clone(adapter));
        }

        let service = InferenceService::new(Components {
            ai: config.ai.clone(),
            policy: PolicyEngine::new(&config.policies).unwrap(),
            router: Router::new(config.router.clone()).unwrap(),
            budget: BudgetTracker::new(config.budgets.clone()),
            adapters: registry,
            events: publisher,
            telemetry: Arc::clone(&telemetry) as Arc<dyn Telemetry>,
        });

        Self {
            service,
            events,
            telemetry,
        }
    }

    pub async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        self.service.infer(request, &CancellationToken::new()).await
    }
}

/// Request from tenant `acme`, service `search`
pub fn request(use_case: UseCase, prompt: &str) -> InferenceRequest {
    InferenceRequest::new(Context::new("acme", "search", "sdk-go"), use_case, prompt)
}
