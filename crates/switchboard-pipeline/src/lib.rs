//! Inference orchestration pipeline
//!
//! [`InferenceService::infer`] runs a request through a fixed sequence of
//! stages: pre-policy, routing, canary gate, budget admission, adapter
//! dispatch, post-policy and accounting. A stage that fails or blocks ends
//! the request; later stages never run.
//!
//! Events and metrics are side effects. Publisher failures are logged and
//! never change the outcome of a request.

#![allow(clippy::must_use_candidate)]

mod error;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use switchboard_adapters::{AdapterError, AdapterOutput, AdapterRegistry};
use switchboard_budget::BudgetTracker;
use switchboard_config::{AiConfig, Config};
use switchboard_core::{InferenceRequest, InferenceResponse, Provider, RoutingDecision};
use switchboard_events::{EventError, EventPublisher};
use switchboard_policy::{PolicyEngine, PolicyError, PolicyVerdict};
use switchboard_routing::Router;
use switchboard_telemetry::{InferenceLabels, Telemetry};
use tokio_util::sync::CancellationToken;

pub use error::InferenceError;

/// Everything the pipeline is assembled from
pub struct Components {
    pub ai: AiConfig,
    pub policy: PolicyEngine,
    pub router: Router,
    pub budget: BudgetTracker,
    pub adapters: AdapterRegistry,
    pub events: Arc<dyn EventPublisher>,
    pub telemetry: Arc<dyn Telemetry>,
}

/// The inference pipeline
pub struct InferenceService {
    ai: AiConfig,
    policy: PolicyEngine,
    router: Router,
    budget: BudgetTracker,
    adapters: AdapterRegistry,
    events: Arc<dyn EventPublisher>,
    telemetry: Arc<dyn Telemetry>,
}

impl InferenceService {
    pub fn new(components: Components) -> Self {
        let Components {
            ai,
            policy,
            router,
            budget,
            adapters,
            events,
            telemetry,
        } = components;

        Self {
            ai,
            policy,
            router,
            budget,
            adapters,
            events,
            telemetry,
        }
    }

    /// Build every subsystem from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if policies, routes or adapters are invalid
    pub fn from_config(
        config: &Config,
        events: Arc<dyn EventPublisher>,
        telemetry: Arc<dyn Telemetry>,
    ) -> anyhow::Result<Self> {
        let policy = PolicyEngine::new(&config.policies).context("failed to compile policies")?;
        let router = Router::new(config.router.clone()).context("failed to build router")?;
        let adapters = AdapterRegistry::from_config(&config.providers).context("failed to build adapters")?;

        Ok(Self::new(Components {
            ai: config.ai.clone(),
            policy,
            router,
            budget: BudgetTracker::new(config.budgets.clone()),
            adapters,
            events,
            telemetry,
        }))
    }

    /// Whether requests are served at all
    pub const fn enabled(&self) -> bool {
        self.ai.enabled
    }

    /// Router, for reloads and health inspection
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Budget tracker, for inspection and resets
    pub const fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    /// Health of every registered backend, in provider order
    pub async fn check_adapters(&self) -> Vec<(Provider, Result<(), AdapterError>)> {
        self.adapters.check_health().await
    }

    /// Run one request through the pipeline
    ///
    /// The backend call is abandoned when `cancel` fires or the request
    /// deadline passes.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; see [`InferenceError`]
    pub async fn infer(
        &self,
        request: &InferenceRequest,
        cancel: &CancellationToken,
    ) -> Result<InferenceResponse, InferenceError> {
        if !self.ai.enabled {
            return Err(InferenceError::Disabled);
        }

        let started = Instant::now();

        self.pre_policy(request).await?;

        let decision = match self.route(request).await? {
            ControlFlow::Continue(decision) => decision,
            ControlFlow::Break(placeholder) => return Ok(placeholder),
        };

        self.admit(request)?;

        let output = self.dispatch(request, &decision, cancel).await?;
        let mut response = InferenceResponse {
            content: output.content,
            provider: decision.provider,
            model: output.model,
            tokens_in: output.tokens_in,
            tokens_out: output.tokens_out,
            cost_brl: output.cost_brl,
            latency_ms: 0,
            cached: false,
        };

        self.post_policy(request, &decision, &response).await?;

        response.latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.finalize(request, &decision, &response).await?;

        Ok(response)
    }

    /// Release the event publisher, flushing queued events
    ///
    /// # Errors
    ///
    /// Returns an error if the publisher fails to shut down cleanly
    pub async fn close(&self) -> Result<(), EventError> {
        self.events.close().await
    }

    async fn pre_policy(&self, request: &InferenceRequest) -> Result<(), InferenceError> {
        match self.policy.check_pre(request) {
            Ok(verdict) => self.enforce(verdict).await,
            Err(e) => self.evaluation_failed(e, "pre"),
        }
    }

    async fn route(
        &self,
        request: &InferenceRequest,
    ) -> Result<ControlFlow<InferenceResponse, RoutingDecision>, InferenceError> {
        let decision = self.router.route(request).await?;

        tracing::debug!(
            tenant_id = %decision.context.tenant_id,
            use_case = %decision.use_case,
            provider = %decision.provider,
            model = %decision.model,
            reason = %decision.reason,
            "request routed"
        );

        self.telemetry.record_router_decision(&decision);
        log_publish(self.events.publish_router_decision(&decision).await);

        if decision.is_canary_skip() {
            return Ok(ControlFlow::Break(InferenceResponse::canary_placeholder()));
        }

        Ok(ControlFlow::Continue(decision))
    }

    fn admit(&self, request: &InferenceRequest) -> Result<(), InferenceError> {
        let check = self.budget.check_budget(request, self.ai.estimated_cost_brl)?;

        let Some(breach) = check.breach else {
            return Ok(());
        };

        self.telemetry.record_budget_breach(&request.context, &breach);

        if !check.allowed {
            return Err(InferenceError::BudgetExceeded {
                scope: breach.scope,
                scope_id: breach.scope_id,
            });
        }

        tracing::warn!(
            scope = %breach.scope,
            scope_id = %breach.scope_id,
            used_brl = breach.used_brl,
            cap_brl = breach.cap_brl,
            action = %breach.action,
            "budget cap exceeded, continuing"
        );

        Ok(())
    }

    async fn dispatch(
        &self,
        request: &InferenceRequest,
        decision: &RoutingDecision,
        cancel: &CancellationToken,
    ) -> Result<AdapterOutput, InferenceError> {
        let Some(adapter) = self.adapters.get(decision.provider) else {
            let error = InferenceError::NoAdapter {
                provider: decision.provider,
            };
            self.report_failure(request, decision, &error).await;
            return Err(error);
        };

        let deadline = request.timeout().unwrap_or(self.ai.default_timeout);

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Dispatch::Cancelled,
            result = tokio::time::timeout(deadline, adapter.infer(request, &decision.model)) => match result {
                Ok(Ok(output)) => Dispatch::Done(output),
                Ok(Err(e)) => Dispatch::Failed(e),
                Err(_) => Dispatch::TimedOut(deadline),
            },
        };

        let health = self.router.health();
        let error = match outcome {
            Dispatch::Done(output) => {
                health.record_success(decision.provider);
                return Ok(output);
            }
            Dispatch::Failed(source) => {
                health.record_failure(decision.provider);
                tracing::warn!(
                    provider = %decision.provider,
                    model = %decision.model,
                    error = %source,
                    "inference failed"
                );
                InferenceError::InferenceFailed {
                    provider: decision.provider,
                    source,
                }
            }
            Dispatch::TimedOut(deadline) => {
                health.record_failure(decision.provider);
                tracing::warn!(
                    provider = %decision.provider,
                    model = %decision.model,
                    ?deadline,
                    "inference timed out"
                );
                InferenceError::Timeout
            }
            Dispatch::Cancelled => {
                tracing::debug!(provider = %decision.provider, "inference cancelled by caller");
                InferenceError::Cancelled
            }
        };

        self.report_failure(request, decision, &error).await;
        Err(error)
    }

    async fn post_policy(
        &self,
        request: &InferenceRequest,
        decision: &RoutingDecision,
        response: &InferenceResponse,
    ) -> Result<(), InferenceError> {
        let outcome = match self.policy.check_post(&request.context, response) {
            Ok(verdict) => self.enforce(verdict).await,
            Err(e) => self.evaluation_failed(e, "post"),
        };

        if let Err(error) = &outcome {
            self.report_failure(request, decision, error).await;
        }

        outcome
    }

    async fn finalize(
        &self,
        request: &InferenceRequest,
        decision: &RoutingDecision,
        response: &InferenceResponse,
    ) -> Result<(), InferenceError> {
        let usages = match self.budget.record_usage(request, response.cost_brl) {
            Ok(usages) => usages,
            Err(e) => {
                let error = InferenceError::Budget(e);
                self.report_failure(request, decision, &error).await;
                return Err(error);
            }
        };

        for usage in &usages {
            self.telemetry
                .record_budget_remaining(usage.scope, &usage.scope_id, usage.remaining_brl);
        }

        log_publish(self.events.publish_inference_summary(request, response).await);

        let labels = InferenceLabels {
            context: &request.context,
            provider: response.provider,
            model: &response.model,
        };
        self.telemetry.record_request(&labels);
        self.telemetry.record_latency(&labels, response.latency_ms);
        self.telemetry.record_tokens_in(&labels, response.tokens_in);
        self.telemetry.record_tokens_out(&labels, response.tokens_out);
        self.telemetry.record_cost(&labels, response.cost_brl);

        tracing::info!(
            tenant_id = %request.context.tenant_id,
            service_id = %request.context.service_id,
            provider = %response.provider,
            model = %response.model,
            tokens_in = response.tokens_in,
            tokens_out = response.tokens_out,
            cost_brl = response.cost_brl,
            latency_ms = response.latency_ms,
            "inference completed"
        );

        Ok(())
    }

    async fn enforce(&self, verdict: PolicyVerdict) -> Result<(), InferenceError> {
        for warning in &verdict.warnings {
            tracing::warn!(rule = %warning.rule, reason = %warning.reason, "policy warning");
        }

        let Some(block) = verdict.block else {
            return Ok(());
        };

        tracing::info!(
            tenant_id = %block.context.tenant_id,
            rule = %block.rule,
            phase = %block.phase,
            "request blocked by policy"
        );

        self.telemetry.record_policy_block(&block);
        log_publish(self.events.publish_policy_block(&block).await);

        Err(InferenceError::PolicyBlocked {
            phase: block.phase,
            rule: block.rule,
            severity: block.severity,
        })
    }

    fn evaluation_failed(&self, error: PolicyError, phase: &'static str) -> Result<(), InferenceError> {
        if self.policy.fail_closed() {
            return Err(InferenceError::PolicyEvaluation(error));
        }

        tracing::warn!(error = %error, phase, "policy evaluation failed, continuing");
        Ok(())
    }

    async fn report_failure(&self, request: &InferenceRequest, decision: &RoutingDecision, error: &InferenceError) {
        log_publish(
            self.events
                .publish_inference_error(request, decision.provider, &decision.model, error.code(), &error.to_string())
                .await,
        );
    }
}

enum Dispatch {
    Done(AdapterOutput),
    Failed(AdapterError),
    TimedOut(Duration),
    Cancelled,
}

fn log_publish(result: Result<(), EventError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to publish event");
    }
}

impl std::fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceService")
            .field("enabled", &self.ai.enabled)
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::{CANARY_SKIP_CONTENT, Context, Provider, UseCase};
    use switchboard_events::NoopPublisher;
    use switchboard_telemetry::NoopTelemetry;

    use super::*;

    fn service(raw: &str) -> InferenceService {
        let config: Config = toml::from_str(raw).unwrap();
        InferenceService::from_config(&config, Arc::new(NoopPublisher), Arc::new(NoopTelemetry)).unwrap()
    }

    fn request(prompt: &str) -> InferenceRequest {
        InferenceRequest::new(Context::new("acme", "search", "sdk-py"), UseCase::Generation, prompt)
    }

    const LOCAL_ROUTE: &str = r#"
        [ai]
        enabled = true

        [router.default.generation]
        provider = "local"
        model = "base"
    "#;

    #[tokio::test]
    async fn disabled_service_rejects() {
        let service = service("");
        let err = service.infer(&request("hi"), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, InferenceError::Disabled));
    }

    #[tokio::test]
    async fn local_route_completes_and_records_cost() {
        let service = service(LOCAL_ROUTE);

        let response = service
            .infer(&request("hello world!"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.provider, Provider::Local);
        assert_eq!(response.model, "base");
        assert_eq!(response.content, "[LOCAL NO-OP] hello world!");
        assert!((service.budget().spent(switchboard_core::BudgetScope::Tenant, "acme") - 0.001).abs() < 1e-9);
    }

    #[tokio::test]
    async fn full_canary_returns_placeholder_without_cost() {
        let service = service(&format!("{LOCAL_ROUTE}\n[router.canary]\npercent = 100\n"));

        let response = service.infer(&request("hello"), &CancellationToken::new()).await.unwrap();

        assert_eq!(response.content, CANARY_SKIP_CONTENT);
        assert_eq!(response.provider, Provider::None);
        assert!(service.budget().spent(switchboard_core::BudgetScope::Global, "").abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn cancelled_token_stops_dispatch() {
        let service = service(LOCAL_ROUTE);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service.infer(&request("hello"), &cancel).await.unwrap_err();
        assert!(matches!(err, InferenceError::Cancelled));
    }

    #[tokio::test]
    async fn missing_adapter_is_reported() {
        let service = service(
            r#"
            [ai]
            enabled = true

            [router.default.generation]
            provider = "qwen"
            model = "qwen-plus"
            "#,
        );

        let err = service.infer(&request("hello"), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, InferenceError::NoAdapter { provider: Provider::Qwen }));
    }

    fn evaluation_error() -> PolicyError {
        PolicyError::Evaluation {
            rule: "prompt_size".to_owned(),
            reason: "failed to load tokenizer".to_owned(),
        }
    }

    #[test]
    fn evaluation_error_is_terminal_when_fail_closed() {
        let service = service(LOCAL_ROUTE);

        let err = service.evaluation_failed(evaluation_error(), "pre").unwrap_err();

        assert!(matches!(
            err,
            InferenceError::PolicyEvaluation(PolicyError::Evaluation { ref rule, .. }) if rule == "prompt_size"
        ));
        assert_eq!(err.code(), "POLICY_EVALUATION_FAILED");
    }

    #[test]
    fn evaluation_error_is_ignored_when_fail_open() {
        let service = service(&format!("{LOCAL_ROUTE}\n[policies]\nfail_closed = false\n"));

        service.evaluation_failed(evaluation_error(), "post").unwrap();
    }
}
