//! Recording and scripted stand-ins for the pipeline's collaborators

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use switchboard_adapters::{Adapter, AdapterError, AdapterOutput};
use switchboard_core::{
    BreachAction, BudgetBreach, BudgetScope, Context, InferenceRequest, InferenceResponse, PolicyBlock, Provider,
    RoutingDecision,
};
use switchboard_events::{EventError, EventPublisher};
use switchboard_telemetry::{InferenceLabels, Telemetry};

/// An event captured by [`RecordingPublisher`]
#[derive(Debug, Clone)]
pub enum Published {
    PolicyBlock(PolicyBlock),
    RouterDecision(RoutingDecision),
    Summary(InferenceResponse),
    Error { provider: Provider, model: String, code: String },
}

/// Publisher that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Published>>,
    closed: AtomicUsize,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<Published> {
        self.events.lock().unwrap().clone()
    }

    pub fn policy_blocks(&self) -> Vec<PolicyBlock> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Published::PolicyBlock(block) => Some(block),
                _ => None,
            })
            .collect()
    }

    pub fn decisions(&self) -> Vec<RoutingDecision> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Published::RouterDecision(decision) => Some(decision),
                _ => None,
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<InferenceResponse> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Published::Summary(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    pub fn error_codes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Published::Error { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn push(&self, event: Published) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_policy_block(&self, block: &PolicyBlock) -> Result<(), EventError> {
        self.push(Published::PolicyBlock(block.clone()));
        Ok(())
    }

    async fn publish_router_decision(&self, decision: &RoutingDecision) -> Result<(), EventError> {
        self.push(Published::RouterDecision(decision.clone()));
        Ok(())
    }

    async fn publish_inference_summary(
        &self,
        _request: &InferenceRequest,
        response: &InferenceResponse,
    ) -> Result<(), EventError> {
        self.push(Published::Summary(response.clone()));
        Ok(())
    }

    async fn publish_inference_error(
        &self,
        _request: &InferenceRequest,
        provider: Provider,
        model: &str,
        code: &str,
        _message: &str,
    ) -> Result<(), EventError> {
        self.push(Published::Error {
            provider,
            model: model.to_owned(),
            code: code.to_owned(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), EventError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Publisher whose every call fails
#[derive(Debug, Default)]
pub struct BrokenPublisher;

#[async_trait]
impl EventPublisher for BrokenPublisher {
    async fn publish_policy_block(&self, block: &PolicyBlock) -> Result<(), EventError> {
        Err(EventError::QueueFull {
            subject: format!("policy.block/{}", block.rule),
        })
    }

    async fn publish_router_decision(&self, _decision: &RoutingDecision) -> Result<(), EventError> {
        Err(EventError::Closed)
    }

    async fn publish_inference_summary(
        &self,
        _request: &InferenceRequest,
        _response: &InferenceResponse,
    ) -> Result<(), EventError> {
        Err(EventError::Backend("stream unavailable".to_owned()))
    }

    async fn publish_inference_error(
        &self,
        _request: &InferenceRequest,
        _provider: Provider,
        _model: &str,
        _code: &str,
        _message: &str,
    ) -> Result<(), EventError> {
        Err(EventError::Closed)
    }

    async fn close(&self) -> Result<(), EventError> {
        Ok(())
    }
}

/// A metric captured by [`RecordingTelemetry`]
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    RouterDecision { provider: Provider, reason: String },
    PolicyBlock { rule: String, severity: String },
    BudgetBreach { scope: BudgetScope, action: BreachAction },
    Request { provider: Provider, model: String, tenant_id: String },
    Latency(u64),
    TokensIn(u32),
    TokensOut(u32),
    Cost(f64),
    BudgetRemaining { scope: BudgetScope, scope_id: String, remaining_brl: f64 },
}

/// Metrics sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    records: Mutex<Vec<Recorded>>,
}

impl RecordingTelemetry {
    pub fn records(&self) -> Vec<Recorded> {
        self.records.lock().unwrap().clone()
    }

    /// Number of records matching a predicate
    pub fn count(&self, predicate: impl Fn(&Recorded) -> bool) -> usize {
        self.records().iter().filter(|record| predicate(record)).count()
    }

    fn push(&self, record: Recorded) {
        self.records.lock().unwrap().push(record);
    }
}

impl Telemetry for RecordingTelemetry {
    fn record_router_decision(&self, decision: &RoutingDecision) {
        self.push(Recorded::RouterDecision {
            provider: decision.provider,
            reason: decision.reason.to_string(),
        });
    }

    fn record_policy_block(&self, block: &PolicyBlock) {
        self.push(Recorded::PolicyBlock {
            rule: block.rule.clone(),
            severity: block.severity.to_string(),
        });
    }

    fn record_budget_breach(&self, _context: &Context, breach: &BudgetBreach) {
        self.push(Recorded::BudgetBreach {
            scope: breach.scope,
            action: breach.action,
        });
    }

    fn record_request(&self, labels: &InferenceLabels<'_>) {
        self.push(Recorded::Request {
            provider: labels.provider,
            model: labels.model.to_owned(),
            tenant_id: labels.context.tenant_id.clone(),
        });
    }

    fn record_latency(&self, _labels: &InferenceLabels<'_>, latency_ms: u64) {
        self.push(Recorded::Latency(latency_ms));
    }

    fn record_tokens_in(&self, _labels: &InferenceLabels<'_>, tokens: u32) {
        self.push(Recorded::TokensIn(tokens));
    }

    fn record_tokens_out(&self, _labels: &InferenceLabels<'_>, tokens: u32) {
        self.push(Recorded::TokensOut(tokens));
    }

    fn record_cost(&self, _labels: &InferenceLabels<'_>, cost_brl: f64) {
        self.push(Recorded::Cost(cost_brl));
    }

    fn record_budget_remaining(&self, scope: BudgetScope, scope_id: &str, remaining_brl: f64) {
        self.push(Recorded::BudgetRemaining {
            scope,
            scope_id: scope_id.to_owned(),
            remaining_brl,
        });
    }
}

/// What a [`ScriptedAdapter`] does when called
#[derive(Debug, Clone)]
pub enum Script {
    Reply(AdapterOutput),
    Fail(String),
    /// Never answers
    Hang,
    /// Answers after a delay
    Slow(Duration, AdapterOutput),
}

/// Adapter that plays back a fixed script and counts calls
#[derive(Debug)]
pub struct ScriptedAdapter {
    provider: Provider,
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(provider: Provider, script: Script) -> Self {
        Self {
            provider,
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Adapter that always answers with the given content and accounting
    pub fn replying(provider: Provider, content: &str, model: &str, tokens: (u32, u32), cost_brl: f64) -> Self {
        Self::new(
            provider,
            Script::Reply(AdapterOutput {
                content: content.to_owned(),
                model: model.to_owned(),
                tokens_in: tokens.0,
                tokens_out: tokens.1,
                cost_brl,
            }),
        )
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn infer(&self, _request: &InferenceRequest, _model: &str) -> Result<AdapterOutput, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Reply(output) => Ok(output),
            Script::Fail(message) => Err(AdapterError::Upstream(message)),
            Script::Hang => std::future::pending().await,
            Script::Slow(delay, output) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
        }
    }

    async fn health_check(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}
