//! Pipeline metrics

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use switchboard_core::{BudgetBreach, BudgetScope, Context, PolicyBlock, Provider, RoutingDecision};

pub const INFERENCE_REQUESTS: &str = "ai_inference_requests_total";
pub const INFERENCE_LATENCY: &str = "ai_inference_latency_ms";
pub const TOKENS_IN: &str = "ai_tokens_in_total";
pub const TOKENS_OUT: &str = "ai_tokens_out_total";
pub const COST: &str = "ai_cost_brl_total";
pub const POLICY_BLOCKS: &str = "ai_policy_blocks_total";
pub const ROUTER_DECISIONS: &str = "ai_router_decisions_total";
pub const BUDGET_BREACHES: &str = "ai_budget_breaches_total";
pub const BUDGET_REMAINING: &str = "ai_budget_remaining_brl";

/// Labels shared by the per-inference success metrics
#[derive(Debug, Clone, Copy)]
pub struct InferenceLabels<'a> {
    pub context: &'a Context,
    pub provider: Provider,
    pub model: &'a str,
}

impl InferenceLabels<'_> {
    fn attributes(&self) -> Vec<KeyValue> {
        let mut attributes = identity(self.context);
        attributes.push(KeyValue::new("provider", self.provider.as_ref().to_owned()));
        attributes.push(KeyValue::new("model", self.model.to_owned()));
        attributes
    }
}

fn identity(context: &Context) -> Vec<KeyValue> {
    context
        .identity_labels()
        .into_iter()
        .map(|(key, value)| KeyValue::new(key, value.to_owned()))
        .collect()
}

/// Sink for pipeline metrics
pub trait Telemetry: Send + Sync {
    /// One routing decision
    fn record_router_decision(&self, decision: &RoutingDecision);
    /// One policy block
    fn record_policy_block(&self, block: &PolicyBlock);
    /// One budget breach, blocking or not
    fn record_budget_breach(&self, context: &Context, breach: &BudgetBreach);
    /// One completed inference
    fn record_request(&self, labels: &InferenceLabels<'_>);
    /// Latency of a completed inference
    fn record_latency(&self, labels: &InferenceLabels<'_>, latency_ms: u64);
    /// Prompt tokens of a completed inference
    fn record_tokens_in(&self, labels: &InferenceLabels<'_>, tokens: u32);
    /// Completion tokens of a completed inference
    fn record_tokens_out(&self, labels: &InferenceLabels<'_>, tokens: u32);
    /// Cost of a completed inference, in BRL
    fn record_cost(&self, labels: &InferenceLabels<'_>, cost_brl: f64);
    /// Remaining allowance of a capped budget scope, in BRL
    fn record_budget_remaining(&self, scope: BudgetScope, scope_id: &str, remaining_brl: f64);
}

/// OpenTelemetry-backed metrics
pub struct OtelTelemetry {
    requests: Counter<u64>,
    latency: Histogram<f64>,
    tokens_in: Counter<u64>,
    tokens_out: Counter<u64>,
    cost: Counter<f64>,
    policy_blocks: Counter<u64>,
    router_decisions: Counter<u64>,
    budget_breaches: Counter<u64>,
    budget_remaining: Gauge<f64>,
}

impl OtelTelemetry {
    /// Create every instrument on the given meter
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter(INFERENCE_REQUESTS)
                .with_description("Completed inference requests")
                .build(),
            latency: meter
                .f64_histogram(INFERENCE_LATENCY)
                .with_description("Inference latency from pipeline entry to post-policy completion")
                .with_unit("ms")
                .build(),
            tokens_in: meter
                .u64_counter(TOKENS_IN)
                .with_description("Prompt tokens consumed")
                .build(),
            tokens_out: meter
                .u64_counter(TOKENS_OUT)
                .with_description("Completion tokens produced")
                .build(),
            cost: meter
                .f64_counter(COST)
                .with_description("Inference cost")
                .with_unit("BRL")
                .build(),
            policy_blocks: meter
                .u64_counter(POLICY_BLOCKS)
                .with_description("Requests or responses blocked by a policy rule")
                .build(),
            router_decisions: meter
                .u64_counter(ROUTER_DECISIONS)
                .with_description("Routing decisions by provider, model and reason")
                .build(),
            budget_breaches: meter
                .u64_counter(BUDGET_BREACHES)
                .with_description("Budget admission checks that exceeded a cap")
                .build(),
            budget_remaining: meter
                .f64_gauge(BUDGET_REMAINING)
                .with_description("Remaining allowance per budget scope")
                .with_unit("BRL")
                .build(),
        }
    }
}

impl Telemetry for OtelTelemetry {
    fn record_router_decision(&self, decision: &RoutingDecision) {
        let mut attributes = identity(&decision.context);
        attributes.extend([
            KeyValue::new("provider", decision.provider.as_ref().to_owned()),
            KeyValue::new("model", decision.model.clone()),
            KeyValue::new("reason", decision.reason.as_ref().to_owned()),
        ]);
        self.router_decisions.add(1, &attributes);
    }

    fn record_policy_block(&self, block: &PolicyBlock) {
        let mut attributes = identity(&block.context);
        attributes.extend([
            KeyValue::new("rule", block.rule.clone()),
            KeyValue::new("severity", block.severity.as_ref().to_owned()),
            KeyValue::new("phase", block.phase.as_ref().to_owned()),
        ]);
        self.policy_blocks.add(1, &attributes);
    }

    fn record_budget_breach(&self, context: &Context, breach: &BudgetBreach) {
        let mut attributes = identity(context);
        attributes.extend([
            KeyValue::new("scope", breach.scope.as_ref().to_owned()),
            KeyValue::new("scope_id", breach.scope_id.clone()),
            KeyValue::new("action", breach.action.as_ref().to_owned()),
        ]);
        self.budget_breaches.add(1, &attributes);
    }

    fn record_request(&self, labels: &InferenceLabels<'_>) {
        self.requests.add(1, &labels.attributes());
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_latency(&self, labels: &InferenceLabels<'_>, latency_ms: u64) {
        self.latency.record(latency_ms as f64, &labels.attributes());
    }

    fn record_tokens_in(&self, labels: &InferenceLabels<'_>, tokens: u32) {
        self.tokens_in.add(u64::from(tokens), &labels.attributes());
    }

    fn record_tokens_out(&self, labels: &InferenceLabels<'_>, tokens: u32) {
        self.tokens_out.add(u64::from(tokens), &labels.attributes());
    }

    fn record_cost(&self, labels: &InferenceLabels<'_>, cost_brl: f64) {
        self.cost.add(cost_brl, &labels.attributes());
    }

    fn record_budget_remaining(&self, scope: BudgetScope, scope_id: &str, remaining_brl: f64) {
        self.budget_remaining.record(
            remaining_brl,
            &[
                KeyValue::new("scope", scope.as_ref().to_owned()),
                KeyValue::new("scope_id", scope_id.to_owned()),
            ],
        );
    }
}

/// Metrics sink that records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record_router_decision(&self, _decision: &RoutingDecision) {}
    fn record_policy_block(&self, _block: &PolicyBlock) {}
    fn record_budget_breach(&self, _context: &Context, _breach: &BudgetBreach) {}
    fn record_request(&self, _labels: &InferenceLabels<'_>) {}
    fn record_latency(&self, _labels: &InferenceLabels<'_>, _latency_ms: u64) {}
    fn record_tokens_in(&self, _labels: &InferenceLabels<'_>, _tokens: u32) {}
    fn record_tokens_out(&self, _labels: &InferenceLabels<'_>, _tokens: u32) {}
    fn record_cost(&self, _labels: &InferenceLabels<'_>, _cost_brl: f64) {}
    fn record_budget_remaining(&self, _scope: BudgetScope, _scope_id: &str, _remaining_brl: f64) {}
}
