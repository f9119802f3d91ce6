use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::Context;

/// Content returned in place of inference output for canary-skipped traffic
pub const CANARY_SKIP_CONTENT: &str = "[CANARY SKIP]";

/// Kind of work the caller wants done, used as the routing key
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UseCase {
    /// Label or categorize input
    Classification,
    /// Free-form text generation
    Generation,
    /// Reorder candidates by relevance
    Rerank,
    /// Condense input
    Summarize,
}

/// Inference backend identity
///
/// Closed set: adding a backend means adding a variant and registering
/// an adapter for it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provider {
    /// `OpenAI` chat completions
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    /// Qwen through its OpenAI-compatible endpoint
    Qwen,
    /// Local dry-run backend
    Local,
    /// No provider; only carried by canary-skip decisions
    None,
}

/// Optional caller preferences for routing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingHints {
    /// Preferred provider
    #[serde(default)]
    pub provider: Option<Provider>,
    /// Preferred model on that provider
    #[serde(default)]
    pub model: Option<String>,
}

impl RoutingHints {
    /// Whether no preference was expressed
    pub const fn is_empty(&self) -> bool {
        self.provider.is_none() && self.model.is_none()
    }
}

/// An inbound inference request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Caller identity
    #[serde(default)]
    pub context: Context,
    /// Routing key
    pub use_case: UseCase,
    /// Prompt payload
    pub prompt: String,
    /// Upper bound on generated tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Per-request deadline for the backend call, in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Routing preferences
    #[serde(default, skip_serializing_if = "RoutingHints::is_empty")]
    pub hints: RoutingHints,
}

impl InferenceRequest {
    /// Build a request with no limits or hints
    pub fn new(context: Context, use_case: UseCase, prompt: impl Into<String>) -> Self {
        Self {
            context,
            use_case,
            prompt: prompt.into(),
            max_tokens: None,
            timeout_ms: None,
            hints: RoutingHints::default(),
        }
    }

    /// Per-request deadline, if the caller set one
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Result of a completed inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Generated content
    pub content: String,
    /// Backend that served the request
    pub provider: Provider,
    /// Model that served the request
    pub model: String,
    /// Prompt tokens consumed
    pub tokens_in: u32,
    /// Completion tokens produced
    pub tokens_out: u32,
    /// Monetary cost in BRL
    pub cost_brl: f64,
    /// Wall-clock time from pipeline entry to post-policy completion
    pub latency_ms: u64,
    /// Whether the response came from a cache
    #[serde(default)]
    pub cached: bool,
}

impl InferenceResponse {
    /// Placeholder returned for canary-skipped requests
    pub fn canary_placeholder() -> Self {
        Self {
            content: CANARY_SKIP_CONTENT.to_owned(),
            provider: Provider::None,
            model: "none".to_owned(),
            tokens_in: 0,
            tokens_out: 0,
            cost_brl: 0.0,
            latency_ms: 0,
            cached: false,
        }
    }
}
