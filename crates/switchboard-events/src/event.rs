//! Event payloads and their wire encoding

use jiff::Timestamp;
use serde::Serialize;
use switchboard_core::{Context, InferenceRequest, InferenceResponse, Provider, UseCase};
use uuid::Uuid;

use crate::EventError;

/// Kind of event, which determines its subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr)]
pub enum EventKind {
    #[strum(serialize = "router.decision")]
    RouterDecision,
    #[strum(serialize = "policy.block")]
    PolicyBlock,
    #[strum(serialize = "inference.summary")]
    InferenceSummary,
    #[strum(serialize = "inference.error")]
    InferenceError,
}

impl EventKind {
    /// Full subject under a prefix, e.g. `ai.router.decision`
    pub fn subject(self, prefix: &str) -> String {
        if prefix.is_empty() {
            self.as_ref().to_owned()
        } else {
            format!("{prefix}.{}", self.as_ref())
        }
    }
}

/// Outcome of a completed inference
#[derive(Debug, Clone, Serialize)]
pub struct InferenceSummary<'a> {
    pub context: &'a Context,
    pub use_case: UseCase,
    pub provider: Provider,
    pub model: &'a str,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_brl: f64,
    pub latency_ms: u64,
    pub cached: bool,
}

impl<'a> InferenceSummary<'a> {
    pub fn new(request: &'a InferenceRequest, response: &'a InferenceResponse) -> Self {
        Self {
            context: &request.context,
            use_case: request.use_case,
            provider: response.provider,
            model: response.model.as_str(),
            tokens_in: response.tokens_in,
            tokens_out: response.tokens_out,
            cost_brl: response.cost_brl,
            latency_ms: response.latency_ms,
            cached: response.cached,
        }
    }
}

/// A request that failed after routing
#[derive(Debug, Clone, Serialize)]
pub struct InferenceFailure<'a> {
    pub context: &'a Context,
    pub use_case: UseCase,
    pub provider: Provider,
    pub model: &'a str,
    /// Machine-readable error code, e.g. `TIMEOUT`
    pub code: &'a str,
    pub message: &'a str,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    id: Uuid,
    subject: &'a str,
    timestamp: Timestamp,
    #[serde(flatten)]
    payload: &'a T,
}

/// An encoded event ready to be appended to a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent {
    pub subject: String,
    pub payload: String,
}

impl EncodedEvent {
    /// Wrap a payload in the event envelope and encode it as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized
    pub fn encode<T: Serialize>(kind: EventKind, prefix: &str, payload: &T) -> Result<Self, EventError> {
        let subject = kind.subject(prefix);
        let envelope = Envelope {
            id: Uuid::new_v4(),
            subject: &subject,
            timestamp: Timestamp::now(),
            payload,
        };

        let payload = serde_json::to_string(&envelope).map_err(|e| EventError::Serialization(e.to_string()))?;

        Ok(Self { subject, payload })
    }
}
