use http::StatusCode;
use switchboard_adapters::AdapterError;
use switchboard_budget::BudgetError;
use switchboard_core::{BudgetScope, HttpError, Phase, Provider, Severity};
use switchboard_policy::PolicyError;
use switchboard_routing::RoutingError;
use thiserror::Error;

/// Terminal outcomes of an inference request
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Pipeline is switched off
    #[error("inference is disabled")]
    Disabled,

    /// A policy rule blocked the prompt or the generated content
    #[error("blocked by policy rule '{rule}' ({phase})")]
    PolicyBlocked { phase: Phase, rule: String, severity: Severity },

    /// A policy rule could not be evaluated and the engine is fail-closed
    #[error("policy evaluation failed: {0}")]
    PolicyEvaluation(#[source] PolicyError),

    /// The router could not pick a backend
    #[error("routing failed: {0}")]
    RoutingFailed(#[from] RoutingError),

    /// A blocking budget cap would be exceeded
    #[error("budget exceeded for {scope} scope '{scope_id}'")]
    BudgetExceeded { scope: BudgetScope, scope_id: String },

    /// The budget tracker rejected a cost
    #[error("budget tracking failed: {0}")]
    Budget(#[from] BudgetError),

    /// No adapter is registered for the routed provider
    #[error("no adapter registered for provider {provider}")]
    NoAdapter { provider: Provider },

    /// The backend call failed
    #[error("inference failed on {provider}: {source}")]
    InferenceFailed {
        provider: Provider,
        #[source]
        source: AdapterError,
    },

    /// The backend call exceeded its deadline
    #[error("inference timed out")]
    Timeout,

    /// The caller went away before the backend answered
    #[error("inference cancelled")]
    Cancelled,
}

impl InferenceError {
    /// Machine-readable code, shared by error events and error bodies
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::PolicyBlocked { phase: Phase::Pre, .. } => "POLICY_BLOCKED",
            Self::PolicyBlocked { phase: Phase::Post, .. } => "POST_POLICY_BLOCKED",
            Self::PolicyEvaluation(_) => "POLICY_EVALUATION_FAILED",
            Self::RoutingFailed(_) => "ROUTING_FAILED",
            Self::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            Self::Budget(_) => "BUDGET_ERROR",
            Self::NoAdapter { .. } => "NO_ADAPTER",
            Self::InferenceFailed { .. } => "INFERENCE_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Non-standard status used when the client closed the request
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl HttpError for InferenceError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Disabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::PolicyBlocked { .. } => StatusCode::FORBIDDEN,
            Self::BudgetExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::RoutingFailed(_) | Self::InferenceFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
            Self::PolicyEvaluation(_) | Self::Budget(_) | Self::NoAdapter { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Disabled => "service_unavailable",
            Self::PolicyBlocked { .. } => "policy_violation",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::RoutingFailed(_) => "routing_error",
            Self::InferenceFailed { .. } => "upstream_error",
            Self::Timeout => "timeout_error",
            Self::Cancelled => "cancelled",
            Self::PolicyEvaluation(_) | Self::Budget(_) | Self::NoAdapter { .. } => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::PolicyEvaluation(_) | Self::Budget(_) | Self::NoAdapter { .. } => {
                "an internal error occurred".to_owned()
            }
            Self::InferenceFailed { provider, .. } => format!("inference failed on provider {provider}"),
            other => other.to_string(),
        }
    }
}
