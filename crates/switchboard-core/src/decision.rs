use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::inference::{Provider, UseCase};

/// Why the router picked a provider/model pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoutingReason {
    /// Selected from the default table
    Default,
    /// Selected by a matching override rule or a caller hint
    Override,
    /// Primary provider unavailable, configured fallback used
    Fallback,
    /// Sampled out of real inference by the canary
    CanarySkip,
}

/// Outcome of routing a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Caller identity
    pub context: Context,
    /// Use case that was routed
    pub use_case: UseCase,
    /// Selected provider
    pub provider: Provider,
    /// Selected model
    pub model: String,
    /// Why this pair was selected
    pub reason: RoutingReason,
}

impl RoutingDecision {
    /// Whether the decision deliberately skips inference
    pub fn is_canary_skip(&self) -> bool {
        self.reason == RoutingReason::CanarySkip
    }
}

/// How seriously a policy rule treats a match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    /// Log the match and let the content through
    Warn,
    /// Reject the content
    #[default]
    Block,
}

impl Severity {
    /// Whether a match at this severity terminates the request
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Block)
    }
}

/// Which side of inference a policy check ran on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// Request content, before routing
    Pre,
    /// Response content, after the adapter returned
    Post,
}

/// A policy rule that matched request or response content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBlock {
    /// Caller identity
    pub context: Context,
    /// Name of the rule that matched
    pub rule: String,
    /// Severity configured on the rule
    pub severity: Severity,
    /// Check phase
    pub phase: Phase,
    /// Redacted marker standing in for the offending content
    pub sample: String,
}

/// Accounting bucket a spend limit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BudgetScope {
    /// All traffic
    Global,
    /// One tenant
    Tenant,
    /// One calling service
    Service,
}

/// What to do when a scope's cap would be exceeded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreachAction {
    /// Reject the request
    #[default]
    Block,
    /// Let the request through in degraded mode
    Degrade,
    /// Let the request through and raise an alert
    AlertOnly,
}

impl BreachAction {
    /// Whether a breach with this action terminates the request
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Block)
    }
}

/// A spend limit that the admission estimate would exceed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetBreach {
    /// Scope whose cap was hit
    pub scope: BudgetScope,
    /// Tenant or service id; empty for the global scope
    pub scope_id: String,
    /// Configured cap in BRL
    pub cap_brl: f64,
    /// Spend already committed in the current window
    pub used_brl: f64,
    /// Configured action
    pub action: BreachAction,
}

impl BudgetBreach {
    /// Whether the breach terminates the request
    pub const fn is_blocking(&self) -> bool {
        self.action.is_blocking()
    }
}
