//! Shared domain types for Switchboard
//!
//! Request-scoped values that flow through the inference pipeline:
//! caller context, requests and responses, routing decisions, policy
//! blocks, and budget breaches.

#![allow(clippy::must_use_candidate)]

mod context;
mod decision;
mod error;
mod inference;

pub use context::Context;
pub use decision::{
    BreachAction, BudgetBreach, BudgetScope, Phase, PolicyBlock, RoutingDecision, RoutingReason, Severity,
};
pub use error::HttpError;
pub use inference::{
    CANARY_SKIP_CONTENT, InferenceRequest, InferenceResponse, Provider, RoutingHints, UseCase,
};
