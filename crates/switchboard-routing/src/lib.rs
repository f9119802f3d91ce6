//! Provider and model selection for inference requests
//!
//! Selection order: canary sampling, caller hints, context overrides, the
//! default table. A provider whose circuit is open is swapped for its
//! configured fallback.

#![allow(clippy::must_use_candidate)]

mod canary;
mod error;
pub mod health;

use switchboard_config::{RouteTarget, RouterConfig};
use switchboard_core::{Context, InferenceRequest, Provider, RoutingDecision, RoutingReason};
use tokio::sync::RwLock;

pub use error::RoutingError;
pub use health::{CircuitState, ProviderHealthTracker};

/// Model name carried by canary-skip decisions
pub const CANARY_SKIP_MODEL: &str = "none";

/// Routes requests according to a reloadable routing table
#[derive(Debug)]
pub struct Router {
    config: RwLock<RouterConfig>,
    health: ProviderHealthTracker,
}

impl Router {
    /// Create a router from a validated routing table
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::InvalidConfig`] if the table fails validation
    pub fn new(config: RouterConfig) -> Result<Self, RoutingError> {
        config.validate().map_err(RoutingError::InvalidConfig)?;

        Ok(Self {
            health: ProviderHealthTracker::new(config.circuit_breaker.clone()),
            config: RwLock::new(config),
        })
    }

    /// Provider health shared with the dispatcher
    pub const fn health(&self) -> &ProviderHealthTracker {
        &self.health
    }

    /// Replace the routing table
    ///
    /// In-flight routes finish against the table they started with. Circuit
    /// breaker settings are fixed at construction.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::InvalidConfig`] and keeps the current table if
    /// the new one fails validation
    pub async fn reload(&self, config: RouterConfig) -> Result<(), RoutingError> {
        config.validate().map_err(RoutingError::InvalidConfig)?;
        *self.config.write().await = config;
        tracing::info!("routing table reloaded");
        Ok(())
    }

    /// Pick the provider and model for a request
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::NoRoute`] if nothing is configured for the
    /// request's use case
    pub async fn route(&self, request: &InferenceRequest) -> Result<RoutingDecision, RoutingError> {
        let config = self.config.read().await;

        if canary::sampled_out(&config.canary, request) {
            return Ok(decision(request, Provider::None, CANARY_SKIP_MODEL, RoutingReason::CanarySkip));
        }

        let (target, reason) = select(&config, request).ok_or(RoutingError::NoRoute {
            use_case: request.use_case,
        })?;

        if !self.health.is_available(target.provider)
            && let Some(fallback) = config.fallbacks.iter().find(|f| f.from == target.provider)
        {
            tracing::debug!(
                from = %target.provider,
                to = %fallback.to.provider,
                "primary provider unavailable, using fallback"
            );
            return Ok(decision(
                request,
                fallback.to.provider,
                &fallback.to.model,
                RoutingReason::Fallback,
            ));
        }

        Ok(decision(request, target.provider, &target.model, reason))
    }
}

/// Primary selection, ignoring provider health
fn select(config: &RouterConfig, request: &InferenceRequest) -> Option<(RouteTarget, RoutingReason)> {
    let use_case = request.use_case;

    let overrides = config
        .overrides
        .iter()
        .filter(|rule| {
            rule.when
                .iter()
                .all(|(key, value)| context_value(&request.context, key) == Some(value.as_str()))
        })
        .filter_map(|rule| rule.routes.get(use_case));

    if let Some(hinted) = request.hints.provider {
        let configured = overrides
            .clone()
            .chain(config.default.get(use_case))
            .find(|target| target.provider == hinted);

        if let Some(target) = configured {
            let model = request.hints.model.clone().unwrap_or_else(|| target.model.clone());
            return Some((
                RouteTarget {
                    provider: hinted,
                    model,
                },
                RoutingReason::Override,
            ));
        }
    }

    if let Some(target) = overrides.clone().next() {
        return Some((target.clone(), RoutingReason::Override));
    }

    config
        .default
        .get(use_case)
        .map(|target| (target.clone(), RoutingReason::Default))
}

fn context_value<'a>(context: &'a Context, key: &str) -> Option<&'a str> {
    match key {
        "tenant_id" => Some(&context.tenant_id),
        "service_id" => Some(&context.service_id),
        "sdk_name" => Some(&context.sdk_name),
        _ => None,
    }
}

fn decision(request: &InferenceRequest, provider: Provider, model: &str, reason: RoutingReason) -> RoutingDecision {
    RoutingDecision {
        context: request.context.clone(),
        use_case: request.use_case,
        provider,
        model: model.to_owned(),
        reason,
    }
}
