//! Spend limits per accounting scope
//!
//! Spend is kept in memory as micro-BRL in atomic counters, one per
//! `(scope, id)`, over fixed windows. Admission compares committed spend
//! plus an estimate against each configured cap; the real cost is committed
//! after the call completes.

#![allow(clippy::must_use_candidate)]

mod counter;
mod error;

use switchboard_config::{BudgetLimit, BudgetsConfig};
use switchboard_core::{BudgetBreach, BudgetScope, InferenceRequest};

pub use error::BudgetError;
use counter::{Counters, ScopeKey};

/// Result of an admission check
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetCheck {
    /// Whether the request may proceed
    pub allowed: bool,
    /// First scope whose cap the estimate would exceed
    pub breach: Option<BudgetBreach>,
}

/// Committed spend of a capped scope after recording usage
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeUsage {
    pub scope: BudgetScope,
    /// Tenant or service id; empty for the global scope
    pub scope_id: String,
    pub cap_brl: f64,
    pub used_brl: f64,
    /// Cap minus committed spend, never negative
    pub remaining_brl: f64,
}

/// In-memory budget tracker
pub struct BudgetTracker {
    config: BudgetsConfig,
    counters: Counters,
}

impl BudgetTracker {
    pub fn new(config: BudgetsConfig) -> Self {
        Self {
            counters: Counters::new(config.window),
            config,
        }
    }

    /// Check whether an estimated cost fits every scope the request belongs to
    ///
    /// Scopes are checked global, then tenant, then service; the first
    /// scope that would be exceeded is reported.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::InvalidCost`] if the estimate is negative or
    /// not finite
    pub fn check_budget(&self, request: &InferenceRequest, estimated_cost: f64) -> Result<BudgetCheck, BudgetError> {
        let estimate = counter::to_micros(estimated_cost)?;

        for (key, limit) in self.capped_scopes(request) {
            let used = self.counters.spent(&key);
            let cap = counter::to_micros(limit.daily_cap_brl)?;

            if used.saturating_add(estimate) > cap {
                let breach = BudgetBreach {
                    scope: key.scope,
                    scope_id: key.id,
                    cap_brl: limit.daily_cap_brl,
                    used_brl: counter::to_brl(used),
                    action: limit.on_breach,
                };

                tracing::debug!(
                    scope = %breach.scope,
                    scope_id = %breach.scope_id,
                    used_brl = breach.used_brl,
                    cap_brl = breach.cap_brl,
                    action = %breach.action,
                    "budget cap would be exceeded"
                );

                return Ok(BudgetCheck {
                    allowed: !breach.is_blocking(),
                    breach: Some(breach),
                });
            }
        }

        Ok(BudgetCheck {
            allowed: true,
            breach: None,
        })
    }

    /// Commit the real cost of a completed request
    ///
    /// The cost is added to the global, tenant and service counters. The
    /// returned list covers every capped scope the request belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::InvalidCost`] if the cost is negative or not
    /// finite
    pub fn record_usage(&self, request: &InferenceRequest, actual_cost: f64) -> Result<Vec<ScopeUsage>, BudgetError> {
        let cost = counter::to_micros(actual_cost)?;

        for key in scope_keys(request) {
            self.counters.add(&key, cost);
        }

        tracing::debug!(
            tenant_id = %request.context.tenant_id,
            service_id = %request.context.service_id,
            cost_brl = actual_cost,
            "usage recorded"
        );

        Ok(self
            .capped_scopes(request)
            .map(|(key, limit)| {
                let used_brl = counter::to_brl(self.counters.spent(&key));
                ScopeUsage {
                    scope: key.scope,
                    scope_id: key.id,
                    cap_brl: limit.daily_cap_brl,
                    used_brl,
                    remaining_brl: (limit.daily_cap_brl - used_brl).max(0.0),
                }
            })
            .collect())
    }

    /// Committed spend for a scope in the current window, in BRL
    pub fn spent(&self, scope: BudgetScope, scope_id: &str) -> f64 {
        counter::to_brl(self.counters.spent(&ScopeKey::new(scope, scope_id)))
    }

    /// Clear every counter
    pub fn reset(&self) {
        self.counters.clear();
        tracing::info!("budget counters reset");
    }

    fn capped_scopes<'a>(&'a self, request: &InferenceRequest) -> impl Iterator<Item = (ScopeKey, &'a BudgetLimit)> {
        let context = &request.context;

        let global = self
            .config
            .global
            .as_ref()
            .map(|limit| (ScopeKey::new(BudgetScope::Global, ""), limit));
        let tenant = self
            .config
            .tenants
            .get(&context.tenant_id)
            .map(|limit| (ScopeKey::new(BudgetScope::Tenant, &context.tenant_id), limit));
        let service = self
            .config
            .services
            .get(&context.service_id)
            .map(|limit| (ScopeKey::new(BudgetScope::Service, &context.service_id), limit));

        global.into_iter().chain(tenant).chain(service)
    }
}

/// Every scope a request's spend is attributed to
fn scope_keys(request: &InferenceRequest) -> impl Iterator<Item = ScopeKey> {
    let context = &request.context;
    let tenant = (!context.tenant_id.is_empty()).then(|| ScopeKey::new(BudgetScope::Tenant, &context.tenant_id));
    let service = (!context.service_id.is_empty()).then(|| ScopeKey::new(BudgetScope::Service, &context.service_id));

    std::iter::once(ScopeKey::new(BudgetScope::Global, ""))
        .chain(tenant)
        .chain(service)
}
