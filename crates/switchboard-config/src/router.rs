use indexmap::IndexMap;
use serde::Deserialize;
use switchboard_core::{Provider, UseCase};

/// Routing table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Canary sampling
    #[serde(default)]
    pub canary: CanaryConfig,
    /// Route per use case when no override matches
    #[serde(default)]
    pub default: UseCaseRoutes,
    /// Context-matched routes, first match wins
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,
    /// Replacements for providers whose circuit is open
    #[serde(default)]
    pub fallbacks: Vec<FallbackRule>,
    /// Provider health tracking
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Context fields an override `when` condition may test
pub const OVERRIDE_CONTEXT_KEYS: [&str; 3] = ["tenant_id", "service_id", "sdk_name"];

impl RouterConfig {
    /// Validate the routing table
    ///
    /// # Errors
    ///
    /// Returns an error if the canary percentage is out of range, a route
    /// targets the `none` provider, or an override tests an unknown context
    /// field
    pub fn validate(&self) -> Result<(), String> {
        if self.canary.percent > 100 {
            return Err(format!("canary percent must be within 0..=100, got {}", self.canary.percent));
        }

        let check = |target: &RouteTarget, origin: &str| {
            if target.provider == Provider::None {
                return Err(format!("{origin} must not target provider 'none'"));
            }
            if target.model.trim().is_empty() {
                return Err(format!("{origin} must name a model"));
            }
            Ok(())
        };

        for (use_case, target) in self.default.routes() {
            check(target, &format!("default route for {use_case}"))?;
        }

        for (index, rule) in self.overrides.iter().enumerate() {
            if rule.when.is_empty() {
                return Err(format!("override #{index} has an empty 'when' condition"));
            }
            if let Some(key) = rule.when.keys().find(|key| !OVERRIDE_CONTEXT_KEYS.contains(&key.as_str())) {
                return Err(format!(
                    "override #{index} tests unknown context field '{key}', expected one of {}",
                    OVERRIDE_CONTEXT_KEYS.join(", ")
                ));
            }
            for (use_case, target) in rule.routes.routes() {
                check(target, &format!("override #{index} route for {use_case}"))?;
            }
        }

        for (index, rule) in self.fallbacks.iter().enumerate() {
            if rule.from == rule.to.provider {
                return Err(format!("fallback #{index} falls back to the same provider '{}'", rule.from));
            }
            check(&rule.to, &format!("fallback #{index}"))?;
        }

        Ok(())
    }
}

/// Canary sampling settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanaryConfig {
    /// Share of traffic, in percent, that skips real inference
    #[serde(default)]
    pub percent: u32,
    /// How requests are assigned to the canary
    #[serde(default)]
    pub sampling: CanarySampling,
}

/// Canary bucket assignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanarySampling {
    /// Independent draw per request
    #[default]
    Random,
    /// Stable bucket derived from the caller identity and prompt
    Hash,
}

/// A provider/model pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteTarget {
    pub provider: Provider,
    pub model: String,
}

/// One optional route per use case
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UseCaseRoutes {
    #[serde(default)]
    pub classification: Option<RouteTarget>,
    #[serde(default)]
    pub generation: Option<RouteTarget>,
    #[serde(default)]
    pub rerank: Option<RouteTarget>,
    #[serde(default)]
    pub summarize: Option<RouteTarget>,
}

impl UseCaseRoutes {
    /// Route configured for a use case
    pub const fn get(&self, use_case: UseCase) -> Option<&RouteTarget> {
        match use_case {
            UseCase::Classification => self.classification.as_ref(),
            UseCase::Generation => self.generation.as_ref(),
            UseCase::Rerank => self.rerank.as_ref(),
            UseCase::Summarize => self.summarize.as_ref(),
        }
    }

    /// Configured routes in use case order
    pub fn routes(&self) -> impl Iterator<Item = (UseCase, &RouteTarget)> {
        [
            UseCase::Classification,
            UseCase::Generation,
            UseCase::Rerank,
            UseCase::Summarize,
        ]
        .into_iter()
        .filter_map(|use_case| self.get(use_case).map(|target| (use_case, target)))
    }
}

/// Routes applied when the request context matches
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideRule {
    /// Context fields that must all match: `tenant_id`, `service_id`, `sdk_name`
    pub when: IndexMap<String, String>,
    /// Routes to use on match
    #[serde(rename = "use")]
    pub routes: UseCaseRoutes,
}

/// Replacement route for an unavailable provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackRule {
    pub from: Provider,
    pub to: RouteTarget,
}

/// Windowed error-count circuit breaker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Errors within the window that open the circuit
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// Error counting window, in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// How long an open circuit waits before a trial request, in seconds
    #[serde(default = "default_recovery_seconds")]
    pub recovery_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            window_seconds: default_window_seconds(),
            recovery_seconds: default_recovery_seconds(),
        }
    }
}

const fn default_error_threshold() -> u32 {
    5
}

const fn default_window_seconds() -> u64 {
    60
}

const fn default_recovery_seconds() -> u64 {
    30
}
