#![allow(clippy::must_use_candidate)]

pub mod ai;
pub mod budgets;
mod duration;
mod env;
pub mod events;
mod loader;
pub mod providers;
pub mod router;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use ai::*;
pub use budgets::*;
pub use events::*;
pub use providers::*;
pub use router::*;
pub use server::*;
pub use switchboard_policy::{PiiType, PolicyRules, Rule};
pub use telemetry::TelemetryConfig;

/// Top-level Switchboard configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Pipeline switches
    #[serde(default)]
    pub ai: AiConfig,
    /// Routing table
    #[serde(default)]
    pub router: RouterConfig,
    /// Content policies
    #[serde(default)]
    pub policies: PolicyRules,
    /// Spend limits
    #[serde(default)]
    pub budgets: BudgetsConfig,
    /// Event stream
    #[serde(default)]
    pub events: EventsConfig,
    /// Inference backends
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
