use std::time::Duration;

use serde::Deserialize;

/// Pipeline-wide switches
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    /// Master switch; a disabled pipeline rejects every request
    #[serde(default)]
    pub enabled: bool,
    /// Cost assumed for a request during budget admission, in BRL
    #[serde(default = "default_estimated_cost")]
    pub estimated_cost_brl: f64,
    /// Backend deadline applied when a request sets none
    #[serde(default = "default_timeout", deserialize_with = "crate::duration::deserialize")]
    pub default_timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            estimated_cost_brl: default_estimated_cost(),
            default_timeout: default_timeout(),
        }
    }
}

const fn default_estimated_cost() -> f64 {
    0.01
}

const fn default_timeout() -> Duration {
    Duration::from_secs(30)
}
