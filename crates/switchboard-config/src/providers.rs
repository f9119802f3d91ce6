use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use switchboard_core::Provider;
use url::Url;

/// Inference backend configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    /// `OpenAI` chat completions
    #[serde(default)]
    pub openai: Option<HttpProviderConfig>,
    /// Qwen, via its OpenAI-compatible endpoint
    #[serde(default)]
    pub qwen: Option<HttpProviderConfig>,
    /// Local dry-run backend
    #[serde(default)]
    pub local: LocalProviderConfig,
}

impl ProvidersConfig {
    /// Configured HTTP backends
    pub fn http(&self) -> impl Iterator<Item = (Provider, &HttpProviderConfig)> {
        [(Provider::OpenAi, self.openai.as_ref()), (Provider::Qwen, self.qwen.as_ref())]
            .into_iter()
            .filter_map(|(provider, config)| config.map(|config| (provider, config)))
    }
}

/// An OpenAI-compatible HTTP backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpProviderConfig {
    /// Base URL override; each provider has a public default
    #[serde(default)]
    pub base_url: Option<Url>,
    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Token prices used to compute request cost
    #[serde(default)]
    pub pricing: Pricing,
    /// HTTP client timeout
    #[serde(default, deserialize_with = "crate::duration::deserialize_option")]
    pub timeout: Option<Duration>,
}

/// Token prices in BRL per million tokens
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pricing {
    #[serde(default)]
    pub input_per_mtok_brl: f64,
    #[serde(default)]
    pub output_per_mtok_brl: f64,
}

impl Pricing {
    /// Cost of a call in BRL
    pub fn cost(&self, tokens_in: u32, tokens_out: u32) -> f64 {
        let per_mtok = 1_000_000.0;
        f64::from(tokens_in) / per_mtok * self.input_per_mtok_brl
            + f64::from(tokens_out) / per_mtok * self.output_per_mtok_brl
    }
}

/// Local dry-run backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalProviderConfig {
    /// Register the local adapter
    #[serde(default = "default_local_enabled")]
    pub enabled: bool,
    /// Flat cost reported per call, in BRL
    #[serde(default = "default_local_cost")]
    pub cost_brl: f64,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            enabled: default_local_enabled(),
            cost_brl: default_local_cost(),
        }
    }
}

const fn default_local_enabled() -> bool {
    true
}

const fn default_local_cost() -> f64 {
    0.001
}
