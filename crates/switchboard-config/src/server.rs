use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind; the server falls back to `0.0.0.0:3000`
    pub listen_address: Option<SocketAddr>,
    /// Health endpoint
    #[serde(default)]
    pub health: HealthConfig,
}

/// Health check endpoint configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_path")]
    pub path: String,
    /// Readiness endpoint; reports the health of every inference backend
    #[serde(default = "default_readiness_path")]
    pub readiness_path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: default_path(),
            readiness_path: default_readiness_path(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

fn default_path() -> String {
    "/health".to_owned()
}

fn default_readiness_path() -> String {
    "/ready".to_owned()
}
