use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Event stream configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Publish events; a no-op publisher is used otherwise
    #[serde(default)]
    pub enabled: bool,
    /// Redis connection URL
    #[serde(default)]
    pub url: Option<SecretString>,
    /// Stream key events are appended to
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Prefix of every event subject
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    /// Approximate stream length cap (`MAXLEN ~`)
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    /// Deadline for each connection attempt to the backend
    #[serde(default = "default_connect_timeout", deserialize_with = "crate::duration::deserialize")]
    pub connect_timeout: Duration,
    /// Reconnect attempts before the backend is reported unreachable
    #[serde(default = "default_connect_retries")]
    pub connect_retries: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            stream: default_stream(),
            subject_prefix: default_subject_prefix(),
            max_len: default_max_len(),
            connect_timeout: default_connect_timeout(),
            connect_retries: default_connect_retries(),
        }
    }
}

fn default_stream() -> String {
    "switchboard:events".to_owned()
}

fn default_subject_prefix() -> String {
    "ai".to_owned()
}

const fn default_max_len() -> usize {
    100_000
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

const fn default_connect_retries() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_defaults_fail_fast() {
        let config: EventsConfig = toml::from_str("").unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_retries, 2);
    }

    #[test]
    fn connection_settings_parse() {
        let config: EventsConfig = toml::from_str("connect_timeout = \"250ms\"\nconnect_retries = 0").unwrap();
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.connect_retries, 0);
    }
}
