use std::path::Path;

use secrecy::ExposeSecret;
use switchboard_policy::PolicyEngine;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a placeholder cannot be
    /// expanded, the TOML does not parse, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if a placeholder cannot be expanded, the TOML does
    /// not parse, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_server()?;
        self.validate_ai()?;
        self.router
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid router config: {e}"))?;
        self.budgets
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid budgets config: {e}"))?;
        self.validate_events()?;
        self.validate_providers()?;

        PolicyEngine::new(&self.policies).map_err(|e| anyhow::anyhow!("invalid policies config: {e}"))?;

        Ok(())
    }

    fn validate_server(&self) -> anyhow::Result<()> {
        let health = &self.server.health;
        if !health.enabled {
            return Ok(());
        }

        for (field, path) in [("path", &health.path), ("readiness_path", &health.readiness_path)] {
            if !path.starts_with('/') {
                anyhow::bail!("server.health.{field} must start with '/', got '{path}'");
            }
        }

        if health.path == health.readiness_path {
            anyhow::bail!("server.health.path and server.health.readiness_path must differ");
        }

        Ok(())
    }

    fn validate_ai(&self) -> anyhow::Result<()> {
        let estimate = self.ai.estimated_cost_brl;
        if !estimate.is_finite() || estimate < 0.0 {
            anyhow::bail!("ai.estimated_cost_brl must be a non-negative number, got {estimate}");
        }

        if self.ai.default_timeout.is_zero() {
            anyhow::bail!("ai.default_timeout must be greater than zero");
        }

        Ok(())
    }

    fn validate_events(&self) -> anyhow::Result<()> {
        if !self.events.enabled {
            return Ok(());
        }

        let has_url = self.events.url.as_ref().is_some_and(|url| !url.expose_secret().is_empty());
        if !has_url {
            anyhow::bail!("events.url is required when events are enabled");
        }

        if self.events.stream.is_empty() {
            anyhow::bail!("events.stream must not be empty");
        }

        if self.events.connect_timeout.is_zero() {
            anyhow::bail!("events.connect_timeout must be greater than zero");
        }

        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        for (provider, config) in self.providers.http() {
            let pricing = config.pricing;
            for (field, price) in [
                ("input_per_mtok_brl", pricing.input_per_mtok_brl),
                ("output_per_mtok_brl", pricing.output_per_mtok_brl),
            ] {
                if !price.is_finite() || price < 0.0 {
                    anyhow::bail!("providers.{provider}.pricing.{field} must be a non-negative number");
                }
            }
        }

        let local_cost = self.providers.local.cost_brl;
        if !local_cost.is_finite() || local_cost < 0.0 {
            anyhow::bail!("providers.local.cost_brl must be a non-negative number");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use switchboard_core::{BreachAction, Provider, UseCase};

    use crate::Config;

    const FULL: &str = r#"
        [server]
        listen_address = "0.0.0.0:9090"

        [ai]
        enabled = true
        estimated_cost_brl = 0.05
        default_timeout = "5s"

        [router.canary]
        percent = 5

        [router.default.generation]
        provider = "local"
        model = "base"

        [policies]
        fail_closed = false

        [[policies.pre]]
        type = "pii"
        name = "pii_check"

        [budgets.global]
        daily_cap_brl = 100.0
        on_breach = "alert_only"

        [events]
        enabled = true
        url = "{{ env.SB_LOADER_REDIS_URL }}"

        [providers.openai]
        api_key = '{{ env.SB_LOADER_OPENAI_KEY | default("") }}'
    "#;

    #[test]
    fn loads_full_config_from_file() {
        temp_env::with_var("SB_LOADER_REDIS_URL", Some("redis://localhost:6379"), || {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(FULL.as_bytes()).unwrap();

            let config = Config::load(file.path()).unwrap();

            assert!(config.ai.enabled);
            assert_eq!(config.ai.default_timeout, Duration::from_secs(5));
            assert_eq!(config.router.canary.percent, 5);
            assert_eq!(
                config.router.default.get(UseCase::Generation).unwrap().provider,
                Provider::Local
            );
            assert!(!config.policies.fail_closed);
            assert_eq!(config.policies.pre.len(), 1);
            assert_eq!(config.budgets.global.unwrap().on_breach, BreachAction::AlertOnly);
            assert!(config.events.enabled);
            assert!(config.providers.openai.is_some());
            assert!(config.telemetry.is_none());
        });
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Config::load(std::path::Path::new("/nonexistent/switchboard.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn empty_config_is_valid() {
        let config = Config::from_toml("").unwrap();
        assert!(!config.ai.enabled);
        assert!(config.server.health.enabled);
        assert_eq!(config.server.health.path, "/health");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Config::from_toml("[ai]\nturbo = true").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn events_require_url() {
        let err = Config::from_toml("[events]\nenabled = true").unwrap_err();
        assert!(err.to_string().contains("events.url"));
    }

    #[test]
    fn health_paths_must_differ() {
        let err = Config::from_toml("[server.health]\nreadiness_path = \"/health\"").unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn zero_event_connect_timeout_is_rejected() {
        let err = Config::from_toml("[events]\nenabled = true\nurl = \"redis://localhost\"\nconnect_timeout = \"0s\"")
            .unwrap_err();
        assert!(err.to_string().contains("events.connect_timeout"));
    }

    #[test]
    fn canary_percent_is_bounded() {
        let err = Config::from_toml("[router.canary]\npercent = 150").unwrap_err();
        assert!(err.to_string().contains("invalid router config"));
    }

    #[test]
    fn negative_estimate_is_rejected() {
        let err = Config::from_toml("[ai]\nestimated_cost_brl = -1.0").unwrap_err();
        assert!(err.to_string().contains("estimated_cost_brl"));
    }

    #[test]
    fn invalid_policy_regex_is_rejected() {
        let err = Config::from_toml(
            r#"
            [[policies.pre]]
            type = "regex_pattern"
            name = "broken"
            pattern = "(unclosed"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid policies config"));
    }

    #[test]
    fn unset_placeholder_fails_load() {
        temp_env::with_var_unset("SB_LOADER_MISSING", || {
            let err = Config::from_toml("[events]\nurl = \"{{ env.SB_LOADER_MISSING }}\"").unwrap_err();
            assert!(err.to_string().contains("SB_LOADER_MISSING"));
        });
    }
}
