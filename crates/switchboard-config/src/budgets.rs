use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use switchboard_core::BreachAction;

/// Spend limits per accounting scope
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetsConfig {
    /// Length of the accounting window
    #[serde(default = "default_window", deserialize_with = "crate::duration::deserialize")]
    pub window: Duration,
    /// Limit over all traffic
    #[serde(default)]
    pub global: Option<BudgetLimit>,
    /// Limits keyed by tenant id
    #[serde(default)]
    pub tenants: IndexMap<String, BudgetLimit>,
    /// Limits keyed by service id
    #[serde(default)]
    pub services: IndexMap<String, BudgetLimit>,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            global: None,
            tenants: IndexMap::new(),
            services: IndexMap::new(),
        }
    }
}

impl BudgetsConfig {
    /// Validate caps and window
    ///
    /// # Errors
    ///
    /// Returns an error if a cap is not a positive finite number or the
    /// window is zero
    pub fn validate(&self) -> Result<(), String> {
        if self.window.is_zero() {
            return Err("budgets.window must be greater than zero".to_owned());
        }

        let limits = self
            .global
            .iter()
            .map(|limit| ("global".to_owned(), limit))
            .chain(self.tenants.iter().map(|(id, limit)| (format!("tenants.{id}"), limit)))
            .chain(self.services.iter().map(|(id, limit)| (format!("services.{id}"), limit)));

        for (name, limit) in limits {
            if !limit.daily_cap_brl.is_finite() || limit.daily_cap_brl <= 0.0 {
                return Err(format!(
                    "budgets.{name}.daily_cap_brl must be a positive number, got {}",
                    limit.daily_cap_brl
                ));
            }
        }

        Ok(())
    }
}

/// Cap and breach behavior for one scope
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetLimit {
    /// Spend cap per window, in BRL
    pub daily_cap_brl: f64,
    /// What happens when a request would exceed the cap
    #[serde(default)]
    pub on_breach: BreachAction,
}

const fn default_window() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scopes() {
        let config: BudgetsConfig = toml::from_str(
            r#"
            window = "1h"

            [global]
            daily_cap_brl = 500.0

            [tenants.acme]
            daily_cap_brl = 50.0
            on_breach = "degrade"

            [services.search]
            daily_cap_brl = 5.0
            on_breach = "alert_only"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.window, Duration::from_secs(3600));
        assert_eq!(config.global.unwrap().on_breach, BreachAction::Block);
        assert_eq!(config.tenants["acme"].on_breach, BreachAction::Degrade);
        assert_eq!(config.services["search"].on_breach, BreachAction::AlertOnly);
    }

    #[test]
    fn default_window_is_a_day() {
        let config: BudgetsConfig = toml::from_str("").unwrap();
        assert_eq!(config.window, Duration::from_secs(86_400));
        assert!(config.global.is_none());
    }

    #[test]
    fn rejects_non_positive_caps() {
        let config: BudgetsConfig = toml::from_str("[tenants.acme]\ndaily_cap_brl = 0.0").unwrap();
        assert!(config.validate().unwrap_err().contains("tenants.acme"));
    }
}
