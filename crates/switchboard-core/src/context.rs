use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Caller identity attached to every inference request
///
/// The identity fields double as telemetry labels, so they are plain
/// strings and an absent value is an empty string rather than `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Tenant the request is billed to
    #[serde(default)]
    pub tenant_id: String,
    /// Calling service identifier
    #[serde(default)]
    pub service_id: String,
    /// SDK that issued the call
    #[serde(default)]
    pub sdk_name: String,
    /// When the caller created the request
    #[serde(default = "Timestamp::now")]
    pub timestamp: Timestamp,
}

impl Context {
    /// Create a context stamped with the current time
    pub fn new(tenant_id: impl Into<String>, service_id: impl Into<String>, sdk_name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            service_id: service_id.into(),
            sdk_name: sdk_name.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// Identity labels in `(key, value)` form, in a stable order
    pub fn identity_labels(&self) -> [(&'static str, &str); 3] {
        [
            ("service_id", self.service_id.as_str()),
            ("sdk_name", self.sdk_name.as_str()),
            ("tenant_id", self.tenant_id.as_str()),
        ]
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_fills_missing_fields() {
        let ctx: Context = serde_json::from_str(r#"{"tenant_id": "acme"}"#).unwrap();
        assert_eq!(ctx.tenant_id, "acme");
        assert!(ctx.service_id.is_empty());
        assert!(ctx.sdk_name.is_empty());
    }

    #[test]
    fn identity_labels_order() {
        let ctx = Context::new("acme", "billing-svc", "sdk-go");
        let labels = ctx.identity_labels();
        assert_eq!(labels[0], ("service_id", "billing-svc"));
        assert_eq!(labels[1], ("sdk_name", "sdk-go"));
        assert_eq!(labels[2], ("tenant_id", "acme"));
    }
}
