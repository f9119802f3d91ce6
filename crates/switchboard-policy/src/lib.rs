//! Content policy checks for inference requests and responses
//!
//! Rules run in configuration order. The first blocking match ends the
//! check; `warn` matches are collected and the content is allowed.

mod error;
mod rule;

use serde::Deserialize;
use switchboard_core::{Context, InferenceRequest, InferenceResponse, Phase, PolicyBlock, Severity};

pub use error::PolicyError;
pub use rule::{PiiType, Rule};
use rule::CompiledRule;

/// Marker published in place of content that triggered a rule
pub const REDACTED_SAMPLE: &str = "[REDACTED]";

/// Policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRules {
    /// Treat rule evaluation failures as terminal
    #[serde(default = "default_fail_closed")]
    pub fail_closed: bool,
    /// Rules applied to prompts
    #[serde(default)]
    pub pre: Vec<Rule>,
    /// Rules applied to generated content
    #[serde(default)]
    pub post: Vec<Rule>,
}

impl Default for PolicyRules {
    fn default() -> Self {
        Self {
            fail_closed: default_fail_closed(),
            pre: Vec::new(),
            post: Vec::new(),
        }
    }
}

const fn default_fail_closed() -> bool {
    true
}

/// A non-blocking rule match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyWarning {
    /// Rule that matched
    pub rule: String,
    /// Why it matched
    pub reason: String,
}

/// Result of a policy check
#[derive(Debug, Clone, Default)]
pub struct PolicyVerdict {
    /// Blocking match, if any
    pub block: Option<PolicyBlock>,
    /// Non-blocking matches seen before the check ended
    pub warnings: Vec<PolicyWarning>,
}

impl PolicyVerdict {
    /// Whether the content may proceed
    pub const fn allowed(&self) -> bool {
        self.block.is_none()
    }
}

/// Compiled policy engine
pub struct PolicyEngine {
    pre: Vec<CompiledRule>,
    post: Vec<CompiledRule>,
    fail_closed: bool,
}

impl PolicyEngine {
    /// Compile the configured rules
    ///
    /// # Errors
    ///
    /// Returns an error if a regex pattern fails to compile
    pub fn new(rules: &PolicyRules) -> Result<Self, PolicyError> {
        let compile = |rules: &[Rule]| rules.iter().map(CompiledRule::compile).collect::<Result<Vec<_>, _>>();

        Ok(Self {
            pre: compile(&rules.pre)?,
            post: compile(&rules.post)?,
            fail_closed: rules.fail_closed,
        })
    }

    /// Whether evaluation failures must reject the request
    pub const fn fail_closed(&self) -> bool {
        self.fail_closed
    }

    /// Check a prompt before routing
    ///
    /// # Errors
    ///
    /// Returns an error if a rule cannot be evaluated
    pub fn check_pre(&self, request: &InferenceRequest) -> Result<PolicyVerdict, PolicyError> {
        evaluate(&self.pre, &request.context, &request.prompt, Phase::Pre)
    }

    /// Check generated content after inference
    ///
    /// # Errors
    ///
    /// Returns an error if a rule cannot be evaluated
    pub fn check_post(&self, context: &Context, response: &InferenceResponse) -> Result<PolicyVerdict, PolicyError> {
        evaluate(&self.post, context, &response.content, Phase::Post)
    }
}

fn evaluate(
    rules: &[CompiledRule],
    context: &Context,
    content: &str,
    phase: Phase,
) -> Result<PolicyVerdict, PolicyError> {
    let mut verdict = PolicyVerdict::default();
    if rules.is_empty() || content.is_empty() {
        return Ok(verdict);
    }

    let lowered = content.to_lowercase();

    for rule in rules {
        let Some(reason) = rule.evaluate(content, &lowered)? else {
            continue;
        };

        match rule.severity {
            Severity::Block => {
                tracing::debug!(rule = %rule.name, %phase, %reason, "policy rule blocked content");
                verdict.block = Some(PolicyBlock {
                    context: context.clone(),
                    rule: rule.name.clone(),
                    severity: rule.severity,
                    phase,
                    sample: REDACTED_SAMPLE.to_owned(),
                });
                return Ok(verdict);
            }
            Severity::Warn => {
                tracing::debug!(rule = %rule.name, %phase, %reason, "policy rule matched at warn severity");
                verdict.warnings.push(PolicyWarning {
                    rule: rule.name.clone(),
                    reason,
                });
            }
        }
    }

    Ok(verdict)
}
