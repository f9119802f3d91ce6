use thiserror::Error;

/// Policy engine errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Invalid regex pattern in configuration
    #[error("invalid regex pattern: {0}")]
    InvalidPattern(String),
    /// A rule could not be evaluated against the content
    #[error("rule '{rule}' could not be evaluated: {reason}")]
    Evaluation {
        /// Name of the rule that failed
        rule: String,
        /// Underlying failure
        reason: String,
    },
}
