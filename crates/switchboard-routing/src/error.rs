//! Routing-specific error types

use switchboard_core::UseCase;
use thiserror::Error;

/// Errors that can occur while routing a request
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Neither an override nor the default table covers the use case
    #[error("no route configured for use case: {use_case}")]
    NoRoute { use_case: UseCase },

    /// Routing table failed validation
    #[error("invalid routing config: {0}")]
    InvalidConfig(String),
}
