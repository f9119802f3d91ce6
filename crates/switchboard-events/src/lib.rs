//! Decision and outcome events for the inference pipeline
//!
//! Publishing is fire-and-forget from the caller's point of view: a failed
//! publish is reported as an error the caller logs, never retried here.

#![allow(clippy::must_use_candidate)]

pub mod event;
mod stream;

use std::sync::Arc;

use async_trait::async_trait;
use switchboard_config::EventsConfig;
use switchboard_core::{InferenceRequest, InferenceResponse, PolicyBlock, Provider, RoutingDecision};
use thiserror::Error;

pub use event::{EncodedEvent, EventKind, InferenceFailure, InferenceSummary};
pub use stream::RedisStreamPublisher;

/// Event publishing errors
#[derive(Debug, Error)]
pub enum EventError {
    /// Event could not be encoded
    #[error("serialization: {0}")]
    Serialization(String),
    /// Publish queue is at capacity
    #[error("event queue full, dropped {subject}")]
    QueueFull { subject: String },
    /// Publisher was closed
    #[error("event publisher closed")]
    Closed,
    /// Stream backend connection or command error
    #[error("event backend: {0}")]
    Backend(String),
}

/// Sink for pipeline events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// A policy rule blocked content
    async fn publish_policy_block(&self, block: &PolicyBlock) -> Result<(), EventError>;

    /// The router selected a provider and model
    async fn publish_router_decision(&self, decision: &RoutingDecision) -> Result<(), EventError>;

    /// A request completed
    async fn publish_inference_summary(
        &self,
        request: &InferenceRequest,
        response: &InferenceResponse,
    ) -> Result<(), EventError>;

    /// A request failed after routing
    async fn publish_inference_error(
        &self,
        request: &InferenceRequest,
        provider: Provider,
        model: &str,
        code: &str,
        message: &str,
    ) -> Result<(), EventError>;

    /// Flush queued events and release the backend
    async fn close(&self) -> Result<(), EventError>;
}

/// Publisher that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish_policy_block(&self, _block: &PolicyBlock) -> Result<(), EventError> {
        Ok(())
    }

    async fn publish_router_decision(&self, _decision: &RoutingDecision) -> Result<(), EventError> {
        Ok(())
    }

    async fn publish_inference_summary(
        &self,
        _request: &InferenceRequest,
        _response: &InferenceResponse,
    ) -> Result<(), EventError> {
        Ok(())
    }

    async fn publish_inference_error(
        &self,
        _request: &InferenceRequest,
        _provider: Provider,
        _model: &str,
        _code: &str,
        _message: &str,
    ) -> Result<(), EventError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), EventError> {
        Ok(())
    }
}

/// Build the publisher selected by configuration
///
/// # Errors
///
/// Returns an error if events are enabled and the stream backend cannot be
/// reached
pub async fn from_config(config: &EventsConfig) -> Result<Arc<dyn EventPublisher>, EventError> {
    if !config.enabled {
        tracing::debug!("events disabled, using no-op publisher");
        return Ok(Arc::new(NoopPublisher));
    }

    let publisher = RedisStreamPublisher::connect(config).await?;
    tracing::info!(stream = %config.stream, prefix = %config.subject_prefix, "publishing events to redis stream");

    Ok(Arc::new(publisher))
}

#[cfg(test)]
mod tests {
    use switchboard_core::{Context, RoutingReason, UseCase};

    use super::*;

    #[tokio::test]
    async fn disabled_config_yields_noop() {
        let publisher = from_config(&EventsConfig::default()).await.unwrap();

        let decision = RoutingDecision {
            context: Context::default(),
            use_case: UseCase::Generation,
            provider: Provider::Local,
            model: "base".to_owned(),
            reason: RoutingReason::Default,
        };

        publisher.publish_router_decision(&decision).await.unwrap();
        publisher.close().await.unwrap();
    }
}
