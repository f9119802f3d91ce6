//! Inference backends
//!
//! Each [`Provider`] is served by one [`Adapter`]. The registry maps
//! providers to adapters; a provider with no adapter is a lookup miss the
//! caller must handle.

#![allow(clippy::must_use_candidate)]

mod local;
mod openai;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use switchboard_config::ProvidersConfig;
use switchboard_core::{InferenceRequest, Provider};
use thiserror::Error;

pub use local::{LOCAL_CONTENT_PREFIX, LocalAdapter};
pub use openai::OpenAiCompatAdapter;

/// Errors returned by adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Backend could not be reached or returned an error status
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Backend replied with something we could not interpret
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),
    /// Adapter could not be built from configuration
    #[error("adapter configuration: {0}")]
    Config(String),
}

/// What a backend produced for one call
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutput {
    pub content: String,
    /// Model that actually served the call
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    /// Cost in BRL, never negative
    pub cost_brl: f64,
}

/// An inference backend
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Provider this adapter serves
    fn provider(&self) -> Provider;

    /// Run inference for a request on the routed model
    async fn infer(&self, request: &InferenceRequest, model: &str) -> Result<AdapterOutput, AdapterError>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> Result<(), AdapterError>;
}

/// Adapters keyed by provider
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every configured provider
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP adapter cannot be built
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, AdapterError> {
        let mut registry = Self::new();

        if config.local.enabled {
            registry.register(Arc::new(LocalAdapter::new(config.local.cost_brl)));
        }

        for (provider, provider_config) in config.http() {
            registry.register(Arc::new(OpenAiCompatAdapter::new(provider, provider_config)?));
        }

        tracing::info!(providers = ?registry.providers(), "inference adapters registered");

        Ok(registry)
    }

    /// Add or replace the adapter for its provider
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    /// Adapter for a provider, if one is registered
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Registered providers, in a stable order
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers: Vec<_> = self.adapters.keys().copied().collect();
        providers.sort_by_key(|provider| provider.as_ref().to_owned());
        providers
    }

    /// Run every adapter's health check, in provider order
    pub async fn check_health(&self) -> Vec<(Provider, Result<(), AdapterError>)> {
        let mut results = Vec::with_capacity(self.adapters.len());
        for provider in self.providers() {
            if let Some(adapter) = self.adapters.get(&provider) {
                results.push((provider, adapter.health_check().await));
            }
        }
        results
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}
