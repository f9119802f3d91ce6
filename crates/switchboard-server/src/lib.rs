//! HTTP surface for the inference pipeline

#![allow(clippy::must_use_candidate)]

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use switchboard_config::{Config, ServerConfig};
use switchboard_events::{EventPublisher, NoopPublisher};
use switchboard_pipeline::InferenceService;
use switchboard_telemetry::Telemetry;
use tower_http::trace::TraceLayer;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    service: Arc<InferenceService>,
}

impl Server {
    /// Build the server and every pipeline subsystem from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the event publisher cannot connect or the
    /// pipeline cannot be built. A disabled pipeline never connects.
    pub async fn new(config: Config, telemetry: Arc<dyn Telemetry>) -> anyhow::Result<Self> {
        let events: Arc<dyn EventPublisher> = if config.ai.enabled {
            switchboard_events::from_config(&config.events).await?
        } else {
            Arc::new(NoopPublisher)
        };
        let service = InferenceService::from_config(&config, events, telemetry)?;

        tracing::info!(enabled = service.enabled(), "inference pipeline ready");

        Ok(Self::with_service(&config.server, Arc::new(service)))
    }

    /// Build the server around an assembled pipeline
    pub fn with_service(config: &ServerConfig, service: Arc<InferenceService>) -> Self {
        let listen_address = config
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let mut app = routes::inference_router(Arc::clone(&service));

        if config.health.enabled {
            app = app
                .route(&config.health.path, axum::routing::get(routes::health))
                .merge(routes::readiness_router(&config.health.readiness_path, Arc::clone(&service)));
        }

        app = app.layer(TraceLayer::new_for_http());

        Self {
            router: app,
            listen_address,
            service,
        }
    }

    /// Get the configured listen address
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Override the listen address
    pub const fn set_listen_address(&mut self, listen_address: SocketAddr) {
        self.listen_address = listen_address;
    }

    /// Shared pipeline handle
    pub fn service(&self) -> Arc<InferenceService> {
        Arc::clone(&self.service)
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered, then closes the
    /// pipeline so queued events are flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        if let Err(e) = self.service.close().await {
            tracing::warn!(error = %e, "failed to close event publisher");
        }

        Ok(())
    }
}
