//! Test server wrapper that starts Switchboard on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use switchboard_config::Config;
use switchboard_pipeline::InferenceService;
use switchboard_server::Server;
use switchboard_telemetry::NoopTelemetry;
use tokio_util::sync::CancellationToken;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    service: Arc<InferenceService>,
}

impl TestServer {
    /// Start a server built entirely from configuration
    pub async fn start(raw: &str) -> anyhow::Result<Self> {
        let config = Config::from_toml(raw)?;
        let server = Server::new(config, Arc::new(NoopTelemetry)).await?;
        Self::run(server).await
    }

    /// Start a server around an assembled pipeline
    pub async fn with_service(service: InferenceService) -> anyhow::Result<Self> {
        let server = Server::with_service(&Config::default().server, Arc::new(service));
        Self::run(server).await
    }

    async fn run(server: Server) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let service = server.service();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            service,
        })
    }

    /// URL of a path on the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn service(&self) -> &InferenceService {
        &self.service
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
