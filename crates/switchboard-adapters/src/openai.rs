//! OpenAI-compatible chat completions backend
//!
//! Serves both `openai` and `qwen`; Qwen exposes the same wire format
//! under its compatible-mode endpoint.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use switchboard_config::{HttpProviderConfig, Pricing};
use switchboard_core::{InferenceRequest, Provider};
use url::Url;

use crate::{Adapter, AdapterError, AdapterOutput};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const QWEN_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Adapter for any OpenAI-compatible chat completions API
pub struct OpenAiCompatAdapter {
    provider: Provider,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    pricing: Pricing,
}

impl OpenAiCompatAdapter {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Config` if the provider has no HTTP default or
    /// the client cannot be built
    pub fn new(provider: Provider, config: &HttpProviderConfig) -> Result<Self, AdapterError> {
        let base_url = match (&config.base_url, provider) {
            (Some(url), _) => url.clone(),
            (None, Provider::OpenAi) => parse_default(OPENAI_BASE_URL)?,
            (None, Provider::Qwen) => parse_default(QWEN_BASE_URL)?,
            (None, other) => {
                return Err(AdapterError::Config(format!("provider {other} has no default base URL")));
            }
        };

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AdapterError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider,
            client,
            base_url,
            api_key: config.api_key.clone().filter(|key| !key.expose_secret().is_empty()),
            pricing: config.pricing,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

fn parse_default(url: &str) -> Result<Url, AdapterError> {
    Url::parse(url).map_err(|e| AdapterError::Config(format!("invalid default URL {url}: {e}")))
}

#[async_trait]
impl Adapter for OpenAiCompatAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn infer(&self, request: &InferenceRequest, model: &str) -> Result<AdapterOutput, AdapterError> {
        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
        };

        let response = self
            .authorized(self.client.post(self.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = %self.provider, error = %e, "upstream request failed");
                AdapterError::Upstream(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.provider, %status, "upstream returned error");
            return Err(AdapterError::Upstream(format!("provider returned {status}: {body}")));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AdapterError::InvalidResponse("response has no message content".to_owned()))?;

        let usage = completion.usage.unwrap_or_default();

        Ok(AdapterOutput {
            content,
            model: completion.model.unwrap_or_else(|| model.to_owned()),
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            cost_brl: self.pricing.cost(usage.prompt_tokens, usage.completion_tokens).max(0.0),
        })
    }

    async fn health_check(&self) -> Result<(), AdapterError> {
        let response = self
            .authorized(self.client.get(self.endpoint("models")))
            .send()
            .await
            .map_err(|e| AdapterError::Upstream(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AdapterError::Upstream(format!("health check returned {}", response.status())))
        }
    }
}

impl std::fmt::Debug for OpenAiCompatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatAdapter")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}
