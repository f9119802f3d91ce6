//! Local dry-run backend

use async_trait::async_trait;
use switchboard_core::{InferenceRequest, Provider};

use crate::{Adapter, AdapterError, AdapterOutput};

/// Prefix of every local response
pub const LOCAL_CONTENT_PREFIX: &str = "[LOCAL NO-OP] ";

const LOCAL_TOKENS_OUT: u32 = 50;

/// Echoes the prompt back without calling any model
#[derive(Debug, Clone, Copy)]
pub struct LocalAdapter {
    cost_brl: f64,
}

impl LocalAdapter {
    /// Negative costs are clamped to zero
    pub const fn new(cost_brl: f64) -> Self {
        Self {
            cost_brl: cost_brl.max(0.0),
        }
    }
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn provider(&self) -> Provider {
        Provider::Local
    }

    async fn infer(&self, request: &InferenceRequest, model: &str) -> Result<AdapterOutput, AdapterError> {
        let tokens_in = u32::try_from(request.prompt.len() / 4).unwrap_or(u32::MAX);

        tracing::debug!(model, tokens_in, "local dry-run inference");

        Ok(AdapterOutput {
            content: format!("{LOCAL_CONTENT_PREFIX}{}", request.prompt),
            model: model.to_owned(),
            tokens_in,
            tokens_out: LOCAL_TOKENS_OUT,
            cost_brl: self.cost_brl,
        })
    }

    async fn health_check(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::{Context, UseCase};

    use super::*;

    #[tokio::test]
    async fn echoes_prompt_with_flat_cost() {
        let adapter = LocalAdapter::new(0.001);
        let request = InferenceRequest::new(Context::new("t", "s", "k"), UseCase::Generation, "twelve chars");

        let output = adapter.infer(&request, "base").await.unwrap();

        assert_eq!(output.content, "[LOCAL NO-OP] twelve chars");
        assert_eq!(output.model, "base");
        assert_eq!(output.tokens_in, 3);
        assert_eq!(output.tokens_out, 50);
        assert!((output.cost_brl - 0.001).abs() < f64::EPSILON);
        adapter.health_check().await.unwrap();
    }

    #[test]
    fn negative_cost_is_clamped() {
        let adapter = LocalAdapter::new(-1.0);
        assert!(adapter.cost_brl.abs() < f64::EPSILON);
    }
}
