//! Embedding capability.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::llm::{EmbeddingRequest, LLMClient};

/// Maps text to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts`, returning one vector per input in the same order.
    ///
    /// An empty input yields an empty output.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;
}

/// Embedder backed by an [`LLMClient`]'s embedding endpoint.
pub struct ClientEmbedder {
    client: Arc<dyn LLMClient>,
    model: String,
    dimension: usize,
}

impl ClientEmbedder {
    pub fn new(client: Arc<dyn LLMClient>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimension,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for ClientEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest::new(texts.to_vec()).with_model(&self.model);
        let response = self.client.embed(request).await?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors from {}, got {}",
                texts.len(),
                self.model,
                response.embeddings.len()
            )));
        }

        if let Some(bad) = response
            .embeddings
            .iter()
            .find(|v| v.len() != self.dimension)
        {
            return Err(Error::Embedding(format!(
                "model {} returned a {}-dimensional vector, expected {}",
                self.model,
                bad.len(),
                self.dimension
            )));
        }

        debug!(count = texts.len(), model = %self.model, "Embedded texts");
        Ok(response.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
