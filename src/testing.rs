//! Scripted collaborator doubles shared by unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::{
    CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse, LLMClient,
    Provider, StopReason, TokenUsage,
};
use crate::retrieval::Embedder;

/// One scripted completion outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Content(String),
    Fail(String),
}

/// Reply chosen by prompt content rather than call order.
struct KeyedReply {
    needle: String,
    content: String,
    delay: Duration,
}

/// LLM client that replays queued completions in order.
///
/// Embeddings are deterministic per text (see [`ScriptedClient::vector_for`]).
/// Once the queue is exhausted every completion fails. Replies registered with
/// [`ScriptedClient::with_reply_for`] take precedence over the queue.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Scripted>>,
    keyed: Vec<KeyedReply>,
    requests: Mutex<Vec<CompletionRequest>>,
    embed_calls: AtomicUsize,
    embedding_dimension: usize,
    fail_embeddings: bool,
    healthy: bool,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new<S: Into<String>>(replies: Vec<S>) -> Self {
        Self::with_script(replies.into_iter().map(|r| Scripted::Content(r.into())).collect())
    }

    pub fn with_script(script: Vec<Scripted>) -> Self {
        Self {
            replies: Mutex::new(script.into()),
            keyed: Vec::new(),
            requests: Mutex::new(Vec::new()),
            embed_calls: AtomicUsize::new(0),
            embedding_dimension: 4,
            fail_embeddings: false,
            healthy: true,
            delay: None,
        }
    }

    pub fn with_embedding_dimension(mut self, dimension: usize) -> Self {
        self.embedding_dimension = dimension;
        self
    }

    pub fn with_failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Sleep before answering each completion.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer any request whose user message contains `needle` with
    /// `content`, after sleeping for `delay`.
    pub fn with_reply_for(
        mut self,
        needle: impl Into<String>,
        content: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.keyed.push(KeyedReply {
            needle: needle.into(),
            content: content.into(),
            delay,
        });
        self
    }

    fn keyed_reply(&self, request: &CompletionRequest) -> Option<&KeyedReply> {
        self.keyed.iter().find(|k| {
            request
                .messages
                .iter()
                .any(|m| m.content.contains(&k.needle))
        })
    }

    /// Deterministic unit-free vector for `text`.
    pub fn vector_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dimension];
        for (i, b) in text.bytes().enumerate() {
            v[i % dimension] += b as f32;
        }
        v
    }

    pub fn complete_calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LLMClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let keyed = self
            .keyed_reply(&request)
            .map(|k| (k.content.clone(), k.delay));
        let delay = keyed.as_ref().map(|(_, d)| *d).or(self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().unwrap().push(request);
        let next = match keyed {
            Some((content, _)) => Some(Scripted::Content(content)),
            None => self.replies.lock().unwrap().pop_front(),
        };

        match next {
            Some(Scripted::Content(content)) => Ok(CompletionResponse {
                id: "scripted".to_string(),
                model: "scripted-model".to_string(),
                content,
                stop_reason: Some(StopReason::Stop),
                usage: TokenUsage::default(),
                timestamp: Utc::now(),
            }),
            Some(Scripted::Fail(message)) => Err(Error::llm_api("scripted", message)),
            None => Err(Error::llm_api("scripted", "script exhausted")),
        }
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings {
            return Err(Error::Embedding("embedding backend down".to_string()));
        }
        Ok(EmbeddingResponse {
            model: request.model.unwrap_or_else(|| "scripted-embed".to_string()),
            embeddings: request
                .texts
                .iter()
                .map(|t| Self::vector_for(t, self.embedding_dimension))
                .collect(),
            usage: TokenUsage::default(),
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

/// Embedder that maps each known text to a fixed vector.
///
/// Unknown texts embed to the zero vector, which never matches anything.
pub struct FixedEmbedder {
    vectors: Vec<(String, Vec<f32>)>,
    dimension: usize,
    calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Vec::new(),
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.push((text.into(), vector));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .iter()
                    .find(|(known, _)| known == t)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0; self.dimension])
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
