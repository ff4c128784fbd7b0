//! LLM client trait and provider implementations.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AuditSettings;
use crate::error::{Error, Result};

use super::types::{
    ChatMessage, CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse,
    Provider, StopReason, TokenUsage,
};

/// Text generation capability consumed by the audit pipeline.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Complete a prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Create embeddings for texts.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Whether the backend is reachable and ready to serve the configured model.
    async fn health_check(&self) -> bool;

    /// Get the provider for this client.
    fn provider(&self) -> Provider;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;
}

/// Configuration for LLM clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key (unused by Ollama)
    pub api_key: Option<String>,
    /// Base URL override
    pub base_url: Option<String>,
    /// Default model
    pub default_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            base_url: None,
            default_model: default_model.into(),
            timeout_secs: 60,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Build the text generation client selected by `settings.llm_provider`.
pub fn build_client(settings: &AuditSettings) -> Result<Arc<dyn LLMClient>> {
    let provider: Provider = settings.llm_provider.parse()?;
    let config = ClientConfig::new(&settings.llm_model).with_timeout(settings.llm_timeout_secs);

    let client: Arc<dyn LLMClient> = match provider {
        Provider::Ollama => Arc::new(OllamaClient::new(
            config.with_base_url(&settings.ollama_base_url),
        )?),
        Provider::OpenAI => {
            let api_key = settings.openai_api_key.clone().ok_or_else(|| {
                Error::Config("OPENAI_API_KEY is required for the openai provider".to_string())
            })?;
            let mut config = config.with_api_key(api_key);
            if let Some(url) = &settings.openai_base_url {
                config = config.with_base_url(url);
            }
            Arc::new(OpenAIClient::new(config)?)
        }
    };

    info!(provider = %provider, model = %settings.llm_model, "LLM client initialized");
    Ok(client)
}

/// Ollama local runtime client.
pub struct OllamaClient {
    config: ClientConfig,
    http: Client,
}

impl OllamaClient {
    const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(config.timeout_secs)?;
        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    fn model_matches(&self, name: &str) -> bool {
        let model = self.config.default_model.as_str();
        name == model
            || name
                .strip_prefix(model)
                .is_some_and(|rest| rest.starts_with(':'))
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url(), path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                Error::llm_api(
                    "ollama",
                    format!("Cannot connect to Ollama at {}: {}", self.base_url(), e),
                )
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::LLM(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            error!(%status, "Ollama returned an error");
            return Err(Error::llm_api(
                "ollama",
                format!("request failed ({}): {}", status, body),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::LLM(format!("Failed to parse Ollama response: {}", e)))
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    model: String,
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    model: String,
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelTag {
    name: String,
}

/// Message shape shared by the Ollama and OpenAI chat endpoints.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        let api_request = OllamaChatRequest {
            model: model.clone(),
            messages: request.flattened_messages().iter().map(Into::into).collect(),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        debug!(model = %model, "Sending chat request to Ollama");
        let api_response: OllamaChatResponse = self.post_json("/api/chat", &api_request).await?;

        let usage = TokenUsage {
            input_tokens: api_response.prompt_eval_count,
            output_tokens: api_response.eval_count,
        };
        debug!(model = %api_response.model, tokens = usage.total(), "Ollama chat complete");

        Ok(CompletionResponse {
            id: format!("ollama-{}", Utc::now().timestamp_millis()),
            model: api_response.model,
            content: api_response.message.map(|m| m.content).unwrap_or_default(),
            stop_reason: Some(
                api_response
                    .done_reason
                    .as_deref()
                    .map(StopReason::from_backend)
                    .unwrap_or(StopReason::Stop),
            ),
            usage,
            timestamp: Utc::now(),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let api_request = OllamaEmbedRequest {
            model: request
                .model
                .unwrap_or_else(|| self.config.default_model.clone()),
            input: request.texts,
        };

        let api_response: OllamaEmbedResponse = self.post_json("/api/embed", &api_request).await?;

        Ok(EmbeddingResponse {
            model: api_response.model,
            embeddings: api_response.embeddings,
            usage: TokenUsage {
                input_tokens: api_response.prompt_eval_count,
                output_tokens: 0,
            },
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url());
        let response = match self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                error!(status = %r.status(), "Ollama health check failed");
                return false;
            }
            Err(e) => {
                error!("Ollama health check failed: {}", e);
                return false;
            }
        };

        let tags: OllamaTags = match response.json().await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Ollama health check returned unreadable tags: {}", e);
                return false;
            }
        };

        if tags.models.iter().any(|m| self.model_matches(&m.name)) {
            info!(model = %self.config.default_model, "Ollama health check passed");
            true
        } else {
            let available: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                model = %self.config.default_model,
                available = %available.join(", "),
                "Model not found in Ollama"
            );
            false
        }
    }

    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }
}

/// OpenAI client (also works against OpenAI-compatible servers).
pub struct OpenAIClient {
    config: ClientConfig,
    http: Client,
}

impl OpenAIClient {
    const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(config.timeout_secs)?;
        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url(), path);
        let response = self
            .authorized(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::llm_api("openai", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::LLM(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OpenAIError>(&body) {
                return Err(Error::llm_api("openai", error.error.message));
            }
            return Err(Error::llm_api(
                "openai",
                format!("request failed ({}): {}", status, body),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::LLM(format!("Failed to parse OpenAI response: {}", e)))
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    id: String,
    model: String,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    model: String,
    data: Vec<OpenAIEmbeddingData>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        let api_request = OpenAIRequest {
            model,
            messages: request.flattened_messages().iter().map(Into::into).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let api_response: OpenAIResponse =
            self.post_json("/v1/chat/completions", &api_request).await?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::LLM("No choices in response".to_string()))?;

        let usage = api_response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        debug!(model = %api_response.model, tokens = usage.total(), "Chat completion finished");

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content: choice.message.content,
            stop_reason: choice.finish_reason.as_deref().map(StopReason::from_backend),
            usage,
            timestamp: Utc::now(),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let api_request = OpenAIEmbeddingRequest {
            model: request
                .model
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            input: request.texts,
        };

        let api_response: OpenAIEmbeddingResponse =
            self.post_json("/v1/embeddings", &api_request).await?;

        let mut data = api_response.data;
        data.sort_by_key(|d| d.index);

        Ok(EmbeddingResponse {
            model: api_response.model,
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
            usage: TokenUsage {
                input_tokens: api_response.usage.map(|u| u.prompt_tokens).unwrap_or(0),
                output_tokens: 0,
            },
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url());
        match self
            .authorized(self.http.get(&url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                error!(status = %r.status(), "OpenAI health check failed");
                false
            }
            Err(e) => {
                error!("OpenAI health check failed: {}", e);
                false
            }
        }
    }

    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("llama3.2")
            .with_base_url("http://ollama:11434/")
            .with_api_key("secret")
            .with_timeout(30);

        assert_eq!(config.default_model, "llama3.2");
        assert_eq!(config.base_url.as_deref(), Some("http://ollama:11434/"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_ollama_base_url_trims_slash() {
        let client =
            OllamaClient::new(ClientConfig::new("llama3.2").with_base_url("http://host:1/"))
                .unwrap();
        assert_eq!(client.base_url(), "http://host:1");
        assert_eq!(client.provider(), Provider::Ollama);
    }

    #[test]
    fn test_ollama_model_tag_matching() {
        let client = OllamaClient::new(ClientConfig::new("llama3.2")).unwrap();

        assert!(client.model_matches("llama3.2"));
        assert!(client.model_matches("llama3.2:latest"));
        assert!(client.model_matches("llama3.2:3b"));
        assert!(!client.model_matches("llama3.21"));
        assert!(!client.model_matches("mistral:latest"));
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "[\"a claim\"]"},
            "done_reason": "stop",
            "prompt_eval_count": 12,
            "eval_count": 4
        }"#;
        let parsed: OllamaChatResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.message.unwrap().content, "[\"a claim\"]");
        assert_eq!(parsed.done_reason.as_deref(), Some("stop"));
        assert_eq!(parsed.prompt_eval_count + parsed.eval_count, 16);
    }

    #[test]
    fn test_build_client_requires_openai_key() {
        let settings = AuditSettings {
            llm_provider: "openai".to_string(),
            ..AuditSettings::default()
        };
        assert!(matches!(build_client(&settings), Err(Error::Config(_))));

        let unknown = AuditSettings {
            llm_provider: "cohere".to_string(),
            ..AuditSettings::default()
        };
        assert!(build_client(&unknown).is_err());
    }

    #[test]
    fn test_build_client_default_is_ollama() {
        let client = build_client(&AuditSettings::default()).unwrap();
        assert_eq!(client.provider(), Provider::Ollama);
        assert_eq!(client.default_model(), "llama3.2");
    }
}
