//! LLM client abstraction.
//!
//! The audit pipeline only needs two things from an inference backend:
//! deterministic text completion and a health probe. Embeddings ride on the
//! same client so one configured backend can serve both.
//!
//! ## Example
//!
//! ```rust,ignore
//! use truthtable_core::llm::{
//!     ChatMessage, ClientConfig, CompletionRequest, LLMClient, OllamaClient,
//! };
//!
//! let client = OllamaClient::new(
//!     ClientConfig::new("llama3.2").with_base_url("http://localhost:11434"),
//! )?;
//!
//! let request = CompletionRequest::new()
//!     .with_system("You are a fact checker")
//!     .with_message(ChatMessage::user("Is the sky blue?"))
//!     .with_temperature(0.0);
//!
//! let response = client.complete(request).await?;
//! ```

mod client;
mod types;

pub use client::{build_client, ClientConfig, LLMClient, OllamaClient, OpenAIClient};
pub(crate) use client::build_http_client;
pub use types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, EmbeddingRequest,
    EmbeddingResponse, Provider, StopReason, TokenUsage,
};
