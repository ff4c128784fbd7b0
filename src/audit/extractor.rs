//! Claim extraction.
//!
//! Asks the model for a JSON array of atomic, self-contained statements and
//! falls back to the whole response as a single claim when the output cannot
//! be read.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::llm::{ChatMessage, CompletionRequest, LLMClient};

use super::json::extract_json;
use super::types::Claim;

const EXTRACTOR_SYSTEM_PROMPT: &str = r#"You extract factual claims from text.

Rules:
1. Each claim states exactly one fact.
2. Each claim must make sense on its own, without the surrounding text.
3. Include implicit claims as well as explicit ones.
4. Never add information that is not in the text.
5. Do not judge whether a claim is true.

Respond with a JSON array of strings and nothing else, for example:
["claim one", "claim two"]"#;

/// Extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Model override (client default if unset)
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Claims this short or shorter (trimmed, in characters) are dropped
    pub min_claim_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: 1024,
            min_claim_chars: 5,
        }
    }
}

impl ExtractorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Claims pulled from a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub claims: Vec<Claim>,
    /// The model output was unusable and the response became one claim
    pub fallback: bool,
}

/// Splits a response into atomic claims.
pub struct ClaimExtractor {
    client: Arc<dyn LLMClient>,
    config: ExtractorConfig,
}

impl ClaimExtractor {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self::with_config(client, ExtractorConfig::default())
    }

    pub fn with_config(client: Arc<dyn LLMClient>, config: ExtractorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract claims from `response`.
    ///
    /// Unreadable model output degrades to a single claim holding the whole
    /// response. Only a failed inference call is an error.
    #[instrument(skip_all, fields(response_len = response.len()))]
    pub async fn extract(&self, response: &str) -> Result<Extraction> {
        let request = self.build_request(response);
        let completion = self.client.complete(request).await?;

        match self.parse_claims(&completion.content) {
            Some(claims) => {
                info!(count = claims.len(), "Extracted claims");
                for (i, claim) in claims.iter().enumerate() {
                    debug!(index = i, claim = %claim, "Claim");
                }
                Ok(Extraction {
                    claims,
                    fallback: false,
                })
            }
            None => {
                warn!(
                    output = %completion.content,
                    "Claim extraction output is not a JSON array; using the whole response as one claim"
                );
                Ok(Extraction {
                    claims: vec![Claim::new(response)],
                    fallback: true,
                })
            }
        }
    }

    fn build_request(&self, response: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new()
            .with_system(EXTRACTOR_SYSTEM_PROMPT)
            .with_message(ChatMessage::user(format!(
                "Extract every factual claim from this text:\n\n<text>\n{}\n</text>\n\nReturn only the JSON array.",
                response
            )))
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        if let Some(model) = &self.config.model {
            request = request.with_model(model);
        }
        request
    }

    /// Claims in `content`, or `None` if it does not hold a JSON array.
    ///
    /// Non-string entries and entries of `min_claim_chars` or fewer are dropped.
    pub fn parse_claims(&self, content: &str) -> Option<Vec<Claim>> {
        let parsed: Value = serde_json::from_str(extract_json(content, '[', ']')).ok()?;
        let items = parsed.as_array()?;

        Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|c| c.chars().count() > self.config.min_claim_chars)
                .map(Claim::new)
                .collect(),
        )
    }
}
