//! Claim verification against evidence.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionRequest, LLMClient};

use super::json::extract_json;
use super::types::{Claim, ClaimVerification, VerificationStatus};

const VERIFIER_SYSTEM_PROMPT: &str = r#"You check whether a claim is backed by a set of context documents.

Steps:
1. Read every document.
2. Decide whether the documents support the claim, contradict it, or do not address it.
3. Quote the passages your decision rests on.

Labels:
- SUPPORTED: the documents back the claim
- UNSUPPORTED: the documents contradict the claim, or nothing in them backs it
- PARTIALLY_SUPPORTED: some parts of the claim are backed and others are not

Respond with one JSON object and nothing else:
{
  "status": "SUPPORTED" | "UNSUPPORTED" | "PARTIALLY_SUPPORTED",
  "confidence": 0.95,
  "evidence": ["quoted passage"],
  "reasoning": "one sentence"
}"#;

/// Confidence assumed when the model omits one.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Verification settings.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Model override (client default if unset)
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Claims judged at once; 1 means strictly one after another
    pub max_concurrency: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: 512,
            max_concurrency: 1,
        }
    }
}

impl VerifierConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }
}

/// Numbered evidence listing shown to the model.
pub fn format_evidence(evidence: &[String]) -> String {
    evidence
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[Document {}]\n{}", i + 1, doc))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Judges claims against evidence, one inference call per claim.
pub struct ClaimVerifier {
    client: Arc<dyn LLMClient>,
    config: VerifierConfig,
}

impl ClaimVerifier {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self::with_config(client, VerifierConfig::default())
    }

    pub fn with_config(client: Arc<dyn LLMClient>, config: VerifierConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Judge one claim. Any failure yields an `Unknown` verification.
    pub async fn verify(&self, claim: &Claim, evidence: &[String]) -> ClaimVerification {
        let completion = match self.client.complete(self.build_request(claim, evidence)).await {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    claim = %claim,
                    error = %e,
                    "Verification call failed; marking claim unknown"
                );
                return ClaimVerification::unknown(claim.clone());
            }
        };

        match parse_verification(claim, &completion.content) {
            Ok(verification) => {
                debug!(
                    claim = %claim,
                    status = %verification.status,
                    confidence = verification.confidence,
                    "Verified claim"
                );
                verification
            }
            Err(e) => {
                warn!(
                    claim = %claim,
                    error = %e,
                    output = %completion.content,
                    "Unreadable verification; marking claim unknown"
                );
                ClaimVerification::unknown(claim.clone())
            }
        }
    }

    /// Judge every claim, returning results in claim order.
    #[instrument(skip_all, fields(claims = claims.len(), evidence = evidence.len()))]
    pub async fn verify_all(
        &self,
        claims: &[Claim],
        evidence: &[String],
    ) -> Vec<ClaimVerification> {
        let verifications: Vec<ClaimVerification> = if self.config.max_concurrency <= 1 {
            let mut out = Vec::with_capacity(claims.len());
            for (i, claim) in claims.iter().enumerate() {
                debug!("Verifying claim {}/{}", i + 1, claims.len());
                out.push(self.verify(claim, evidence).await);
            }
            out
        } else {
            stream::iter(claims)
                .map(|claim| self.verify(claim, evidence))
                .buffered(self.config.max_concurrency)
                .collect()
                .await
        };

        let count = |s: VerificationStatus| verifications.iter().filter(|v| v.status == s).count();
        info!(
            supported = count(VerificationStatus::Supported),
            unsupported = count(VerificationStatus::Unsupported),
            partial = count(VerificationStatus::PartiallySupported),
            unknown = count(VerificationStatus::Unknown),
            "Verification complete"
        );
        verifications
    }

    fn build_request(&self, claim: &Claim, evidence: &[String]) -> CompletionRequest {
        let mut request = CompletionRequest::new()
            .with_system(VERIFIER_SYSTEM_PROMPT)
            .with_message(ChatMessage::user(format!(
                "Check this claim against the context:\n\n<claim>\n{}\n</claim>\n\n<context>\n{}\n</context>\n\nReturn only the JSON object.",
                claim,
                format_evidence(evidence)
            )))
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        if let Some(model) = &self.config.model {
            request = request.with_model(model);
        }
        request
    }
}

/// Read a judgment from model output.
///
/// The status is required and may not be `UNKNOWN`. A missing confidence
/// counts as 0.5; values above 1 are read as percentages.
pub fn parse_verification(claim: &Claim, content: &str) -> Result<ClaimVerification> {
    let parsed: Value = serde_json::from_str(extract_json(content, '{', '}'))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| Error::LLM("verification is not a JSON object".to_string()))?;

    let status: VerificationStatus = object
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::LLM("verification has no status".to_string()))?
        .parse()?;
    if status == VerificationStatus::Unknown {
        return Err(Error::LLM("model returned UNKNOWN status".to_string()));
    }

    let confidence = parse_confidence(object.get("confidence"))?;

    let evidence = match object.get("evidence") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };

    Ok(ClaimVerification::new(claim.clone(), status, confidence).with_evidence(evidence))
}

fn parse_confidence(value: Option<&Value>) -> Result<f64> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(DEFAULT_CONFIDENCE),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        Some(_) => None,
    }
    .filter(|c| c.is_finite())
    .ok_or_else(|| Error::LLM(format!("non-numeric confidence: {:?}", value)))?;

    let scaled = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    Ok(scaled.clamp(0.0, 1.0))
}
