//! Core types for response auditing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Stage of the audit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    /// Split the response into claims
    Decompose,
    /// Look up evidence in the knowledge base
    Retrieve,
    /// Judge each claim against the evidence
    Verify,
    /// Reduce judgments to a score
    Score,
    /// Terminal
    Done,
}

impl AuditStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decompose => "decompose",
            Self::Retrieve => "retrieve",
            Self::Verify => "verify",
            Self::Score => "score",
            Self::Done => "done",
        }
    }

    /// Stage that follows this one. `Retrieve` is only visited when enabled.
    pub fn next(self, retrieval_enabled: bool) -> Self {
        match self {
            Self::Decompose if retrieval_enabled => Self::Retrieve,
            Self::Decompose | Self::Retrieve => Self::Verify,
            Self::Verify => Self::Score,
            Self::Score | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for AuditStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to audit one generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRequest {
    /// Caller-supplied identifier
    pub request_id: String,
    /// Question the answer responds to
    pub user_query: String,
    /// The generated answer under audit
    pub llm_response: String,
    /// Evidence supplied by the caller
    #[serde(default)]
    pub context_docs: Vec<String>,
}

impl AuditRequest {
    pub fn new(
        request_id: impl Into<String>,
        user_query: impl Into<String>,
        llm_response: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_query: user_query.into(),
            llm_response: llm_response.into(),
            context_docs: Vec::new(),
        }
    }

    pub fn with_context(mut self, doc: impl Into<String>) -> Self {
        self.context_docs.push(doc.into());
        self
    }

    pub fn with_context_docs(mut self, docs: impl IntoIterator<Item = String>) -> Self {
        self.context_docs.extend(docs);
        self
    }
}

/// One atomic factual statement extracted from a response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claim(String);

impl Claim {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Claim {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Claim {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Claim {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Outcome of judging a claim against evidence.
///
/// Serialized as `supported`, `unsupported`, `partially_supported` or
/// `unknown`. `Unknown` only ever marks a failed judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VerificationStatus {
    Supported,
    Unsupported,
    PartiallySupported,
    Unknown,
}

impl VerificationStatus {
    pub const ALL: [VerificationStatus; 4] = [
        Self::Supported,
        Self::PartiallySupported,
        Self::Unsupported,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supported => "supported",
            Self::Unsupported => "unsupported",
            Self::PartiallySupported => "partially_supported",
            Self::Unknown => "unknown",
        }
    }

    /// Label used in reasoning traces.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Supported => "Supported",
            Self::Unsupported => "Unsupported",
            Self::PartiallySupported => "Partially Supported",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this status counts against the response.
    pub fn is_problematic(&self) -> bool {
        matches!(self, Self::Unsupported | Self::PartiallySupported)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "supported" => Ok(Self::Supported),
            "unsupported" => Ok(Self::Unsupported),
            "partially_supported" => Ok(Self::PartiallySupported),
            "unknown" => Ok(Self::Unknown),
            _ => Err(Error::Internal(format!("Unknown verification status: {}", s))),
        }
    }
}

impl TryFrom<String> for VerificationStatus {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VerificationStatus> for String {
    fn from(status: VerificationStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Judgment of one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimVerification {
    pub claim: Claim,
    pub status: VerificationStatus,
    /// Confidence in `status`, in [0, 1]
    pub confidence: f64,
    /// Quotes or paraphrases backing the judgment
    pub evidence: Vec<String>,
}

impl ClaimVerification {
    pub fn new(claim: Claim, status: VerificationStatus, confidence: f64) -> Self {
        Self {
            claim,
            status,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
        }
    }

    /// Result recorded when a claim could not be judged.
    pub fn unknown(claim: Claim) -> Self {
        Self::new(claim, VerificationStatus::Unknown, 0.0)
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// A reduced-quality path the pipeline took without failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// No knowledge base configured; only caller context was used
    RetrievalDisabled,
    /// Claim extraction output was unusable; the whole response became one claim
    ExtractionFallback,
    /// The claim at `claim_index` could not be judged
    VerificationFallback { claim_index: usize },
}

/// Outcome of a completed audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub request_id: String,
    pub claims: Vec<Claim>,
    /// One entry per claim, same order
    pub claim_verifications: Vec<ClaimVerification>,
    pub faithfulness_score: f64,
    pub hallucination_detected: bool,
    pub reasoning_trace: String,
    #[serde(default)]
    pub degradations: Vec<Degradation>,
    /// Evidence documents the claims were judged against
    #[serde(default)]
    pub evidence_count: usize,
}

impl AuditResult {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn count(&self, status: VerificationStatus) -> usize {
        self.claim_verifications
            .iter()
            .filter(|v| v.status == status)
            .count()
    }
}

/// A run that aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFailure {
    pub request_id: String,
    /// Stage that failed
    pub stage: AuditStage,
    /// Error message
    pub error: String,
}

/// What a pipeline run produced: a full result or a failure, never a mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditReport {
    Completed(AuditResult),
    Failed(AuditFailure),
}

impl AuditReport {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Completed(r) => &r.request_id,
            Self::Failed(f) => &f.request_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn result(&self) -> Option<&AuditResult> {
        match self {
            Self::Completed(r) => Some(r),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AuditFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(f) => Some(f),
        }
    }

    /// Explanation of the outcome; for a failure, the error.
    pub fn reasoning_trace(&self) -> String {
        match self {
            Self::Completed(r) => r.reasoning_trace.clone(),
            Self::Failed(f) => format!("Error: {}", f.error),
        }
    }
}
