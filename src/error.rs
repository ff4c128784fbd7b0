//! Error types for truthtable-core.

use thiserror::Error;

use crate::audit::AuditStage;

/// Result type alias using truthtable-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while auditing a response.
#[derive(Error, Debug)]
pub enum Error {
    /// LLM API error
    #[error("LLM API error: {provider} - {message}")]
    LlmApi { provider: String, message: String },

    /// LLM error (simple variant)
    #[error("LLM error: {0}")]
    LLM(String),

    /// Embedding backend error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store error
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Local knowledge base storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A pipeline stage failed after its local fallbacks were exhausted
    #[error("Audit stage {stage} failed: {message}")]
    Stage { stage: AuditStage, message: String },

    /// Lookup of an unknown audit
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Wrap an error as a fatal failure of `stage`.
    ///
    /// Errors that already carry a stage keep their original tag.
    pub fn stage(stage: AuditStage, error: Error) -> Self {
        match error {
            Self::Stage { .. } => error,
            other => Self::Stage {
                stage,
                message: other.to_string(),
            },
        }
    }

    /// Stage this error is attributed to, if any.
    pub fn failed_stage(&self) -> Option<AuditStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
