//! Process-level settings loaded from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings for wiring an audit service.
///
/// Every field can be overridden through an environment variable of the same
/// name in upper case (`LLM_MODEL`, `QDRANT_URL`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Inference backend name (`ollama` or `openai`)
    pub llm_provider: String,
    /// Model used for extraction and verification
    pub llm_model: String,
    /// Ollama server URL
    pub ollama_base_url: String,
    /// API key for the openai provider
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible servers
    pub openai_base_url: Option<String>,
    /// Request timeout for inference calls in seconds
    pub llm_timeout_secs: u64,
    /// Embedding model served by the same backend
    pub embedding_model: String,
    /// Dimension of vectors produced by `embedding_model`
    pub embedding_dimension: usize,
    /// Qdrant server URL; enables retrieval when set
    pub qdrant_url: Option<String>,
    /// Qdrant collection holding the knowledge base
    pub qdrant_collection: String,
    /// SQLite knowledge base path; used for retrieval when Qdrant is not set
    pub knowledge_db: Option<String>,
    /// Per-audit timeout in seconds (none = unbounded)
    pub audit_timeout_secs: Option<u64>,
    /// Log filter directive
    pub log_level: String,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            llm_provider: "ollama".to_string(),
            llm_model: "llama3.2".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            llm_timeout_secs: 60,
            embedding_model: "all-minilm".to_string(),
            embedding_dimension: 384,
            qdrant_url: None,
            qdrant_collection: "truthtable_knowledge".to_string(),
            knowledge_db: None,
            audit_timeout_secs: None,
            log_level: "info".to_string(),
        }
    }
}

impl AuditSettings {
    /// Create settings from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings from an arbitrary key lookup.
    ///
    /// Blank values count as unset. A numeric value that does not parse is a
    /// configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| -> Result<Option<u64>> {
            non_empty(key)
                .map(|raw| {
                    raw.trim().parse::<u64>().map_err(|_| {
                        Error::Config(format!("{} must be a whole number, got {:?}", key, raw))
                    })
                })
                .transpose()
        };

        Ok(Self {
            llm_provider: non_empty("LLM_PROVIDER").unwrap_or(defaults.llm_provider),
            llm_model: non_empty("LLM_MODEL").unwrap_or(defaults.llm_model),
            ollama_base_url: non_empty("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL"),
            llm_timeout_secs: number("LLM_TIMEOUT_SECS")?.unwrap_or(defaults.llm_timeout_secs),
            embedding_model: non_empty("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimension: number("EMBEDDING_DIMENSION")?
                .map(|n| n as usize)
                .unwrap_or(defaults.embedding_dimension),
            qdrant_url: non_empty("QDRANT_URL"),
            qdrant_collection: non_empty("QDRANT_COLLECTION")
                .unwrap_or(defaults.qdrant_collection),
            knowledge_db: non_empty("KNOWLEDGE_DB"),
            audit_timeout_secs: number("AUDIT_TIMEOUT_SECS")?,
            log_level: non_empty("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Whether a knowledge base is configured, i.e. retrieval can run.
    pub fn retrieval_configured(&self) -> bool {
        self.qdrant_url.is_some() || self.knowledge_db.is_some()
    }

    pub fn audit_timeout(&self) -> Option<Duration> {
        self.audit_timeout_secs.map(Duration::from_secs)
    }
}
