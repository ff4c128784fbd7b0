//! # truthtable-core
//!
//! Claim-level faithfulness auditing for LLM responses.
//!
//! ## Core Components
//!
//! - **Audit**: Claim extraction, verification, scoring and the pipeline tying them together
//! - **Retrieval**: Embedding, vector search and knowledge base seeding
//! - **LLM**: Inference backend clients (Ollama, OpenAI-compatible)
//! - **Config**: Environment-driven settings
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use truthtable_core::{build_client, AuditPipeline, AuditRequest, AuditSettings};
//!
//! let settings = AuditSettings::from_env()?;
//! let client = build_client(&settings)?;
//! let pipeline = AuditPipeline::new(client, None);
//!
//! let report = pipeline
//!     .run_audit(&AuditRequest::new(
//!         "req-1",
//!         "What is the capital of France?",
//!         "Paris is the capital of France.",
//!     ))
//!     .await;
//! println!("{}", report.reasoning_trace());
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod llm;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod testing;

/// Crate version reported by health checks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-exports for convenience
pub use audit::{
    AuditFailure, AuditId, AuditPipeline, AuditRecord, AuditReport, AuditRequest, AuditResult,
    AuditService, AuditStage, AuditStatus, AuditStore, Claim, ClaimExtractor, ClaimVerification,
    ClaimVerifier, Degradation, HealthReport, ScoringConfig, TrustGrade, VerificationStatus,
};
pub use config::AuditSettings;
pub use error::{Error, Result};
pub use llm::{build_client, ClientConfig, LLMClient, OllamaClient, OpenAIClient, Provider};
pub use retrieval::{
    ClientEmbedder, Embedder, EvidenceRetriever, MemoryVectorStore, QdrantStore, SearchHit,
    SqliteVectorStore, VectorStore,
};
