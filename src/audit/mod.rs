//! Claim-level faithfulness auditing.
//!
//! An audit splits a generated answer into atomic claims, optionally pulls
//! supporting snippets from a knowledge base, judges every claim against the
//! evidence, and folds the judgments into a faithfulness score and a
//! hallucination flag.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use truthtable_core::audit::{AuditPipeline, AuditRequest};
//!
//! let pipeline = AuditPipeline::new(client, None);
//! let report = pipeline
//!     .run_audit(
//!         &AuditRequest::new("req-1", "What is the capital of France?", "Paris.")
//!             .with_context("Paris is the capital of France."),
//!     )
//!     .await;
//!
//! if let Some(result) = report.result() {
//!     println!("{:.2} {}", result.faithfulness_score, result.hallucination_detected);
//! }
//! ```

mod aggregator;
mod extractor;
mod json;
mod pipeline;
mod proptest;
mod service;
mod store;
mod types;
mod verifier;

pub use aggregator::{
    aggregate, detect_hallucination, faithfulness_score, reasoning_trace, AggregateOutcome,
    HallucinationTrigger, ScoringConfig,
};
pub use extractor::{ClaimExtractor, Extraction, ExtractorConfig};
pub use pipeline::AuditPipeline;
pub use service::{AuditService, AuditStatus, AuditSubmission, HealthReport, TrustGrade};
pub use store::{AuditId, AuditRecord, AuditStore};
pub use types::{
    AuditFailure, AuditReport, AuditRequest, AuditResult, AuditStage, Claim, ClaimVerification,
    Degradation, VerificationStatus,
};
pub use verifier::{format_evidence, parse_verification, ClaimVerifier, VerifierConfig};
