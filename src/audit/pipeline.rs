//! The audit state machine.
//!
//! Each run walks `Decompose -> [Retrieve] -> Verify -> Score -> Done`,
//! visiting every present stage once. `Retrieve` exists only when the
//! pipeline was built with a retriever. The first stage error ends the run
//! with a failed report; nothing partial is returned.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::llm::LLMClient;
use crate::retrieval::{merge_unique, EvidenceRetriever};

use super::aggregator::{aggregate, AggregateOutcome, ScoringConfig};
use super::extractor::{ClaimExtractor, ExtractorConfig};
use super::types::{
    AuditFailure, AuditReport, AuditRequest, AuditResult, AuditStage, Claim, ClaimVerification,
    Degradation, VerificationStatus,
};
use super::verifier::{ClaimVerifier, VerifierConfig};

/// Values carried between stages of one run.
#[derive(Default)]
struct RunState {
    claims: Vec<Claim>,
    retrieved: Vec<String>,
    evidence_count: usize,
    verifications: Vec<ClaimVerification>,
    outcome: Option<AggregateOutcome>,
    degradations: Vec<Degradation>,
}

/// Wires extraction, retrieval, verification and scoring together.
pub struct AuditPipeline {
    client: Arc<dyn LLMClient>,
    extractor: ClaimExtractor,
    retriever: Option<EvidenceRetriever>,
    verifier: ClaimVerifier,
    scoring: ScoringConfig,
}

impl AuditPipeline {
    /// Build a pipeline. Passing no retriever skips the `Retrieve` stage and
    /// judges claims against caller-supplied context only.
    pub fn new(client: Arc<dyn LLMClient>, retriever: Option<EvidenceRetriever>) -> Self {
        if retriever.is_none() {
            warn!(
                "No knowledge base configured; retrieval is disabled and only caller context will be used"
            );
        }
        Self {
            extractor: ClaimExtractor::new(client.clone()),
            verifier: ClaimVerifier::new(client.clone()),
            client,
            retriever,
            scoring: ScoringConfig::default(),
        }
    }

    pub fn with_extractor_config(mut self, config: ExtractorConfig) -> Self {
        self.extractor = ClaimExtractor::with_config(self.client.clone(), config);
        self
    }

    pub fn with_verifier_config(mut self, config: VerifierConfig) -> Self {
        self.verifier = ClaimVerifier::with_config(self.client.clone(), config);
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn retrieval_enabled(&self) -> bool {
        self.retriever.is_some()
    }

    pub fn client(&self) -> &Arc<dyn LLMClient> {
        &self.client
    }

    pub fn retriever(&self) -> Option<&EvidenceRetriever> {
        self.retriever.as_ref()
    }

    /// Audit one response.
    pub async fn run_audit(&self, request: &AuditRequest) -> AuditReport {
        self.run_audit_observed(request, &|_| {}).await
    }

    /// Audit one response, calling `observer` as each stage starts.
    #[instrument(skip_all, fields(request_id = %request.request_id))]
    pub async fn run_audit_observed(
        &self,
        request: &AuditRequest,
        observer: &(dyn Fn(AuditStage) + Send + Sync),
    ) -> AuditReport {
        let mut state = RunState::default();
        if !self.retrieval_enabled() {
            warn!("Retrieval disabled for this audit");
            state.degradations.push(Degradation::RetrievalDisabled);
        }

        let mut stage = AuditStage::Decompose;
        while stage != AuditStage::Done {
            debug!(stage = %stage, "Entering stage");
            observer(stage);

            if let Err(e) = self.step(stage, request, &mut state).await {
                error!(stage = %stage, error = %e, "Audit failed");
                return AuditReport::Failed(AuditFailure::from_error(&request.request_id, stage, e));
            }
            stage = stage.next(self.retrieval_enabled());
        }
        observer(AuditStage::Done);

        match state.outcome {
            Some(outcome) => {
                let result = AuditResult {
                    request_id: request.request_id.clone(),
                    claims: state.claims,
                    claim_verifications: state.verifications,
                    faithfulness_score: outcome.score,
                    hallucination_detected: outcome.hallucination,
                    reasoning_trace: outcome.trace,
                    degradations: state.degradations,
                    evidence_count: state.evidence_count,
                };
                info!(
                    claims = result.claims.len(),
                    unsupported = result.count(VerificationStatus::Unsupported),
                    score = result.faithfulness_score,
                    hallucination = result.hallucination_detected,
                    degraded = result.is_degraded(),
                    "Audit complete"
                );
                AuditReport::Completed(result)
            }
            None => AuditReport::Failed(AuditFailure::from_error(
                &request.request_id,
                AuditStage::Score,
                Error::Internal("run finished without a score".to_string()),
            )),
        }
    }

    async fn step(
        &self,
        stage: AuditStage,
        request: &AuditRequest,
        state: &mut RunState,
    ) -> Result<()> {
        match stage {
            AuditStage::Decompose => {
                let extraction = self.extractor.extract(&request.llm_response).await?;
                if extraction.fallback {
                    state.degradations.push(Degradation::ExtractionFallback);
                }
                state.claims = extraction.claims;
            }
            AuditStage::Retrieve => {
                let retriever = self.retriever.as_ref().ok_or_else(|| {
                    Error::Internal("retrieve stage without a retriever".to_string())
                })?;
                state.retrieved = retriever.retrieve(&request.user_query, &state.claims).await?;
            }
            AuditStage::Verify => {
                let evidence = merge_unique(
                    request
                        .context_docs
                        .iter()
                        .cloned()
                        .chain(std::mem::take(&mut state.retrieved)),
                );
                state.evidence_count = evidence.len();

                state.verifications = self.verifier.verify_all(&state.claims, &evidence).await;
                state.degradations.extend(
                    state
                        .verifications
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.status == VerificationStatus::Unknown)
                        .map(|(claim_index, _)| Degradation::VerificationFallback { claim_index }),
                );
            }
            AuditStage::Score => {
                if state.verifications.len() != state.claims.len() {
                    return Err(Error::Internal(format!(
                        "{} verifications for {} claims",
                        state.verifications.len(),
                        state.claims.len()
                    )));
                }
                state.outcome = Some(aggregate(&state.verifications, &self.scoring));
            }
            AuditStage::Done => {}
        }
        Ok(())
    }
}

impl AuditFailure {
    /// Failure of `stage`, unless `error` already names the stage it came from.
    pub fn from_error(request_id: &str, stage: AuditStage, error: Error) -> Self {
        let (stage, error) = match error {
            Error::Stage { stage, message } => (stage, message),
            other => (stage, other.to_string()),
        };
        Self {
            request_id: request_id.to_string(),
            stage,
            error,
        }
    }
}

impl AuditReport {
    /// The result, or the failure as an [`Error::Stage`].
    pub fn into_result(self) -> Result<AuditResult> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::Failed(failure) => Err(Error::Stage {
                stage: failure.stage,
                message: failure.error,
            }),
        }
    }
}
