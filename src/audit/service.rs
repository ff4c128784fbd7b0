//! Transport-agnostic audit service.
//!
//! Runs audits, records each outcome under a fresh [`AuditId`], and serves
//! lookups and health probes. A network layer only has to map these calls
//! onto its own request and response types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};

use super::pipeline::AuditPipeline;
use super::store::{AuditId, AuditRecord, AuditStore};
use super::types::{AuditFailure, AuditReport, AuditRequest, AuditStage};

/// Outcome status of a submitted audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgement of a submitted audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSubmission {
    pub audit_id: AuditId,
    pub status: AuditStatus,
}

/// Letter grade for a faithfulness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustGrade {
    A,
    B,
    C,
    D,
}

impl TrustGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::A
        } else if score >= 0.7 {
            Self::B
        } else if score >= 0.5 {
            Self::C
        } else {
            Self::D
        }
    }
}

impl AuditRecord {
    pub fn status(&self) -> AuditStatus {
        if self.report.is_completed() {
            AuditStatus::Completed
        } else {
            AuditStatus::Failed
        }
    }

    /// Grade of a completed audit.
    pub fn grade(&self) -> Option<TrustGrade> {
        self.report
            .result()
            .map(|r| TrustGrade::from_score(r.faithfulness_score))
    }
}

/// Service and dependency health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub version: String,
    /// Reachability per dependency
    pub dependencies: BTreeMap<String, bool>,
}

/// Runs audits and keeps their outcomes.
pub struct AuditService {
    pipeline: Arc<AuditPipeline>,
    store: Arc<AuditStore>,
    timeout: Option<Duration>,
}

impl AuditService {
    pub fn new(pipeline: Arc<AuditPipeline>, store: Arc<AuditStore>) -> Self {
        Self {
            pipeline,
            store,
            timeout: None,
        }
    }

    /// Abandon audits that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &Arc<AuditStore> {
        &self.store
    }

    /// Run an audit to completion and record the outcome.
    #[instrument(skip_all, fields(request_id = %request.request_id))]
    pub async fn submit(&self, request: AuditRequest) -> Result<AuditSubmission> {
        let audit_id = AuditId::new();
        let started = Instant::now();
        info!(%audit_id, "Received audit request");

        let report = match self.timeout {
            None => self.pipeline.run_audit(&request).await,
            Some(limit) => {
                let current = Mutex::new(AuditStage::Decompose);
                let observer = |stage: AuditStage| {
                    if let Ok(mut c) = current.lock() {
                        *c = stage;
                    }
                };
                match tokio::time::timeout(
                    limit,
                    self.pipeline.run_audit_observed(&request, &observer),
                )
                .await
                {
                    Ok(report) => report,
                    Err(_) => {
                        let stage = current.lock().map(|c| *c).unwrap_or(AuditStage::Decompose);
                        warn!(
                            %audit_id,
                            stage = %stage,
                            "Audit timed out; discarding in-flight work"
                        );
                        AuditReport::Failed(AuditFailure::from_error(
                            &request.request_id,
                            stage,
                            Error::stage(stage, Error::timeout(limit.as_millis() as u64)),
                        ))
                    }
                }
            }
        };

        let processing_time_ms = started.elapsed().as_millis() as u64;
        let record = AuditRecord::new(audit_id, report, processing_time_ms);
        let status = record.status();

        match record.report.result() {
            Some(result) => info!(
                %audit_id,
                score = result.faithfulness_score,
                processing_time_ms,
                "Audit completed"
            ),
            None => warn!(%audit_id, processing_time_ms, "Audit failed"),
        }

        self.store.insert(record).await?;
        Ok(AuditSubmission { audit_id, status })
    }

    /// Stored outcome for `audit_id`.
    pub async fn result(&self, audit_id: &AuditId) -> Result<AuditRecord> {
        debug!(%audit_id, "Audit result requested");
        self.store
            .get(audit_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("Audit {} not found", audit_id)))
    }

    /// Probe the inference backend and, when configured, the knowledge base.
    pub async fn health(&self) -> HealthReport {
        let mut dependencies = BTreeMap::new();
        dependencies.insert(
            self.pipeline.client().provider().to_string(),
            self.pipeline.client().health_check().await,
        );
        if let Some(retriever) = self.pipeline.retriever() {
            dependencies.insert(
                "vector_store".to_string(),
                retriever.store().health_check().await,
            );
        }

        HealthReport {
            healthy: dependencies.values().all(|ok| *ok),
            version: crate::VERSION.to_string(),
            dependencies,
        }
    }
}
