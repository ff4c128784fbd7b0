//! In-process store for finished audits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::types::{AuditReport, AuditStage};

/// Server-generated audit identifier, independent of the caller's request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(Uuid);

impl AuditId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AuditId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AuditId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::NotFound(format!("invalid audit id {}: {}", s, e)))
    }
}

/// A stored audit outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: AuditId,
    pub report: AuditReport,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(audit_id: AuditId, report: AuditReport, processing_time_ms: u64) -> Self {
        Self {
            audit_id,
            report,
            processing_time_ms,
            created_at: Utc::now(),
        }
    }

    pub fn failed_stage(&self) -> Option<AuditStage> {
        self.report.failure().map(|f| f.stage)
    }
}

/// Write-once map from audit id to record. Nothing is persisted.
#[derive(Default)]
pub struct AuditStore {
    records: RwLock<HashMap<AuditId, AuditRecord>>,
}

impl AuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record. Each id may be written once.
    pub async fn insert(&self, record: AuditRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.audit_id) {
            return Err(Error::Internal(format!(
                "audit {} already recorded",
                record.audit_id
            )));
        }
        records.insert(record.audit_id, record);
        Ok(())
    }

    pub async fn get(&self, id: &AuditId) -> Option<AuditRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::AuditFailure;
    use std::sync::Arc;

    fn failed(request_id: &str) -> AuditReport {
        AuditReport::Failed(AuditFailure {
            request_id: request_id.to_string(),
            stage: AuditStage::Verify,
            error: "boom".to_string(),
        })
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = AuditStore::new();
        let id = AuditId::new();

        store.insert(AuditRecord::new(id, failed("req-1"), 12)).await.unwrap();

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.report.request_id(), "req-1");
        assert_eq!(record.failed_stage(), Some(AuditStage::Verify));
        assert!(store.get(&AuditId::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_second_write_is_rejected() {
        let store = AuditStore::new();
        let id = AuditId::new();

        store.insert(AuditRecord::new(id, failed("req-1"), 1)).await.unwrap();
        let second = store.insert(AuditRecord::new(id, failed("req-2"), 1)).await;

        assert!(matches!(second, Err(Error::Internal(_))));
        assert_eq!(store.get(&id).await.unwrap().report.request_id(), "req-1");
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let store = Arc::new(AuditStore::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert(AuditRecord::new(AuditId::new(), failed(&format!("req-{}", i)), 0))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await, 16);
    }

    #[test]
    fn test_audit_id_parse() {
        let id = AuditId::new();
        assert_eq!(id.to_string().parse::<AuditId>().unwrap(), id);
        assert!("not-a-uuid".parse::<AuditId>().is_err());
    }
}
