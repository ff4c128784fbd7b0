//! Vector search capability and the in-process implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AuditSettings;
use crate::error::{Error, Result};

use super::qdrant::QdrantStore;
use super::sqlite::SqliteVectorStore;

/// Free-form metadata stored next to a knowledge snippet.
pub type Metadata = HashMap<String, serde_json::Value>;

/// One ranked match from a vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Point identifier
    pub id: String,
    /// Stored snippet text
    pub text: String,
    /// Similarity score (higher is closer)
    pub score: f32,
    /// Metadata stored with the snippet
    pub metadata: Metadata,
}

/// Stores snippets as vectors and finds the nearest ones to a query.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the backing collection if it does not exist. Idempotent.
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert or update snippets, returning how many were written.
    ///
    /// `metadata` is either empty or one entry per text.
    async fn upsert(
        &self,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadata: &[Metadata],
    ) -> Result<usize>;

    /// Up to `top_k` hits scoring at least `score_threshold`, best first.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>>;

    /// Number of stored snippets.
    async fn count(&self) -> Result<u64>;

    /// Whether the store is reachable.
    async fn health_check(&self) -> bool;
}

/// Knowledge base selected by `settings`: Qdrant when `qdrant_url` is set,
/// else SQLite when `knowledge_db` is set, else none.
pub fn build_vector_store(settings: &AuditSettings) -> Result<Option<Arc<dyn VectorStore>>> {
    if let Some(url) = &settings.qdrant_url {
        let store = QdrantStore::new(
            url,
            &settings.qdrant_collection,
            settings.embedding_dimension,
        )?;
        return Ok(Some(Arc::new(store)));
    }
    if let Some(path) = &settings.knowledge_db {
        info!(path = %path, "Opening SQLite knowledge base");
        return Ok(Some(Arc::new(SqliteVectorStore::open(path)?)));
    }
    Ok(None)
}

/// Make sure `store` is usable for audits.
///
/// Creates the collection if needed and warns when it is empty. A store that
/// cannot be reached or initialized is dropped, so audits run without
/// retrieval instead of failing at the retrieve stage.
pub async fn prepare_vector_store(
    store: Arc<dyn VectorStore>,
) -> Option<Arc<dyn VectorStore>> {
    let ready = async {
        store.ensure_collection().await?;
        store.count().await
    }
    .await;
    match ready {
        Ok(0) => {
            warn!("Knowledge base is empty; run `truthtable seed` to load documents");
            Some(store)
        }
        Ok(count) => {
            info!(count, "Knowledge base ready");
            Some(store)
        }
        Err(e) => {
            error!(error = %e, "Knowledge base unavailable; continuing without retrieval");
            None
        }
    }
}

/// Check the shape of an upsert batch.
pub(crate) fn validate_batch(
    texts: &[String],
    vectors: &[Vec<f32>],
    metadata: &[Metadata],
) -> Result<()> {
    if texts.len() != vectors.len() {
        return Err(Error::VectorStore(format!(
            "texts ({}) and vectors ({}) must have same length",
            texts.len(),
            vectors.len()
        )));
    }
    if !metadata.is_empty() && metadata.len() != texts.len() {
        return Err(Error::VectorStore(format!(
            "metadata ({}) must be empty or match texts ({})",
            metadata.len(),
            texts.len()
        )));
    }
    Ok(())
}

/// Content-addressed point id: the same text always maps to the same id.
pub fn point_id(text: &str) -> Uuid {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Sort hits best-first, drop those under the threshold, cap at `top_k`.
pub(crate) fn rank_hits(
    mut hits: Vec<SearchHit>,
    top_k: usize,
    score_threshold: f32,
) -> Vec<SearchHit> {
    hits.retain(|h| h.score >= score_threshold);
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(top_k);
    hits
}

#[derive(Debug, Clone)]
struct StoredPoint {
    text: String,
    vector: Vec<f32>,
    metadata: Metadata,
}

/// In-process vector store with brute-force cosine search.
///
/// Nothing is persisted; contents live as long as the store.
#[derive(Default)]
pub struct MemoryVectorStore {
    points: RwLock<HashMap<Uuid, StoredPoint>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(
        &self,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadata: &[Metadata],
    ) -> Result<usize> {
        validate_batch(texts, vectors, metadata)?;

        let mut points = self.points.write().await;
        for (i, (text, vector)) in texts.iter().zip(vectors).enumerate() {
            points.insert(
                point_id(text),
                StoredPoint {
                    text: text.clone(),
                    vector: vector.clone(),
                    metadata: metadata.get(i).cloned().unwrap_or_default(),
                },
            );
        }
        Ok(texts.len())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let points = self.points.read().await;
        let hits = points
            .iter()
            .map(|(id, point)| SearchHit {
                id: id.to_string(),
                text: point.text.clone(),
                score: cosine_similarity(vector, &point.vector),
                metadata: point.metadata.clone(),
            })
            .collect();
        Ok(rank_hits(hits, top_k, score_threshold))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.points.read().await.len() as u64)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_point_id_is_content_addressed() {
        assert_eq!(point_id("Paris"), point_id("Paris"));
        assert_ne!(point_id("Paris"), point_id("London"));
    }

    #[test]
    fn test_validate_batch() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let vectors = vec![vec![1.0], vec![0.5]];

        assert!(validate_batch(&texts, &vectors, &[]).is_ok());
        assert!(validate_batch(&texts, &vectors[..1], &[]).is_err());
        assert!(validate_batch(&texts, &vectors, &[Metadata::new()]).is_err());
    }

    #[tokio::test]
    async fn test_memory_store_search_respects_threshold_and_cap() {
        let store = MemoryVectorStore::new();
        let texts = vec![
            "Paris is the capital of France.".to_string(),
            "Berlin is the capital of Germany.".to_string(),
            "Water boils at 100 degrees Celsius.".to_string(),
        ];
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.8, 0.6, 0.0], vec![0.0, 0.0, 1.0]];
        assert_eq!(store.upsert(&texts, &vectors, &[]).await.unwrap(), 3);

        let hits = store.search(&[1.0, 0.0, 0.0], 5, 0.3).await.unwrap();
        let found: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(
            found,
            vec!["Paris is the capital of France.", "Berlin is the capital of Germany."]
        );

        let capped = store.search(&[1.0, 0.0, 0.0], 1, 0.3).await.unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].text, "Paris is the capital of France.");
    }

    #[test]
    fn test_build_vector_store_selection() {
        assert!(build_vector_store(&AuditSettings::default()).unwrap().is_none());

        let dir = tempfile::tempdir().unwrap();
        let sqlite = AuditSettings {
            knowledge_db: Some(dir.path().join("kb.db").to_string_lossy().into_owned()),
            ..AuditSettings::default()
        };
        assert!(build_vector_store(&sqlite).unwrap().is_some());

        let qdrant = AuditSettings {
            qdrant_url: Some("http://localhost:6333".to_string()),
            ..sqlite
        };
        assert!(build_vector_store(&qdrant).unwrap().is_some());
    }

    /// Store whose backend is unreachable.
    struct UnreachableStore;

    #[async_trait]
    impl VectorStore for UnreachableStore {
        async fn ensure_collection(&self) -> Result<()> {
            Err(Error::VectorStore("connection refused".to_string()))
        }

        async fn upsert(
            &self,
            _texts: &[String],
            _vectors: &[Vec<f32>],
            _metadata: &[Metadata],
        ) -> Result<usize> {
            Err(Error::VectorStore("connection refused".to_string()))
        }

        async fn search(
            &self,
            _vector: &[f32],
            _top_k: usize,
            _score_threshold: f32,
        ) -> Result<Vec<SearchHit>> {
            Err(Error::VectorStore("connection refused".to_string()))
        }

        async fn count(&self) -> Result<u64> {
            Err(Error::VectorStore("connection refused".to_string()))
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_prepare_keeps_empty_store() {
        let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        assert!(prepare_vector_store(store).await.is_some());
    }

    #[tokio::test]
    async fn test_prepare_drops_unreachable_store() {
        assert!(prepare_vector_store(Arc::new(UnreachableStore)).await.is_none());

        let qdrant = QdrantStore::new("http://127.0.0.1:9", "truthtable_knowledge", 4).unwrap();
        assert!(prepare_vector_store(Arc::new(qdrant)).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_audit_to_caller_context() {
        use crate::audit::{AuditPipeline, AuditRequest, Degradation};
        use crate::retrieval::EvidenceRetriever;
        use crate::testing::{FixedEmbedder, ScriptedClient};

        let client = Arc::new(ScriptedClient::new(vec![
            r#"["Paris is the capital of France"]"#,
            r#"{"status": "SUPPORTED", "confidence": 0.9}"#,
        ]));
        let retriever = prepare_vector_store(Arc::new(UnreachableStore))
            .await
            .map(|store| EvidenceRetriever::new(Arc::new(FixedEmbedder::new(4)), store));
        let pipeline = AuditPipeline::new(client, retriever);

        let result = pipeline
            .run_audit(
                &AuditRequest::new(
                    "req-1",
                    "What is the capital of France?",
                    "Paris is the capital of France.",
                )
                .with_context("Paris is the capital of France."),
            )
            .await
            .into_result()
            .unwrap();

        assert_eq!(result.degradations, vec![Degradation::RetrievalDisabled]);
        assert_eq!(result.evidence_count, 1);
        assert!(!result.hallucination_detected);
    }

    #[tokio::test]
    async fn test_memory_store_upsert_same_text_overwrites() {
        let store = MemoryVectorStore::new();
        let texts = vec!["Paris is the capital of France.".to_string()];

        store.upsert(&texts, &[vec![1.0, 0.0]], &[]).await.unwrap();
        store.upsert(&texts, &[vec![0.0, 1.0]], &[]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let hits = store.search(&[0.0, 1.0], 3, 0.9).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
