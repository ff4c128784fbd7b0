//! Evidence retrieval for a question and its extracted claims.

use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::Result;

use super::embedding::Embedder;
use super::store::VectorStore;

/// Retrieval limits.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Hits kept per query
    pub top_k: usize,
    /// Minimum similarity a hit must reach
    pub score_threshold: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: 0.3,
        }
    }
}

impl RetrieverConfig {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }
}

/// Concatenate text sources keeping the first occurrence of each exact string.
pub fn merge_unique<I>(texts: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    texts
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Finds stored snippets relevant to a question and its claims.
pub struct EvidenceRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    config: RetrieverConfig,
}

impl EvidenceRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self::with_config(embedder, store, RetrieverConfig::default())
    }

    pub fn with_config(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Deduplicated evidence for `user_query` followed by each claim.
    ///
    /// A blank query is skipped. With nothing to search for, the store is
    /// never touched.
    #[instrument(skip_all, fields(claims = claims.len()))]
    pub async fn retrieve<S: AsRef<str>>(
        &self,
        user_query: &str,
        claims: &[S],
    ) -> Result<Vec<String>> {
        let mut queries: Vec<String> = Vec::with_capacity(claims.len() + 1);
        if !user_query.trim().is_empty() {
            queries.push(user_query.to_string());
        }
        queries.extend(claims.iter().map(|c| c.as_ref().to_string()));

        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embedder.embed(&queries).await?;

        let searches = vectors.iter().map(|v| {
            self.store
                .search(v, self.config.top_k, self.config.score_threshold)
        });
        let results = try_join_all(searches).await?;

        let total: usize = results.iter().map(Vec::len).sum();
        let evidence = merge_unique(results.into_iter().flatten().map(|hit| hit.text));
        debug!(
            queries = queries.len(),
            hits = total,
            unique = evidence.len(),
            "Retrieved evidence"
        );
        Ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::MemoryVectorStore;
    use crate::testing::FixedEmbedder;
    use pretty_assertions::assert_eq;

    const PARIS: &str = "Paris is the capital of France.";
    const TOWER: &str = "The Eiffel Tower is in Paris.";
    const WATER: &str = "Water boils at 100 degrees Celsius at sea level.";

    async fn knowledge() -> Arc<MemoryVectorStore> {
        let store = Arc::new(MemoryVectorStore::new());
        store
            .upsert(
                &[PARIS.to_string(), TOWER.to_string(), WATER.to_string()],
                &[vec![1.0, 0.0, 0.0], vec![0.9, 0.3, 0.0], vec![0.0, 0.0, 1.0]],
                &[],
            )
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_merge_unique_keeps_first_occurrence() {
        let merged = merge_unique(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(merged, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_overlapping_queries_are_deduplicated() {
        let embedder = Arc::new(
            FixedEmbedder::new(3)
                .with("What is the capital of France?", vec![1.0, 0.0, 0.0])
                .with("Paris is the capital of France", vec![0.95, 0.1, 0.0])
                .with("Water boils at 100C", vec![0.0, 0.0, 1.0]),
        );
        let retriever = EvidenceRetriever::new(embedder.clone(), knowledge().await);

        let evidence = retriever
            .retrieve(
                "What is the capital of France?",
                &["Paris is the capital of France", "Water boils at 100C"],
            )
            .await
            .unwrap();

        assert_eq!(evidence, vec![PARIS, TOWER, WATER]);
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn test_blank_query_and_no_claims_skips_everything() {
        let embedder = Arc::new(FixedEmbedder::new(3));
        let retriever = EvidenceRetriever::new(embedder.clone(), knowledge().await);

        let evidence = retriever.retrieve("   ", &Vec::<String>::new()).await.unwrap();

        assert!(evidence.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_respects_top_k() {
        let embedder = Arc::new(FixedEmbedder::new(3).with("France", vec![1.0, 0.0, 0.0]));
        let retriever = EvidenceRetriever::with_config(
            embedder,
            knowledge().await,
            RetrieverConfig::default().with_top_k(1),
        );

        let evidence = retriever.retrieve("France", &Vec::<String>::new()).await.unwrap();
        assert_eq!(evidence, vec![PARIS]);
    }

    #[tokio::test]
    async fn test_unmatched_queries_yield_nothing() {
        let embedder = Arc::new(FixedEmbedder::new(3));
        let retriever = EvidenceRetriever::new(embedder, knowledge().await);

        let evidence = retriever
            .retrieve("Who painted the Mona Lisa?", &["Leonardo painted it"])
            .await
            .unwrap();
        assert!(evidence.is_empty());
    }
}
