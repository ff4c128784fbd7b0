//! Qdrant vector store over the REST API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::llm::build_http_client;

use super::store::{point_id, validate_batch, Metadata, SearchHit, VectorStore};

/// Points sent per upsert call.
const UPSERT_BATCH_SIZE: usize = 100;

/// Knowledge base stored in a Qdrant collection with cosine distance.
pub struct QdrantStore {
    base_url: String,
    collection: String,
    dimension: usize,
    http: Client,
}

impl QdrantStore {
    pub fn new(
        url: impl Into<String>,
        collection: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        let url: String = url.into();
        let base_url = url.trim_end_matches('/').to_string();
        info!(url = %base_url, "Connecting to Qdrant");
        Ok(Self {
            base_url,
            collection: collection.into(),
            dimension,
            http: build_http_client(10)?,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::VectorStore(format!("Qdrant request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to read Qdrant response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::VectorStore(format!(
                "Qdrant returned {}: {}",
                status, body
            )));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Serialize)]
struct PointStruct {
    id: String,
    vector: Vec<f32>,
    payload: Metadata,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Metadata,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: Option<u64>,
}

fn result_field<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T> {
    let result = body
        .get("result")
        .cloned()
        .ok_or_else(|| Error::VectorStore("Qdrant response has no result".to_string()))?;
    Ok(serde_json::from_value(result)?)
}

impl From<ScoredPoint> for SearchHit {
    fn from(point: ScoredPoint) -> Self {
        let mut metadata = point.payload;
        let text = match metadata.remove("text") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let id = match point.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        SearchHit {
            id,
            text,
            score: point.score,
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self) -> Result<()> {
        let response = self
            .http
            .get(self.collection_url(""))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to ensure collection: {}", e);
                Error::VectorStore(format!("Qdrant request failed: {}", e))
            })?;

        if response.status().is_success() {
            info!(collection = %self.collection, "Collection already exists");
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(Error::VectorStore(format!(
                "Unexpected status {} checking collection {}",
                response.status(),
                self.collection
            )));
        }

        let body = json!({
            "vectors": { "size": self.dimension, "distance": "Cosine" }
        });
        self.send(self.http.put(self.collection_url("")).json(&body))
            .await?;
        info!(
            collection = %self.collection,
            dimension = self.dimension,
            "Created collection (distance=cosine)"
        );
        Ok(())
    }

    async fn upsert(
        &self,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadata: &[Metadata],
    ) -> Result<usize> {
        validate_batch(texts, vectors, metadata)?;

        let points: Vec<PointStruct> = texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| {
                let mut payload = metadata.get(i).cloned().unwrap_or_default();
                payload.insert("text".to_string(), Value::String(text.clone()));
                PointStruct {
                    id: point_id(text).to_string(),
                    vector: vector.clone(),
                    payload,
                }
            })
            .collect();

        for batch in points.chunks(UPSERT_BATCH_SIZE) {
            self.send(
                self.http
                    .put(self.collection_url("/points?wait=true"))
                    .json(&json!({ "points": batch })),
            )
            .await?;
        }

        info!(count = points.len(), collection = %self.collection, "Upserted documents");
        Ok(points.len())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let body = json!({
            "query": vector,
            "limit": top_k,
            "score_threshold": score_threshold,
            "with_payload": true,
        });
        let response = self
            .send(self.http.post(self.collection_url("/points/query")).json(&body))
            .await?;
        let result: QueryResult = result_field(response)?;

        let hits: Vec<SearchHit> = result.points.into_iter().map(SearchHit::from).collect();
        debug!(count = hits.len(), threshold = score_threshold, "Search returned results");
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        let response = self.send(self.http.get(self.collection_url(""))).await?;
        let info: CollectionInfo = result_field(response)?;
        Ok(info.points_count.unwrap_or(0))
    }

    async fn health_check(&self) -> bool {
        match self
            .http
            .get(format!("{}/collections", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                error!(status = %r.status(), "Qdrant health check failed");
                false
            }
            Err(e) => {
                error!("Qdrant health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collection_url() {
        let store = QdrantStore::new("http://localhost:6333/", "facts", 384).unwrap();
        assert_eq!(
            store.collection_url("/points/query"),
            "http://localhost:6333/collections/facts/points/query"
        );
        assert_eq!(store.collection(), "facts");
    }

    #[test]
    fn test_query_response_to_hits() {
        let body = json!({
            "result": {
                "points": [
                    {
                        "id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26",
                        "score": 0.91,
                        "payload": {
                            "text": "Paris is the capital of France.",
                            "category": "geography"
                        }
                    },
                    { "id": 7, "score": 0.42, "payload": {} }
                ]
            },
            "status": "ok"
        });

        let result: QueryResult = result_field(body).unwrap();
        let hits: Vec<SearchHit> = result.points.into_iter().map(SearchHit::from).collect();

        assert_eq!(hits[0].text, "Paris is the capital of France.");
        assert_eq!(hits[0].metadata.get("category"), Some(&json!("geography")));
        assert!(!hits[0].metadata.contains_key("text"));
        assert_eq!(hits[1].id, "7");
        assert_eq!(hits[1].text, "");
    }

    #[test]
    fn test_collection_info_count() {
        let body = json!({ "result": { "status": "green", "points_count": 42 } });
        let info: CollectionInfo = result_field(body).unwrap();
        assert_eq!(info.points_count, Some(42));

        assert!(result_field::<CollectionInfo>(json!({ "status": "ok" })).is_err());
    }
}
