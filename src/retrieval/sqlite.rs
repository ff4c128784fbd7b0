//! SQLite-backed knowledge base.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::store::{
    cosine_similarity, point_id, rank_hits, validate_batch, Metadata, SearchHit, VectorStore,
};

/// Persistent vector store in a single SQLite file.
///
/// Vectors are stored as little-endian f32 blobs and searched by brute-force
/// cosine similarity, which is fine for curated knowledge bases of a few
/// thousand snippets.
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    /// Open or create a knowledge base at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory knowledge base (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::Storage(e.to_string()))
    }
}

fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS knowledge (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    Ok(())
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        self.with_conn(initialize_schema)
    }

    async fn upsert(
        &self,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadata: &[Metadata],
    ) -> Result<usize> {
        validate_batch(texts, vectors, metadata)?;

        let encoded: Vec<String> = (0..texts.len())
            .map(|i| serde_json::to_string(&metadata.get(i).cloned().unwrap_or_default()))
            .collect::<std::result::Result<_, _>>()?;

        let written = self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO knowledge (id, text, embedding, metadata)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        embedding = excluded.embedding,
                        metadata = excluded.metadata",
                )?;
                for ((text, vector), meta) in texts.iter().zip(vectors).zip(&encoded) {
                    stmt.execute(params![
                        point_id(text).to_string(),
                        text,
                        vector_to_blob(vector),
                        meta
                    ])?;
                }
            }
            tx.commit()?;
            Ok(texts.len())
        })?;

        info!(count = written, "Upserted documents into knowledge base");
        Ok(written)
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, text, embedding, metadata FROM knowledge")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let hits = rows
            .into_iter()
            .map(|(id, text, blob, meta)| {
                let metadata = match serde_json::from_str(&meta) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!(id = %id, error = %e, "Ignoring unreadable metadata");
                        Metadata::new()
                    }
                };
                SearchHit {
                    score: cosine_similarity(vector, &blob_to_vector(&blob)),
                    id,
                    text,
                    metadata,
                }
            })
            .collect();

        let ranked = rank_hits(hits, top_k, score_threshold);
        debug!(count = ranked.len(), threshold = score_threshold, "Search returned results");
        Ok(ranked)
    }

    async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM knowledge", [], |row| row.get::<_, i64>(0))
        })
        .map(|n| n.max(0) as u64)
    }

    async fn health_check(&self) -> bool {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .is_ok()
    }
}
