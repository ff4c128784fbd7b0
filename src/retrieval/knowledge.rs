//! Seeding the knowledge base from curated documents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{info, instrument};

use crate::error::{Error, Result};

use super::embedding::Embedder;
use super::store::{Metadata, VectorStore};

/// One curated fact to load into the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedDocument {
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl SeedDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: None,
            source: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert(
            "category".to_string(),
            Value::String(self.category.clone().unwrap_or_else(|| "general".to_string())),
        );
        meta.insert(
            "source".to_string(),
            Value::String(self.source.clone().unwrap_or_else(|| "unknown".to_string())),
        );
        meta
    }
}

/// Read a JSON array of seed documents.
pub fn load_seed_documents(path: impl AsRef<Path>) -> Result<Vec<SeedDocument>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Seed data file not readable: {}: {}", path.display(), e))
    })?;
    let docs: Vec<SeedDocument> = serde_json::from_str(&raw)?;
    info!(count = docs.len(), path = %path.display(), "Loaded seed documents");
    Ok(docs)
}

/// Embed and store `docs`, returning the number written.
#[instrument(skip_all, fields(count = docs.len()))]
pub async fn seed_knowledge(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    docs: &[SeedDocument],
) -> Result<usize> {
    if docs.is_empty() {
        return Ok(0);
    }

    store.ensure_collection().await?;

    let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
    let metadata: Vec<Metadata> = docs.iter().map(SeedDocument::metadata).collect();
    let vectors = embedder.embed(&texts).await?;

    let written = store.upsert(&texts, &vectors, &metadata).await?;
    info!(written, "Seeded knowledge base");
    Ok(written)
}
