//! Evidence retrieval.
//!
//! Embeds the question and each claim, searches a knowledge base of curated
//! snippets, and merges the hits into one deduplicated evidence list. The
//! embedding and vector search capabilities are traits so the pipeline can
//! run against Qdrant, a local SQLite file, or an in-memory store.

mod embedding;
mod knowledge;
mod qdrant;
mod retriever;
mod sqlite;
mod store;

pub use embedding::{ClientEmbedder, Embedder};
pub use knowledge::{load_seed_documents, seed_knowledge, SeedDocument};
pub use qdrant::QdrantStore;
pub use retriever::{merge_unique, EvidenceRetriever, RetrieverConfig};
pub use sqlite::SqliteVectorStore;
pub use store::{
    build_vector_store, cosine_similarity, point_id, prepare_vector_store, MemoryVectorStore,
    Metadata, SearchHit, VectorStore,
};
