use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, EnrichedMetadata, HardFilter};

/// A chunk plus its embedding, ready for indexing.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One similarity-search hit. `distance` is the store's raw cosine
/// distance; the retriever converts it to a similarity.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub chunk_id: String,
    pub source_file: String,
    pub page: Option<u32>,
    pub text: String,
    pub metadata: EnrichedMetadata,
    pub distance: f32,
}

/// Aggregate view of the indexed collection, for the admin surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionStats {
    pub total_chunks: u64,
    pub documents: Vec<String>,
}

/// Persistence and similarity search for indexed chunks.
///
/// The store accepts at most ONE equality predicate per query; everything
/// else is applied as soft post-scoring by the retriever.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records keyed by chunk id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Similarity search, nearest first, optionally restricted by a single
    /// metadata equality filter.
    async fn query(
        &self,
        embedding: &[f32],
        filter: Option<&HardFilter>,
        top_k: u32,
    ) -> Result<Vec<VectorMatch>>;

    /// Remove every chunk of a document. Returns the number deleted.
    async fn delete_document(&self, source_file: &str) -> Result<u64>;

    async fn stats(&self) -> Result<CollectionStats>;
}
