use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::db::{VectorRecord, VectorStore};
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::llm::LlmProvider;
use crate::models::Chunk;

use super::chunker::{TextChunk, TextChunker};
use super::enricher::MetadataEnricher;
use super::pdf::PdfExtractor;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Ok,
    Partial,
    Error,
}

impl std::fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Partial => write!(f, "partial"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub filename: String,
    pub chunks_created: usize,
    pub status: IngestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ingestion pipeline: PDF -> chunks -> enriched metadata -> embeddings ->
/// vector store.
///
/// Idempotent by document identity: chunk ids are content hashes, and any
/// previous index entries for the document are replaced wholesale.
pub struct IngestionPipeline {
    extractor: PdfExtractor,
    chunker: TextChunker,
    enricher: MetadataEnricher,
    embeddings: EmbeddingProvider,
    store: Arc<dyn VectorStore>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embeddings: EmbeddingProvider,
        llm: LlmProvider,
        config: &Config,
    ) -> Self {
        Self {
            extractor: PdfExtractor::new(),
            chunker: TextChunker::new(&config.processing),
            enricher: MetadataEnricher::new(llm),
            embeddings,
            store,
        }
    }

    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport> {
        tracing::info!(filename, size = bytes.len(), "Ingesting document");

        let pages = match self.extractor.extract(bytes) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::error!(filename, error = %e, "Extraction failed");
                return Ok(IngestReport {
                    filename: filename.to_string(),
                    chunks_created: 0,
                    status: IngestStatus::Error,
                    error: Some(e.to_string()),
                });
            }
        };

        // (page, window) pairs; tables ride along as standalone windows
        let mut windows: Vec<(Option<u32>, TextChunk)> = Vec::new();
        for page in &pages {
            for chunk in self.chunker.chunk(&page.text) {
                windows.push((Some(page.page), chunk));
            }
            for table in &page.tables {
                if let Some(chunk) = self.chunker.chunk_table(table) {
                    windows.push((Some(page.page), chunk));
                }
            }
        }

        if windows.is_empty() {
            return Ok(IngestReport {
                filename: filename.to_string(),
                chunks_created: 0,
                status: IngestStatus::Error,
                error: Some("Document produced no indexable text".to_string()),
            });
        }

        let mut chunks: Vec<Chunk> = Vec::with_capacity(windows.len());
        let mut degraded = 0usize;

        for (position, (page, window)) in windows.into_iter().enumerate() {
            let metadata = self.enricher.enrich(&window.content, filename).await;
            if metadata.confidence_score == 0.0 {
                degraded += 1;
            }

            chunks.push(Chunk {
                id: chunk_id(filename, position as i32, &window.content),
                source_file: filename.to_string(),
                page,
                position: position as i32,
                text: window.content,
                token_count: window.token_count,
                metadata,
                created_at: Utc::now(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = match self.embeddings.embed_passages(texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::error!(filename, error = %e, "Embedding failed");
                return Ok(IngestReport {
                    filename: filename.to_string(),
                    chunks_created: 0,
                    status: IngestStatus::Error,
                    error: Some(e.to_string()),
                });
            }
        };

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord { chunk, embedding })
            .collect();

        // Replace, don't accumulate: re-ingestion of a changed document
        // must not leave stale chunks behind.
        self.store.delete_document(filename).await?;
        self.store.upsert(&records).await?;

        let status = if degraded == 0 {
            IngestStatus::Ok
        } else {
            IngestStatus::Partial
        };

        tracing::info!(
            filename,
            chunks = records.len(),
            degraded,
            %status,
            "Document indexed"
        );

        Ok(IngestReport {
            filename: filename.to_string(),
            chunks_created: records.len(),
            status,
            error: None,
        })
    }
}

/// Deterministic chunk identifier: same file, position and text always hash
/// to the same id, making re-ingestion an overwrite.
pub fn chunk_id(source_file: &str, position: i32, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_file.as_bytes());
    hasher.update(b":");
    hasher.update(position.to_le_bytes());
    hasher.update(b":");
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_deterministic() {
        let a = chunk_id("rim.pdf", 0, "Aranžman za Rim");
        let b = chunk_id("rim.pdf", 0, "Aranžman za Rim");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_chunk_id_varies_by_inputs() {
        let base = chunk_id("rim.pdf", 0, "tekst");
        assert_ne!(base, chunk_id("rim.pdf", 1, "tekst"));
        assert_ne!(base, chunk_id("pariz.pdf", 0, "tekst"));
        assert_ne!(base, chunk_id("rim.pdf", 0, "drugi tekst"));
    }

    #[test]
    fn test_ingest_status_display() {
        assert_eq!(IngestStatus::Ok.to_string(), "ok");
        assert_eq!(IngestStatus::Partial.to_string(), "partial");
        assert_eq!(IngestStatus::Error.to_string(), "error");
    }
}
