#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use turbot::config::{
    Config, DatabaseConfig, EmbeddingsConfig, LlmConfig, ProcessingConfig, RetrievalConfig,
    ServerConfig, SessionConfig,
};
use turbot::db::{CollectionStats, VectorMatch, VectorRecord, VectorStore};
use turbot::error::Result;
use turbot::models::{Chunk, EnrichedMetadata, HardFilter, HardFilterField};

pub const TEST_DIMENSIONS: usize = 3;

/// In-memory vector store double: brute-force cosine distance, single
/// equality filter on the hard-filterable metadata fields, and a record of
/// every filter it was queried with.
pub struct MemoryVectorStore {
    records: Mutex<Vec<VectorRecord>>,
    queries: Mutex<Vec<Option<HardFilter>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn seeded(records: Vec<VectorRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_queries(&self) -> Vec<Option<HardFilter>> {
        self.queries.lock().unwrap().clone()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.chunk.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn matches_filter(metadata: &EnrichedMetadata, filter: &HardFilter) -> bool {
        let actual = match filter.field {
            HardFilterField::Destination => metadata.destination.clone(),
            HardFilterField::TravelMonth => metadata.travel_month.map(|m| m.to_string()),
            HardFilterField::Category => metadata.category.map(|c| c.to_string()),
            HardFilterField::PriceRange => metadata.price_range.map(|p| p.to_string()),
        };
        actual.is_some_and(|value| value.eq_ignore_ascii_case(&filter.value))
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, new_records: &[VectorRecord]) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        for record in new_records {
            records.retain(|r| r.chunk.id != record.chunk.id);
            records.push(record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        filter: Option<&HardFilter>,
        top_k: u32,
    ) -> Result<Vec<VectorMatch>> {
        self.queries.lock().unwrap().push(filter.cloned());

        let records = self.records.lock().unwrap();
        let mut matches: Vec<VectorMatch> = records
            .iter()
            .filter(|r| match filter {
                Some(f) => Self::matches_filter(&r.chunk.metadata, f),
                None => true,
            })
            .map(|r| VectorMatch {
                chunk_id: r.chunk.id.clone(),
                source_file: r.chunk.source_file.clone(),
                page: r.chunk.page,
                text: r.chunk.text.clone(),
                metadata: r.chunk.metadata.clone(),
                distance: cosine_distance(embedding, &r.embedding),
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k as usize);
        Ok(matches)
    }

    async fn delete_document(&self, source_file: &str) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.chunk.source_file != source_file);
        Ok((before - records.len()) as u64)
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let records = self.records.lock().unwrap();
        let mut documents: Vec<String> =
            records.iter().map(|r| r.chunk.source_file.clone()).collect();
        documents.sort();
        documents.dedup();
        Ok(CollectionStats {
            total_chunks: records.len() as u64,
            documents,
        })
    }
}

pub fn chunk_record(
    id: &str,
    source_file: &str,
    text: &str,
    metadata: EnrichedMetadata,
    embedding: Vec<f32>,
) -> VectorRecord {
    VectorRecord {
        chunk: Chunk {
            id: id.to_string(),
            source_file: source_file.to_string(),
            page: Some(1),
            position: 0,
            text: text.to_string(),
            token_count: 10,
            metadata,
            created_at: Utc::now(),
        },
        embedding,
    }
}

/// Responds to `/embeddings` with one unit vector per input, so batch sizes
/// always line up.
pub struct EmbeddingResponder;

impl Respond for EmbeddingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).unwrap_or_else(|_| json!({}));
        let count = body
            .get("input")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(1);

        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                json!({
                    "object": "embedding",
                    "index": i,
                    "embedding": [1.0, 0.0, 0.0]
                })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": data,
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 1, "total_tokens": 1}
        }))
    }
}

pub async fn mount_embeddings(server: &MockServer) {
    Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/embeddings"))
        .respond_with(EmbeddingResponder)
        .mount(server)
        .await;
}

pub fn llm_chat_response(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
    })
}

pub fn test_llm_config(base_url: String) -> LlmConfig {
    LlmConfig {
        model: "openai/gpt-4o-mini".to_string(),
        api_key: Some("test-key".to_string()),
        base_url: Some(base_url),
        timeout_secs: 5,
        max_retries: 0,
    }
}

pub fn test_config(session_dir: &str, embeddings_base_url: String) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
            auth_token: None,
        },
        embeddings: EmbeddingsConfig {
            model: "openai/text-embedding-3-small".to_string(),
            dimensions: TEST_DIMENSIONS,
            batch_size: 8,
            api_key: Some("test-key".to_string()),
            base_url: Some(embeddings_base_url),
            timeout_secs: 5,
            max_retries: 0,
            cache_size: 64,
        },
        processing: ProcessingConfig {
            chunk_size_tokens: 1024,
            chunk_overlap_tokens: 200,
        },
        session: SessionConfig {
            storage_path: session_dir.to_string(),
            recent_turns: 3,
            max_idle_hours: 24,
            janitor_interval_secs: 3600,
        },
        retrieval: RetrievalConfig {
            top_k: 5,
            overfetch_factor: 4,
            fallback_threshold: 3,
            expansion_cache_size: 64,
        },
        llm: None,
    }
}
