use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::config::{parse_provider_model, EmbeddingsConfig};
use crate::error::{Result, TurBotError};

/// Classification of one request attempt against the embedding endpoint.
/// Transient trouble gets retried with backoff; anything structural stops
/// the request immediately.
enum AttemptOutcome {
    Done(Vec<Vec<f32>>),
    Retry(TurBotError),
    Fatal(TurBotError),
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingList {
    data: Vec<EmbeddingItem>,
}

/// Remote embedding provider over an OpenAI-compatible `/embeddings`
/// endpoint, with a process-wide LRU cache in front of it.
///
/// The fixed dimensionality is part of the contract: every vector written
/// to or queried from the store has `dimensions()` components.
#[derive(Clone)]
pub struct EmbeddingProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    batch_size: usize,
    max_retries: u32,
    cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let (provider, model) = parse_provider_model(&config.model);

        let base_url = config.base_url.clone().unwrap_or_else(|| {
            match provider.to_lowercase().as_str() {
                "openrouter" => "https://openrouter.ai/api/v1",
                "ollama" => "http://localhost:11434/v1",
                "lmstudio" => "http://localhost:1234/v1",
                _ => "https://api.openai.com/v1",
            }
            .to_string()
        });

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                TurBotError::Embedding(format!("Failed to create embedding HTTP client: {e}"))
            })?;

        let capacity = NonZeroUsize::new(config.cache_size.max(1))
            .ok_or_else(|| TurBotError::Embedding("Cache capacity must be non-zero".into()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: model.to_string(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a batch of texts, serving cache hits without a network call and
    /// batching the misses per the configured batch size.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        {
            let mut cache = self.cache.lock().unwrap();
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(vector) => results[i] = Some(vector.clone()),
                    None => misses.push(i),
                }
            }
        }

        for batch in misses.chunks(self.batch_size) {
            let inputs: Vec<&str> = batch.iter().map(|&i| texts[i].as_str()).collect();
            let vectors = self.fetch_batch(&inputs).await?;

            if vectors.len() != batch.len() {
                return Err(TurBotError::Embedding(format!(
                    "Provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }

            let mut cache = self.cache.lock().unwrap();
            for (&i, vector) in batch.iter().zip(vectors) {
                self.check_dimensions(&vector)?;
                cache.put(texts[i].clone(), vector.clone());
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| TurBotError::Embedding("No embedding generated".to_string()))
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_single(query).await
    }

    pub async fn embed_passages(&self, passages: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.embed(&passages).await
    }

    /// One logical request with bounded retries for transient failures.
    async fn fetch_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut last_error: Option<TurBotError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(150 * 2_u64.pow(attempt - 1))).await;
            }

            match self.attempt(inputs).await {
                AttemptOutcome::Done(vectors) => return Ok(vectors),
                AttemptOutcome::Fatal(error) => return Err(error),
                AttemptOutcome::Retry(error) => {
                    tracing::debug!(attempt, error = %error, "Embedding attempt failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TurBotError::Embedding("Embedding request exhausted retries".to_string())
        }))
    }

    async fn attempt(&self, inputs: &[&str]) -> AttemptOutcome {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "model": self.model, "input": inputs }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return AttemptOutcome::Retry(TurBotError::Embedding(format!(
                    "Embedding request failed: {e}"
                )))
            }
        };

        let status = response.status();

        if status.is_success() {
            return match response.json::<EmbeddingList>().await {
                Ok(mut list) => {
                    // Providers may reorder; the index field is authoritative
                    list.data.sort_by_key(|item| item.index);
                    AttemptOutcome::Done(list.data.into_iter().map(|item| item.embedding).collect())
                }
                Err(e) => AttemptOutcome::Fatal(TurBotError::Embedding(format!(
                    "Malformed embedding response: {e}"
                ))),
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return AttemptOutcome::Retry(TurBotError::ApiRateLimit { retry_after });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return AttemptOutcome::Fatal(TurBotError::ApiAuth(body));
        }

        if status.is_server_error() {
            return AttemptOutcome::Retry(TurBotError::Embedding(format!(
                "Embedding endpoint returned {status}"
            )));
        }

        let body = response.text().await.unwrap_or_default();
        AttemptOutcome::Fatal(TurBotError::Embedding(format!(
            "Embedding endpoint returned {status}: {body}"
        )))
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(TurBotError::Embedding(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(())
    }
}
