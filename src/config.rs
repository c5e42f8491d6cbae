use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embeddings: EmbeddingsConfig,
    pub processing: ProcessingConfig,
    pub session: SessionConfig,
    pub retrieval: RetrievalConfig,
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Capacity of the process-wide embedding LRU cache.
    pub cache_size: usize,
}

/// LLM configuration for chat/completion models
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Target chunk size in estimated tokens.
    pub chunk_size_tokens: usize,
    /// Overlap between consecutive chunks in estimated tokens.
    pub chunk_overlap_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub storage_path: String,
    /// Number of verbatim turns kept in the recent ring.
    pub recent_turns: usize,
    /// Sessions idle longer than this are swept by the janitor.
    pub max_idle_hours: i64,
    pub janitor_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Final number of chunks handed to the synthesizer.
    pub top_k: usize,
    /// Over-fetch multiplier for the vector-store request.
    pub overfetch_factor: usize,
    /// Below this many hard-filtered results, retry without the hard filter.
    pub fallback_threshold: usize,
    pub expansion_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("TURBOT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("TURBOT_PORT", 8000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:turbot.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
            },
            embeddings: EmbeddingsConfig {
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "openai/text-embedding-3-small".to_string()),
                dimensions: parse_env_or("EMBEDDING_DIMENSIONS", 1536),
                batch_size: parse_env_or("EMBEDDING_BATCH_SIZE", 64),
                api_key: env::var("EMBEDDING_API_KEY")
                    .or_else(|_| env::var("OPENAI_API_KEY"))
                    .ok(),
                base_url: env::var("EMBEDDING_BASE_URL").ok(),
                timeout_secs: parse_env_or("EMBEDDING_TIMEOUT", 5),
                max_retries: parse_env_or("EMBEDDING_MAX_RETRIES", 1),
                cache_size: parse_env_or("EMBEDDING_CACHE_SIZE", 20000),
            },
            processing: ProcessingConfig {
                chunk_size_tokens: parse_env_or("CHUNK_SIZE_TOKENS", 1024),
                chunk_overlap_tokens: parse_env_or("CHUNK_OVERLAP_TOKENS", 200),
            },
            session: SessionConfig {
                storage_path: env::var("SESSION_STORAGE_PATH")
                    .unwrap_or_else(|_| "./conversation_data/sessions".to_string()),
                recent_turns: parse_env_or("SESSION_RECENT_TURNS", 3),
                max_idle_hours: parse_env_or("SESSION_MAX_IDLE_HOURS", 24),
                janitor_interval_secs: parse_env_or("SESSION_JANITOR_INTERVAL", 3600),
            },
            retrieval: RetrievalConfig {
                top_k: parse_env_or("RETRIEVAL_TOP_K", 5),
                overfetch_factor: parse_env_or("RETRIEVAL_OVERFETCH_FACTOR", 4),
                fallback_threshold: parse_env_or("RETRIEVAL_FALLBACK_THRESHOLD", 3),
                expansion_cache_size: parse_env_or("EXPANSION_CACHE_SIZE", 20000),
            },
            llm: env::var("LLM_MODEL").ok().map(|model| LlmConfig {
                model,
                api_key: env::var("LLM_API_KEY")
                    .or_else(|_| env::var("OPENAI_API_KEY"))
                    .ok(),
                base_url: env::var("LLM_BASE_URL").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 30),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 1),
            }),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Known LLM providers that use OpenAI-compatible APIs
pub const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "openrouter", "ollama", "lmstudio"];

/// Parse a model name into (provider, model) tuple.
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_LLM_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    // Bare model names go straight to the default endpoint
    ("openai", model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_processing_config_defaults() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        std::env::remove_var("CHUNK_SIZE_TOKENS");
        std::env::remove_var("CHUNK_OVERLAP_TOKENS");

        let config = Config::default();
        assert_eq!(config.processing.chunk_size_tokens, 1024);
        assert_eq!(config.processing.chunk_overlap_tokens, 200);
    }

    #[test]
    fn test_session_config_defaults() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        std::env::remove_var("SESSION_RECENT_TURNS");
        std::env::remove_var("SESSION_MAX_IDLE_HOURS");

        let config = Config::default();
        assert_eq!(config.session.recent_turns, 3);
        assert_eq!(config.session.max_idle_hours, 24);
        assert_eq!(config.session.janitor_interval_secs, 3600);
    }

    #[test]
    fn test_retrieval_config_defaults() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        std::env::remove_var("RETRIEVAL_TOP_K");

        let config = Config::default();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.overfetch_factor, 4);
        assert_eq!(config.retrieval.fallback_threshold, 3);
    }

    #[test]
    fn test_llm_config_absent_without_model() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        std::env::remove_var("LLM_MODEL");

        let config = Config::default();
        assert!(config.llm.is_none());
    }

    #[test]
    fn test_llm_config_from_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        std::env::set_var("LLM_MODEL", "openai/gpt-4o-mini");
        std::env::set_var("LLM_TIMEOUT", "10");

        let config = Config::default();
        let llm = config.llm.expect("llm config should be present");
        assert_eq!(llm.model, "openai/gpt-4o-mini");
        assert_eq!(llm.timeout_secs, 10);

        std::env::remove_var("LLM_MODEL");
        std::env::remove_var("LLM_TIMEOUT");
    }

    #[test]
    fn test_parse_provider_model() {
        assert_eq!(
            parse_provider_model("openai/gpt-4o-mini"),
            ("openai", "gpt-4o-mini")
        );
        assert_eq!(
            parse_provider_model("ollama/llama3"),
            ("ollama", "llama3")
        );
        assert_eq!(
            parse_provider_model("text-embedding-3-small"),
            ("openai", "text-embedding-3-small")
        );
    }

    #[test]
    fn test_parse_env_or_valid_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        std::env::set_var("__TEST_TURBOT_PORT", "8080");
        let result: u16 = parse_env_or("__TEST_TURBOT_PORT", 3000);
        assert_eq!(result, 8080);
        std::env::remove_var("__TEST_TURBOT_PORT");
    }
}
