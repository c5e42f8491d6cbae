use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::llm::{prompts, CompletionOptions, LlmProvider};

/// Upper bound on OR-joined terms in an expansion; anything wider drifts
/// off-topic and dilutes the embedding.
const MAX_EXPANSION_TERMS: usize = 12;

/// Expansions mentioning any of these are discarded as off-topic.
const OFF_TOPIC_STOPLIST: &[&str] = &[
    "politik",
    "fudbal",
    "utakmic",
    "berza",
    "kripto",
    "softver",
    "program",
    "recept",
];

/// Serbian tourism synonym table for the non-LLM fallback.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("hotel", &["smeštaj", "apartman", "vila"]),
    ("smeštaj", &["hotel", "apartman", "pansion"]),
    ("smestaj", &["hotel", "apartman", "pansion"]),
    ("restoran", &["kafana", "gostionica", "restaurant"]),
    ("plaža", &["more", "beach", "kupanje"]),
    ("plaza", &["more", "beach", "kupanje"]),
    ("tura", &["izlet", "putovanje", "aranžman"]),
    ("letovanje", &["odmor", "more", "plaža"]),
    ("zimovanje", &["skijanje", "planina", "sneg"]),
    ("romantičan", &["za parove", "intimno", "romantic"]),
    ("luksuzno", &["lux", "premium", "vrhunsko"]),
    ("porodičn", &["family", "sa decom", "kids friendly"]),
    ("najbolji", &["top", "odličan", "vrhunski"]),
    ("rim", &["roma", "rome", "italija"]),
    ("pariz", &["paris", "francuska", "france"]),
    ("amsterdam", &["holandija", "netherlands"]),
    ("istanbul", &["turska", "turkey"]),
    ("atina", &["grčka", "greece"]),
];

/// Bounded cache of validated LLM expansions.
///
/// Only LLM output that passed validation goes in: the synonym fallback is
/// cheap to recompute, and not caching it means the LLM path gets retried
/// on the next identical query once the provider recovers. Keys are hashes
/// of the normalized query, so long inputs stay cheap to hold.
struct ExpansionCache {
    entries: Mutex<LruCache<u64, String>>,
}

impl ExpansionCache {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(query: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        query.trim().to_lowercase().hash(&mut hasher);
        hasher.finish()
    }

    fn lookup(&self, query: &str) -> Option<String> {
        self.entries.lock().unwrap().get(&Self::key(query)).cloned()
    }

    fn store(&self, query: &str, expansion: String) {
        self.entries.lock().unwrap().put(Self::key(query), expansion);
    }
}

/// Produces a semantically widened query string used as the embedding
/// input, never shown to the user. LLM-backed with a synonym-table
/// fallback.
#[derive(Clone)]
pub struct QueryExpander {
    llm: LlmProvider,
    cache: Arc<ExpansionCache>,
}

impl QueryExpander {
    pub fn new(llm: LlmProvider, cache_size: usize) -> Self {
        Self {
            llm,
            cache: Arc::new(ExpansionCache::new(cache_size)),
        }
    }

    pub async fn expand(&self, query: &str) -> String {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return query.to_string();
        }

        if let Some(cached) = self.cache.lookup(trimmed) {
            return cached;
        }

        if self.llm.is_available() {
            if let Some(expansion) = self.expand_with_llm(trimmed).await {
                self.cache.store(trimmed, expansion.clone());
                return expansion;
            }
        }

        fallback_expansion(trimmed)
    }

    async fn expand_with_llm(&self, query: &str) -> Option<String> {
        let prompt = prompts::expansion_prompt(query);
        let options = CompletionOptions {
            temperature: Some(0.3),
            max_tokens: Some(200),
            ..Default::default()
        };

        match self.llm.complete(&prompt, Some(&options)).await {
            Ok(expanded) => {
                let expanded = expanded.trim().trim_matches('"').to_string();
                if is_valid_expansion(&expanded, query) {
                    tracing::debug!(original = %query, expanded = %expanded, "Query expanded");
                    Some(expanded)
                } else {
                    tracing::warn!(original = %query, "Invalid LLM expansion, using fallback");
                    None
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM expansion failed, using fallback");
                None
            }
        }
    }
}

/// Token-budget and topic validation of an LLM expansion. Falling back to
/// the original query is always safe; a bad expansion is not.
fn is_valid_expansion(expanded: &str, original: &str) -> bool {
    if expanded.is_empty() || expanded.len() < original.len() {
        return false;
    }

    if !expanded.contains(" OR ") {
        return false;
    }

    let terms_count = expanded.split(" OR ").count();
    if terms_count > MAX_EXPANSION_TERMS {
        return false;
    }

    if expanded.len() > original.len() * 12 {
        return false;
    }

    let lower = expanded.to_lowercase();
    if OFF_TOPIC_STOPLIST.iter().any(|term| lower.contains(term)) {
        return false;
    }

    true
}

/// Deterministic synonym expansion when the LLM is unavailable or returned
/// something unusable.
fn fallback_expansion(query: &str) -> String {
    let mut terms: Vec<String> = Vec::new();

    for word in query.split_whitespace() {
        if !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }

        let word_lower = word.to_lowercase();
        for (key, synonyms) in SYNONYMS {
            if word_lower.contains(key) {
                for synonym in synonyms.iter().take(3) {
                    if terms.len() >= MAX_EXPANSION_TERMS {
                        break;
                    }
                    if !terms.iter().any(|t| t == synonym) {
                        terms.push(synonym.to_string());
                    }
                }
            }
        }

        if terms.len() >= MAX_EXPANSION_TERMS {
            break;
        }
    }

    terms.join(" OR ")
}
