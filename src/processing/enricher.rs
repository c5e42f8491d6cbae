use serde_json::Value;

use crate::intelligence::gazetteer;
use crate::llm::{prompts, CompletionOptions, LlmProvider};
use crate::models::{Category, EnrichedMetadata, PriceRange, Season, TransportType, TravelMonth};

/// Model confidence below which the filename-based destination heuristic
/// overrides the model's answer.
const WEAK_CONFIDENCE: f32 = 0.6;

/// Per-chunk metadata enrichment: one structured LLM call, a strict
/// validator, and deterministic overrides that apply regardless of what the
/// model said.
///
/// Failure never blocks indexing: a chunk whose enrichment failed is
/// indexed with `confidence_score = 0` and stays reachable by vector
/// similarity alone.
#[derive(Clone)]
pub struct MetadataEnricher {
    llm: LlmProvider,
}

impl MetadataEnricher {
    pub fn new(llm: LlmProvider) -> Self {
        Self { llm }
    }

    pub async fn enrich(&self, chunk_text: &str, filename: &str) -> EnrichedMetadata {
        let mut metadata = if self.llm.is_available() {
            match self.enrich_with_llm(chunk_text, filename).await {
                Some(metadata) => metadata,
                None => {
                    tracing::warn!(filename, "Metadata enrichment failed, indexing unenriched");
                    EnrichedMetadata::unenriched()
                }
            }
        } else {
            EnrichedMetadata::unenriched()
        };

        apply_overrides(&mut metadata, chunk_text, filename);
        metadata.normalize();
        metadata
    }

    async fn enrich_with_llm(&self, chunk_text: &str, filename: &str) -> Option<EnrichedMetadata> {
        let prompt = prompts::metadata_enrichment_prompt(filename, chunk_text);
        let options = CompletionOptions {
            temperature: Some(0.1),
            max_tokens: Some(800),
            ..Default::default()
        };

        match self.llm.complete_json(&prompt, Some(&options)).await {
            Ok(raw) => Some(metadata_from_json(&raw)),
            Err(e) => {
                tracing::warn!(filename, error = %e, "Enrichment LLM call failed");
                None
            }
        }
    }
}

/// Strict validation of the model's JSON: unknown enum members and
/// malformed values reset to absent, never to a guess.
fn metadata_from_json(raw: &Value) -> EnrichedMetadata {
    let mut metadata = EnrichedMetadata {
        destination: string_field(raw, "destination")
            .map(|v| gazetteer::canonicalize_destination_value(&v)),
        category: string_field(raw, "category").and_then(|v| v.parse::<Category>().ok()),
        price_range: string_field(raw, "price_range").and_then(|v| v.parse::<PriceRange>().ok()),
        price_min: numeric_field(raw, "price_min"),
        price_max: numeric_field(raw, "price_max"),
        currency: string_field(raw, "currency"),
        duration_days: numeric_field(raw, "duration_days"),
        transport_type: string_field(raw, "transport_type")
            .and_then(|v| v.parse::<TransportType>().ok()),
        travel_month: string_field(raw, "travel_month").and_then(|v| v.parse::<TravelMonth>().ok()),
        season: string_field(raw, "season").and_then(|v| v.parse::<Season>().ok()),
        family_friendly: raw.get("family_friendly").and_then(|v| v.as_bool()),
        amenities: raw
            .get("amenities")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        subcategory: string_field(raw, "subcategory"),
        confidence_score: raw
            .get("confidence_score")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32,
    };
    metadata.normalize();
    metadata
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn numeric_field(raw: &Value, key: &str) -> Option<u32> {
    let value = raw.get(key)?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    if let Some(f) = value.as_f64() {
        if f >= 0.0 {
            return Some(f.round() as u32);
        }
    }
    value.as_str().and_then(|s| s.trim().parse::<u32>().ok())
}

/// Deterministic overrides, applied regardless of model output.
///
/// The filename heuristic resolves the frequency-bias failure where tokens
/// like "hotel" dominate the text of what is actually a packaged tour for
/// a known destination.
fn apply_overrides(metadata: &mut EnrichedMetadata, chunk_text: &str, filename: &str) {
    let weak_destination =
        metadata.destination.is_none() || metadata.confidence_score < WEAK_CONFIDENCE;
    if weak_destination {
        if let Some(destination) = gazetteer::destination_from_filename(filename) {
            metadata.destination = Some(destination);
        }
    }

    let text_lower = chunk_text.to_lowercase();
    if text_lower.contains("aranžman") || text_lower.contains("aranzman") {
        metadata.category = Some(Category::Tour);
    } else if text_lower.contains("jelovnik")
        || text_lower.contains("meni ")
        || text_lower.contains("menu")
    {
        metadata.category = Some(Category::Restaurant);
    }
}
