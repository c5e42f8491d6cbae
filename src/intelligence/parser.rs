use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::Result;
use crate::llm::{prompts, CompletionOptions, LlmProvider};
use crate::models::{
    Category, ParsedQuery, PriceRange, QueryIntent, RewrittenQuery, Season, StructuredFilters,
    TransportType, TravelMonth,
};

use super::gazetteer;

/// Parses a rewritten query into structured filters plus a semantic query
/// string. LLM-first with pattern enhancement over anything the model
/// missed; explicit filters override the context-derived implicit ones.
#[derive(Clone)]
pub struct SelfQueryParser {
    llm: LlmProvider,
}

impl SelfQueryParser {
    pub fn new(llm: LlmProvider) -> Self {
        Self { llm }
    }

    /// Never fails hard: an LLM failure degrades to pattern extraction with
    /// reduced confidence.
    pub async fn parse(&self, rewritten: &RewrittenQuery) -> Result<ParsedQuery> {
        let query = &rewritten.text;
        let intent = classify_intent(query);

        let (mut parsed, llm_ok) = if self.llm.is_available() {
            match self.parse_with_llm(query, intent).await {
                Ok(parsed) => (parsed, true),
                Err(e) => {
                    tracing::warn!(error = %e, "LLM query parsing failed, using patterns only");
                    (fallback_parse(query, intent), false)
                }
            }
        } else {
            (fallback_parse(query, intent), false)
        };

        enhance_with_patterns(query, &mut parsed.filters);
        normalize(&mut parsed.filters);

        if llm_ok {
            // Small boost: patterns corroborate or extend the LLM parse.
            parsed.confidence = (parsed.confidence + 0.1).min(1.0);
        }

        // Context inheritance: explicit wins, absent fields fall back to
        // what the conversation already established.
        parsed.filters.inherit_from(&rewritten.implicit_filters);
        normalize(&mut parsed.filters);

        tracing::debug!(
            intent = %parsed.intent,
            confidence = parsed.confidence,
            "Parsed query into structured filters"
        );
        Ok(parsed)
    }

    async fn parse_with_llm(&self, query: &str, intent: QueryIntent) -> Result<ParsedQuery> {
        let prompt = prompts::self_query_prompt(query, &intent.to_string());
        let options = CompletionOptions {
            temperature: Some(0.1),
            max_tokens: Some(500),
            ..Default::default()
        };

        let response = self.llm.complete_json(&prompt, Some(&options)).await?;

        let semantic_query = response
            .get("semantic_query")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(query)
            .to_string();

        let confidence = response
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.7) as f32;

        let filters = response
            .get("filters")
            .map(filters_from_json)
            .unwrap_or_default();

        Ok(ParsedQuery {
            semantic_query,
            filters,
            intent,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

fn fallback_parse(query: &str, intent: QueryIntent) -> ParsedQuery {
    ParsedQuery {
        semantic_query: query.to_string(),
        filters: StructuredFilters::default(),
        intent,
        confidence: 0.4,
    }
}

/// Lenient extraction from the LLM's filter object: models emit `null`,
/// the string "null", numbers as strings, and unknown enum members.
/// Anything unparseable maps to absent.
fn filters_from_json(raw: &Value) -> StructuredFilters {
    let mut filters = StructuredFilters::default();

    filters.destination = string_field(raw, "destination")
        .or_else(|| string_field(raw, "location"))
        .map(|v| gazetteer::canonicalize_destination_value(&v));
    filters.category = string_field(raw, "category").and_then(|v| v.parse::<Category>().ok());
    filters.price_range =
        string_field(raw, "price_range").and_then(|v| v.parse::<PriceRange>().ok());
    filters.price_max = numeric_field(raw, "price_max");
    filters.price_min = numeric_field(raw, "price_min");
    filters.group_size = numeric_field(raw, "group_size");
    filters.duration_days = numeric_field(raw, "duration_days");
    filters.family_friendly = raw.get("family_friendly").and_then(|v| v.as_bool());
    filters.travel_month =
        string_field(raw, "travel_month").and_then(|v| v.parse::<TravelMonth>().ok());
    filters.season = string_field(raw, "season").and_then(|v| v.parse::<Season>().ok());
    filters.transport_type =
        string_field(raw, "transport_type").and_then(|v| v.parse::<TransportType>().ok());

    filters
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
    value.as_str().and_then(|s| s.trim().parse::<u32>().ok())
}

fn price_regexes() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"do\s+(\d+)\s*(?:eur|evra|€)",
            r"oko\s+(\d+)\s*(?:eur|evra|€)",
            r"budž?z?et\s+(?:oko\s+)?(\d+)",
            r"(\d+)\s*(?:eur|evra|€)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid price pattern"))
        .collect()
    })
}

fn group_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\s+(?:osob|član|clan|ljudi)").unwrap())
}

fn duration_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)\s+(?:dan|noć|noc)").unwrap())
}

/// Keyword-based intent classification, checked before the LLM parse.
fn classify_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();

    const RECOMMENDATION: &[&str] = &["preporuči", "preporuci", "predloži", "predlozi", "najbolji"];
    const COMPARISON: &[&str] = &["uporedi", "razlika", "bolje", " vs ", " ili "];
    const BOOKING: &[&str] = &["rezerviši", "rezervisi", "bukiraj", "zakaži", "zakazi", "dostupno"];
    const INFORMATION: &[&str] = &["kakav", "koliko", "kada", "gde", "kako", "šta", "sta"];

    if RECOMMENDATION.iter().any(|k| lower.contains(k)) {
        QueryIntent::Recommendation
    } else if COMPARISON.iter().any(|k| lower.contains(k)) {
        QueryIntent::Comparison
    } else if BOOKING.iter().any(|k| lower.contains(k)) {
        QueryIntent::Booking
    } else if INFORMATION.iter().any(|k| lower.contains(k)) {
        QueryIntent::Information
    } else {
        QueryIntent::Search
    }
}

/// Pattern-based extraction for anything the LLM left absent. Rules are
/// exact on the input, so they also correct nothing the LLM set.
fn enhance_with_patterns(query: &str, filters: &mut StructuredFilters) {
    let lower = query.to_lowercase();

    if filters.destination.is_none() {
        filters.destination = gazetteer::canonical_destination(&lower);
    }

    if filters.price_max.is_none() {
        for regex in price_regexes() {
            if let Some(captures) = regex.captures(&lower) {
                if let Ok(price) = captures[1].parse::<u32>() {
                    filters.price_max = Some(price);
                    break;
                }
            }
        }
    }

    if filters.group_size.is_none() {
        if let Some(captures) = group_regex().captures(&lower) {
            filters.group_size = captures[1].parse::<u32>().ok();
        }
    }

    if filters.duration_days.is_none() {
        if let Some(captures) = duration_regex().captures(&lower) {
            filters.duration_days = captures[1].parse::<u32>().ok();
        }
    }

    if filters.family_friendly.is_none() && gazetteer::family_friendly_mentioned(&lower) {
        filters.family_friendly = Some(true);
    }

    // Specific month has priority over season
    if filters.travel_month.is_none() {
        filters.travel_month = gazetteer::month_from_text(&lower);
    }
    if filters.travel_month.is_none() && filters.season.is_none() {
        filters.season = gazetteer::season_from_text(&lower);
    }

    if filters.category.is_none() {
        filters.category = gazetteer::category_from_text(&lower);
    }

    if filters.transport_type.is_none() {
        filters.transport_type = gazetteer::transport_from_text(&lower);
    }
}

/// Cross-field invariants: price band from an explicit ceiling, ordered
/// price bounds.
fn normalize(filters: &mut StructuredFilters) {
    if let (Some(min), Some(max)) = (filters.price_min, filters.price_max) {
        if min > max {
            filters.price_min = Some(max);
            filters.price_max = Some(min);
        }
    }

    if filters.price_range.is_none() {
        if let Some(price_max) = filters.price_max {
            filters.price_range = Some(PriceRange::from_amount(price_max));
        }
    }
}
