use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::Result;
use crate::llm::{prompts, LlmProvider};
use crate::models::{EntityKind, ExtractedEntity};

use super::gazetteer;

/// Shape the LLM is asked to return for the second extraction stage.
#[derive(Debug, Clone, serde::Deserialize)]
struct LlmEntity {
    kind: String,
    value: Value,
    #[serde(default)]
    confidence: f32,
}

/// Two-stage tourism entity extraction over a single user message.
///
/// Rules run first and are exact on the input; the LLM pass only fills in
/// kinds the rules missed and is forbidden from inventing values.
#[derive(Clone)]
pub struct EntityExtractor {
    llm: LlmProvider,
}

impl EntityExtractor {
    pub fn new(llm: LlmProvider) -> Self {
        Self { llm }
    }

    /// Extract entities. Never fails hard: an LLM error degrades to the
    /// rule-based result alone.
    pub async fn extract(
        &self,
        message: &str,
        active_view: &HashMap<String, Value>,
    ) -> Result<Vec<ExtractedEntity>> {
        let mut entities = rule_based_entities(message);

        if self.llm.is_available() {
            let covered: Vec<EntityKind> = entities.iter().map(|e| e.kind).collect();
            match self.llm_entities(message, active_view).await {
                Ok(llm_entities) => {
                    for entity in llm_entities {
                        if !covered.contains(&entity.kind) {
                            entities.push(entity);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "LLM entity extraction failed, using rules only");
                }
            }
        }

        tracing::debug!(count = entities.len(), "Extracted entities");
        Ok(entities)
    }

    async fn llm_entities(
        &self,
        message: &str,
        active_view: &HashMap<String, Value>,
    ) -> Result<Vec<ExtractedEntity>> {
        let hint_block = if active_view.is_empty() {
            "(prazno)".to_string()
        } else {
            serde_json::to_string(active_view).unwrap_or_else(|_| "(prazno)".to_string())
        };

        let prompt = prompts::entity_extraction_prompt(message, &hint_block);
        let raw: Vec<LlmEntity> = self.llm.complete_structured(&prompt).await?;

        Ok(raw
            .into_iter()
            .filter_map(|entity| {
                let kind = entity.kind.parse::<EntityKind>().ok()?;
                Some(ExtractedEntity {
                    kind,
                    value: entity.value,
                    confidence: entity.confidence.clamp(0.0, 1.0),
                })
            })
            .collect())
    }
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

fn group_regexes() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"za\s+(\d+)\s+osob", r"(\d+)\s+osob", r"(\d+)\s+član", r"(\d+)\s+ljudi"]
            .iter()
            .map(|p| Regex::new(p).expect("invalid group pattern"))
            .collect()
    })
}

fn duration_regexes() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"(\d+)\s+dan", r"(\d+)\s+noć", r"(\d+)\s+noc"]
            .iter()
            .map(|p| Regex::new(p).expect("invalid duration pattern"))
            .collect()
    })
}

fn first_number(regexes: &[Regex], text: &str) -> Option<u32> {
    for regex in regexes {
        if let Some(captures) = regex.captures(text) {
            if let Ok(value) = captures[1].parse::<u32>() {
                return Some(value);
            }
        }
    }
    None
}

/// Fast rule-based extraction: gazetteer lookups plus amount patterns.
fn rule_based_entities(message: &str) -> Vec<ExtractedEntity> {
    let lower = message.to_lowercase();
    let mut entities = Vec::new();

    if let Some(destination) = gazetteer::canonical_destination(&lower) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Destination,
            value: json!(destination),
            confidence: 0.9,
        });
    }

    if let Some(amount) = first_number(price_regexes(), &lower) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Budget,
            value: json!(amount),
            confidence: 0.9,
        });
    }

    if let Some(month) = gazetteer::month_from_text(&lower) {
        entities.push(ExtractedEntity {
            kind: EntityKind::TravelDates,
            value: json!(month.to_string()),
            confidence: 0.9,
        });
    }

    if let Some(group) = first_number(group_regexes(), &lower) {
        entities.push(ExtractedEntity {
            kind: EntityKind::GroupComposition,
            value: json!(group),
            confidence: 0.85,
        });
    }

    if let Some(duration) = first_number(duration_regexes(), &lower) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Activities,
            value: json!({ "duration_days": duration }),
            confidence: 0.8,
        });
    }

    if let Some(transport) = gazetteer::transport_from_text(&lower) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Transport,
            value: json!(transport.to_string()),
            confidence: 0.85,
        });
    }

    if lower.contains("hotel")
        || lower.contains("smeštaj")
        || lower.contains("smestaj")
        || lower.contains("apartman")
    {
        entities.push(ExtractedEntity {
            kind: EntityKind::Accommodation,
            value: json!("hotel"),
            confidence: 0.8,
        });
    }

    if gazetteer::family_friendly_mentioned(&lower) {
        entities.push(ExtractedEntity {
            kind: EntityKind::Preference,
            value: json!("family_friendly"),
            confidence: 0.8,
        });
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::LlmConfig;

    fn llm_response(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [
                {
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
        })
    }

    fn test_llm(base_url: String) -> LlmProvider {
        LlmProvider::new(Some(&LlmConfig {
            model: "openai/gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some(base_url),
            timeout_secs: 5,
            max_retries: 0,
        }))
    }

    fn find_kind(entities: &[ExtractedEntity], kind: EntityKind) -> Option<&ExtractedEntity> {
        entities.iter().find(|e| e.kind == kind)
    }

    #[test]
    fn test_rules_extract_destination_budget_and_month() {
        let entities =
            rule_based_entities("Daj mi neki aranžman za Amsterdam u maju, budžet oko 500 EUR.");

        assert_eq!(
            find_kind(&entities, EntityKind::Destination).unwrap().value,
            json!("Amsterdam")
        );
        assert_eq!(
            find_kind(&entities, EntityKind::Budget).unwrap().value,
            json!(500)
        );
        assert_eq!(
            find_kind(&entities, EntityKind::TravelDates).unwrap().value,
            json!("may")
        );
    }

    #[test]
    fn test_rules_extract_group_size() {
        let entities = rule_based_entities("letovanje za 4 osobe");
        assert_eq!(
            find_kind(&entities, EntityKind::GroupComposition).unwrap().value,
            json!(4)
        );
    }

    #[test]
    fn test_rules_extract_price_with_do_form() {
        let entities = rule_based_entities("hotel do 200 eur");
        assert_eq!(
            find_kind(&entities, EntityKind::Budget).unwrap().value,
            json!(200)
        );
    }

    #[tokio::test]
    async fn test_extract_degrades_to_rules_when_llm_unavailable() {
        let extractor = EntityExtractor::new(LlmProvider::unavailable("test"));
        let entities = extractor
            .extract("Tražim hotel u Rimu", &HashMap::new())
            .await
            .unwrap();

        assert!(find_kind(&entities, EntityKind::Destination).is_some());
        assert!(find_kind(&entities, EntityKind::Accommodation).is_some());
    }

    #[tokio::test]
    async fn test_rules_win_over_llm_for_same_kind() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(llm_response(
                r#"[{"kind": "destination", "value": "Pariz", "confidence": 0.9},
                    {"kind": "activities", "value": "razgledanje", "confidence": 0.7}]"#,
            )))
            .mount(&server)
            .await;

        let extractor = EntityExtractor::new(test_llm(server.uri()));
        let entities = extractor
            .extract("Tražim hotel u Rimu", &HashMap::new())
            .await
            .unwrap();

        // Rules said Rim; the LLM's Pariz for the same kind is discarded.
        assert_eq!(
            find_kind(&entities, EntityKind::Destination).unwrap().value,
            json!("Rim")
        );
        // But the LLM's novel kind is kept.
        assert!(find_kind(&entities, EntityKind::Activities).is_some());
    }

    #[tokio::test]
    async fn test_llm_unknown_kinds_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(llm_response(
                r#"[{"kind": "spaceship", "value": "Enterprise", "confidence": 0.9}]"#,
            )))
            .mount(&server)
            .await;

        let extractor = EntityExtractor::new(test_llm(server.uri()));
        let entities = extractor.extract("nešto nejasno", &HashMap::new()).await.unwrap();
        assert!(entities.is_empty());
    }
}
