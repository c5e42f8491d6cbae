use crate::error::Result;
use crate::llm::{prompts, CompletionOptions, LlmProvider, TokenStream};
use crate::models::{
    Answer, Category, ScoredChunk, SourceCitation, StructuredFilters,
};

const APOLOGY: &str =
    "Izvinjavam se, došlo je do greške pri generisanju odgovora. Molimo pokušajte ponovo.";

const NO_RESULTS_FALLBACK: &str =
    "Nažalost, trenutno nemam informacije koje odgovaraju vašem upitu. \
     Pokušajte sa drugom destinacijom, terminom ili budžetom.";

const SNIPPET_LEN: usize = 300;
const CONTEXT_LEN: usize = 400;

/// Prompts the model into a grounded Serbian answer over the retrieved
/// chunks and assembles citations, follow-up suggestions and confidence.
///
/// The user always gets a valid answer, a truthful "no information" answer,
/// or a graceful apology. Raw errors never surface.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    llm: LlmProvider,
}

impl AnswerSynthesizer {
    pub fn new(llm: LlmProvider) -> Self {
        Self { llm }
    }

    /// Batch mode: a fully-assembled [`Answer`].
    pub async fn synthesize(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
        filters: &StructuredFilters,
    ) -> Answer {
        if chunks.is_empty() {
            return self.no_results_answer(query, filters).await;
        }

        let response = if self.llm.is_available() {
            match self.generate(query, chunks, filters).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, "Answer generation failed");
                    return apology_answer(filters);
                }
            }
        } else {
            template_response(chunks)
        };

        self.finalize(response, chunks, filters)
    }

    /// Streaming mode: the raw token stream. The caller accumulates the
    /// text and closes the exchange with [`AnswerSynthesizer::finalize`].
    pub async fn stream(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
        filters: &StructuredFilters,
    ) -> Result<TokenStream> {
        let prompt = if chunks.is_empty() {
            prompts::no_results_prompt(query)
        } else {
            prompts::answer_prompt(
                query,
                &filters_summary(filters),
                &results_block(chunks),
            )
        };

        self.llm
            .complete_stream(
                prompts::answer_system_prompt(),
                &prompt,
                Some(&answer_options()),
            )
            .await
    }

    /// Attach citations, follow-ups and confidence to a finished response
    /// text.
    pub fn finalize(
        &self,
        response: String,
        chunks: &[ScoredChunk],
        filters: &StructuredFilters,
    ) -> Answer {
        let sources = citations(chunks);
        let confidence = answer_confidence(chunks);
        let suggested_questions = suggested_questions(chunks);

        Answer {
            response,
            sources,
            suggested_questions,
            filters: filters.clone(),
            confidence,
        }
    }

    /// Shell of the empty-result answer around already-generated text:
    /// empty citations, zero confidence, loosening follow-ups.
    pub fn no_results_shell(&self, response: String, filters: &StructuredFilters) -> Answer {
        Answer {
            response,
            sources: Vec::new(),
            suggested_questions: loosening_suggestions(filters),
            filters: filters.clone(),
            confidence: 0.0,
        }
    }

    /// The truthful empty-result answer: no invented offers, confidence 0,
    /// follow-ups that propose loosening constraints.
    pub async fn no_results_answer(&self, query: &str, filters: &StructuredFilters) -> Answer {
        let response = if self.llm.is_available() {
            match self
                .llm
                .complete_with_system(
                    prompts::answer_system_prompt(),
                    &prompts::no_results_prompt(query),
                    Some(&answer_options()),
                )
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "No-results generation failed, using fallback text");
                    NO_RESULTS_FALLBACK.to_string()
                }
            }
        } else {
            NO_RESULTS_FALLBACK.to_string()
        };

        Answer {
            response,
            sources: Vec::new(),
            suggested_questions: loosening_suggestions(filters),
            filters: filters.clone(),
            confidence: 0.0,
        }
    }

    async fn generate(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
        filters: &StructuredFilters,
    ) -> Result<String> {
        let prompt = prompts::answer_prompt(
            query,
            &filters_summary(filters),
            &results_block(chunks),
        );

        self.llm
            .complete_with_system(
                prompts::answer_system_prompt(),
                &prompt,
                Some(&answer_options()),
            )
            .await
    }
}

fn answer_options() -> CompletionOptions {
    CompletionOptions {
        temperature: Some(0.7),
        max_tokens: Some(800),
        ..Default::default()
    }
}

pub fn apology_answer(filters: &StructuredFilters) -> Answer {
    Answer {
        response: APOLOGY.to_string(),
        sources: Vec::new(),
        suggested_questions: vec!["Možete li precizirati svoju pretragu?".to_string()],
        filters: filters.clone(),
        confidence: 0.0,
    }
}

/// Labeled context blocks handed to the model; document names ride along so
/// the answer can reference its sources.
fn results_block(chunks: &[ScoredChunk]) -> String {
    let mut parts = Vec::new();

    for (i, chunk) in chunks.iter().enumerate() {
        let content: String = chunk.text.chars().take(CONTEXT_LEN).collect();
        parts.push(format!(
            "REZULTAT {}: {} (relevantnost: {:.0}%)",
            i + 1,
            chunk.source_file,
            chunk.adjusted_score * 100.0
        ));
        parts.push(content);
        parts.push("---".to_string());
    }

    parts.join("\n")
}

fn filters_summary(filters: &StructuredFilters) -> String {
    let mut parts = Vec::new();

    if let Some(destination) = &filters.destination {
        parts.push(format!("destinacija: {destination}"));
    }
    if let Some(category) = filters.category {
        parts.push(format!("kategorija: {category}"));
    }
    if let Some(price_max) = filters.price_max {
        parts.push(format!("cena do: {price_max} EUR"));
    } else if let Some(price_range) = filters.price_range {
        parts.push(format!("cenovni rang: {price_range}"));
    }
    if let Some(month) = filters.travel_month {
        parts.push(format!("mesec: {month}"));
    } else if let Some(season) = filters.season {
        parts.push(format!("sezona: {season}"));
    }
    if let Some(group_size) = filters.group_size {
        parts.push(format!("grupa: {group_size} osoba"));
    }
    if filters.family_friendly == Some(true) {
        parts.push("porodično".to_string());
    }
    if let Some(duration) = filters.duration_days {
        parts.push(format!("trajanje: {duration} dana"));
    }

    if parts.is_empty() {
        "bez dodatnih filtera".to_string()
    } else {
        parts.join(", ")
    }
}

/// Non-LLM fallback: enumerate the top hits so the user still gets a
/// grounded, useful reply.
fn template_response(chunks: &[ScoredChunk]) -> String {
    let mut parts = vec!["Na osnovu vaše pretrage pronašao sam sledeće opcije:".to_string()];

    for (i, chunk) in chunks.iter().take(3).enumerate() {
        let preview: String = chunk.text.chars().take(200).collect();
        parts.push(format!(
            "{}. {} (relevantnost: {:.0}%)\n   {preview}...",
            i + 1,
            chunk.source_file,
            chunk.adjusted_score * 100.0
        ));
    }

    parts.join("\n\n")
}

/// Citations deduplicate by document name, preserving first-occurrence
/// order; every citation corresponds to a retrieved top-K chunk.
fn citations(chunks: &[ScoredChunk]) -> Vec<SourceCitation> {
    let mut seen: Vec<String> = Vec::new();
    let mut result = Vec::new();

    for chunk in chunks {
        if seen.iter().any(|name| name == &chunk.source_file) {
            continue;
        }
        seen.push(chunk.source_file.clone());
        result.push(SourceCitation {
            document_name: chunk.source_file.clone(),
            similarity: chunk.adjusted_score,
            snippet: chunk.text.chars().take(SNIPPET_LEN).collect(),
            page: chunk.page,
        });
    }

    result
}

fn answer_confidence(chunks: &[ScoredChunk]) -> f32 {
    if chunks.is_empty() {
        return 0.0;
    }
    let sum: f32 = chunks.iter().map(|c| c.adjusted_score).sum();
    (sum / chunks.len() as f32).clamp(0.0, 1.0)
}

const HOTEL_SUGGESTIONS: &[&str] = &[
    "Kakve su dodatne usluge u hotelu?",
    "Da li hotel ima spa ili wellness centar?",
    "Da li je hotel pogodan za porodice sa decom?",
];

const TOUR_SUGGESTIONS: &[&str] = &[
    "Šta je uključeno u cenu aranžmana?",
    "Kakav je prevoz predviđen?",
    "Koliko dana traje putovanje?",
];

const RESTAURANT_SUGGESTIONS: &[&str] = &[
    "Kakva je kuhinja u restoranu?",
    "Da li je potrebna rezervacija?",
    "Da li imaju vegetarijanske opcije?",
];

const GENERIC_SUGGESTIONS: &[&str] = &[
    "Možete li mi dati više detalja o cenama?",
    "Da li postoje alternativne opcije?",
    "Kako mogu da rezervišem?",
];

/// 2-4 contextual follow-up questions keyed off the categories of the top
/// hits, topped up with generic ones.
fn suggested_questions(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut suggestions: Vec<String> = Vec::new();

    for chunk in chunks.iter().take(3) {
        let category_pool = match chunk.metadata.category {
            Some(Category::Hotel) => HOTEL_SUGGESTIONS,
            Some(Category::Tour) => TOUR_SUGGESTIONS,
            Some(Category::Restaurant) => RESTAURANT_SUGGESTIONS,
            _ => continue,
        };
        for suggestion in category_pool.iter().take(2) {
            if suggestions.len() < 4 && !suggestions.iter().any(|s| s == suggestion) {
                suggestions.push(suggestion.to_string());
            }
        }
    }

    for suggestion in GENERIC_SUGGESTIONS {
        if suggestions.len() >= 2 {
            break;
        }
        suggestions.push(suggestion.to_string());
    }

    suggestions.truncate(4);
    suggestions
}

/// Follow-ups for the empty result: propose loosening whatever was
/// constrained.
fn loosening_suggestions(filters: &StructuredFilters) -> Vec<String> {
    let mut suggestions = Vec::new();

    if filters.destination.is_some() {
        suggestions.push("Da li vas zanima neka druga destinacija?".to_string());
    }
    if filters.price_max.is_some() || filters.price_range.is_some() {
        suggestions.push("Možemo li probati sa većim budžetom?".to_string());
    }
    if filters.travel_month.is_some() || filters.season.is_some() {
        suggestions.push("Da li je moguć drugi termin putovanja?".to_string());
    }
    if suggestions.len() < 2 {
        suggestions.push("Možete li precizirati svoju pretragu?".to_string());
    }

    suggestions.truncate(4);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrichedMetadata, TravelMonth};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::LlmConfig;

    fn scored_chunk(id: &str, file: &str, score: f32, category: Option<Category>) -> ScoredChunk {
        ScoredChunk {
            chunk_id: id.to_string(),
            source_file: file.to_string(),
            page: Some(1),
            text: format!("Sadržaj ponude iz {file}."),
            metadata: EnrichedMetadata {
                category,
                ..Default::default()
            },
            similarity: score,
            adjusted_score: score,
            penalties: Vec::new(),
        }
    }

    fn llm_response(content: &str) -> serde_json::Value {
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

    fn test_llm(base_url: String) -> LlmProvider {
        LlmProvider::new(Some(&LlmConfig {
            model: "openai/gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some(base_url),
            timeout_secs: 5,
            max_retries: 0,
        }))
    }

    #[test]
    fn test_citations_dedupe_by_document_preserving_order() {
        let chunks = vec![
            scored_chunk("c1", "amsterdam.pdf", 0.8, None),
            scored_chunk("c2", "rim.pdf", 0.7, None),
            scored_chunk("c3", "amsterdam.pdf", 0.6, None),
        ];

        let result = citations(&chunks);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].document_name, "amsterdam.pdf");
        assert_eq!(result[1].document_name, "rim.pdf");
    }

    #[test]
    fn test_confidence_is_mean_of_adjusted_scores() {
        let chunks = vec![
            scored_chunk("c1", "a.pdf", 0.8, None),
            scored_chunk("c2", "b.pdf", 0.4, None),
        ];
        assert!((answer_confidence(&chunks) - 0.6).abs() < 1e-6);
        assert_eq!(answer_confidence(&[]), 0.0);
    }

    #[test]
    fn test_suggestions_follow_top_categories() {
        let chunks = vec![scored_chunk("c1", "a.pdf", 0.8, Some(Category::Tour))];
        let suggestions = suggested_questions(&chunks);

        assert!(suggestions.len() >= 2 && suggestions.len() <= 4);
        assert!(suggestions.iter().any(|s| s.contains("aranžmana")));
    }

    #[test]
    fn test_suggestions_fall_back_to_generic() {
        let chunks = vec![scored_chunk("c1", "a.pdf", 0.8, None)];
        let suggestions = suggested_questions(&chunks);
        assert!(suggestions.len() >= 2);
    }

    #[test]
    fn test_loosening_suggestions_target_set_filters() {
        let filters = StructuredFilters {
            destination: Some("Antarktik".into()),
            travel_month: Some(TravelMonth::January),
            ..Default::default()
        };
        let suggestions = loosening_suggestions(&filters);

        assert!(suggestions.iter().any(|s| s.contains("destinacija")));
        assert!(suggestions.iter().any(|s| s.contains("termin")));
    }

    #[test]
    fn test_filters_summary_formats_serbian() {
        let filters = StructuredFilters {
            destination: Some("Amsterdam".into()),
            price_max: Some(500),
            travel_month: Some(TravelMonth::May),
            ..Default::default()
        };
        let summary = filters_summary(&filters);

        assert!(summary.contains("destinacija: Amsterdam"));
        assert!(summary.contains("cena do: 500 EUR"));
        assert!(summary.contains("mesec: may"));

        assert_eq!(
            filters_summary(&StructuredFilters::default()),
            "bez dodatnih filtera"
        );
    }

    #[tokio::test]
    async fn test_synthesize_with_llm_returns_grounded_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(llm_response(
                "Prema aranžmanu amsterdam.pdf, cena je 450 EUR u maju.",
            )))
            .mount(&server)
            .await;

        let synthesizer = AnswerSynthesizer::new(test_llm(server.uri()));
        let chunks = vec![scored_chunk("c1", "amsterdam.pdf", 0.8, Some(Category::Tour))];
        let answer = synthesizer
            .synthesize("Aranžman za Amsterdam u maju?", &chunks, &StructuredFilters::default())
            .await;

        assert!(answer.response.contains("amsterdam.pdf"));
        assert_eq!(answer.sources.len(), 1);
        assert!((answer.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_results_answer_is_truthful() {
        let synthesizer = AnswerSynthesizer::new(LlmProvider::unavailable("test"));
        let filters = StructuredFilters {
            destination: Some("Antarktik".into()),
            ..Default::default()
        };

        let answer = synthesizer
            .no_results_answer("izlet u Antarktik u januaru", &filters)
            .await;

        assert!(answer.sources.is_empty());
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.response.contains("nemam informacije"));
        assert!(!answer.suggested_questions.is_empty());
    }

    #[tokio::test]
    async fn test_llm_error_yields_apology_not_raw_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let synthesizer = AnswerSynthesizer::new(test_llm(server.uri()));
        let chunks = vec![scored_chunk("c1", "a.pdf", 0.8, None)];
        let answer = synthesizer
            .synthesize("pitanje", &chunks, &StructuredFilters::default())
            .await;

        assert_eq!(answer.response, APOLOGY);
        assert!(answer.sources.is_empty());
        assert_eq!(answer.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_unavailable_llm_uses_template_response() {
        let synthesizer = AnswerSynthesizer::new(LlmProvider::unavailable("test"));
        let chunks = vec![
            scored_chunk("c1", "rim.pdf", 0.9, Some(Category::Hotel)),
            scored_chunk("c2", "pariz.pdf", 0.5, None),
        ];

        let answer = synthesizer
            .synthesize("hotel u Rimu", &chunks, &StructuredFilters::default())
            .await;

        assert!(answer.response.contains("rim.pdf"));
        assert_eq!(answer.sources.len(), 2);
        assert!(answer.confidence > 0.0);
    }
}
