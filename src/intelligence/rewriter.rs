use std::sync::OnceLock;

use regex::Regex;

use crate::llm::{prompts, CompletionOptions, LlmProvider};
use crate::models::{
    PriceRange, RewrittenQuery, SessionContext, StructuredFilters, TravelMonth,
};

use super::gazetteer;

/// Transforms an incomplete or pronoun-bearing user message into a
/// self-contained query using session state, without changing its intent.
///
/// Fails closed: any LLM error degrades to a heuristic completion, and in
/// the worst case the original message passes through with the implicit
/// filters already derived from the active view.
#[derive(Clone)]
pub struct ContextRewriter {
    llm: LlmProvider,
}

impl ContextRewriter {
    pub fn new(llm: LlmProvider) -> Self {
        Self { llm }
    }

    pub async fn rewrite(&self, query: &str, session: &SessionContext) -> RewrittenQuery {
        let lower = query.to_lowercase();

        let mut implicit_filters = filters_from_active_view(session);

        // A new destination in the message displaces the inherited one but
        // keeps sticky context (budget, dates, group).
        let mentioned_destination = gazetteer::canonical_destination(&lower);
        let context_switch_detected = match (&mentioned_destination, session.active_destination()) {
            (Some(new), Some(active)) => !new.eq_ignore_ascii_case(&active),
            _ => false,
        };
        if context_switch_detected {
            implicit_filters.destination = None;
        }

        let text = if needs_context(&lower) && mentioned_destination.is_none() {
            self.enhance(query, session).await
        } else {
            query.to_string()
        };

        RewrittenQuery {
            text,
            implicit_filters,
            context_switch_detected,
        }
    }

    async fn enhance(&self, query: &str, session: &SessionContext) -> String {
        if self.llm.is_available() {
            match self.enhance_with_llm(query, session).await {
                Some(enhanced) => return enhanced,
                None => {
                    tracing::debug!("LLM rewrite unusable, falling back to heuristic completion");
                }
            }
        }

        heuristic_enhancement(query, session)
    }

    async fn enhance_with_llm(&self, query: &str, session: &SessionContext) -> Option<String> {
        let recent_block = if session.recent_messages.is_empty() {
            "(nema prethodnih poruka)".to_string()
        } else {
            session
                .recent_messages
                .iter()
                .map(|m| {
                    let role = match m.role {
                        crate::models::MessageRole::User => "Korisnik",
                        crate::models::MessageRole::Assistant => "AI asistent",
                    };
                    if m.sources.is_empty() {
                        format!("{role}: {}", m.content)
                    } else {
                        format!("{role}: {} [izvori: {}]", m.content, m.sources.join(", "))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let entities_block = if session.active_entities.is_empty() {
            "(prazno)".to_string()
        } else {
            serde_json::to_string(&session.active_entities).ok()?
        };

        let prompt = prompts::rewrite_prompt(query, &recent_block, &entities_block);
        let options = CompletionOptions {
            temperature: Some(0.2),
            max_tokens: Some(300),
            ..Default::default()
        };

        match self
            .llm
            .complete_with_system(prompts::rewrite_system_prompt(), &prompt, Some(&options))
            .await
        {
            Ok(enhanced) => {
                let enhanced = enhanced.trim().trim_matches('"').to_string();
                // Reject degenerate or runaway rewrites
                if enhanced.is_empty() || enhanced.chars().count() > query.chars().count() * 4 + 80 {
                    return None;
                }
                tracing::debug!(original = %query, rewritten = %enhanced, "Query rewritten");
                Some(enhanced)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Context rewrite failed, falling through");
                None
            }
        }
    }
}

fn pronoun_regexes() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\b(to|taj|ta|ono|on|ona|oni|one)\b",
            r"^(koliko|kako|zašto|zasto|gde)\b",
            r"\b(košta|kosta|ima|postoji)\s*\?*$",
            r"\b(tu|tamo|ovde|isto)\b",
            r"\b(takođe|takodje|slično|slicno)\b",
            r"\b(a što|a šta|a sta|a kako)\b",
            r"\b(prošli put|prosli put|ranije|spomenuo)\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid context pattern"))
        .collect()
    })
}

/// Does the message carry unresolved references that session context can fill?
fn needs_context(lower: &str) -> bool {
    pronoun_regexes().iter().any(|r| r.is_match(lower))
}

/// Non-LLM completion: elided noun phrases filled from the active view and
/// pronouns bound to the most recently cited source.
fn heuristic_enhancement(query: &str, session: &SessionContext) -> String {
    let lower = query.to_lowercase();
    let mut enhanced = query.trim_end_matches(['?', ' ']).to_string();
    let had_question_mark = query.trim_end().ends_with('?');

    if let Some(destination) = session.active_destination() {
        if !lower.contains(&destination.to_lowercase()) {
            enhanced = format!("{enhanced} u {destination}");
        }
    }

    // Bind "taj hotel" / bare price questions to the last cited offer.
    if let Some(source) = session.last_cited_sources().first() {
        let stem = source
            .trim_end_matches(".pdf")
            .trim_end_matches(".PDF")
            .replace('_', " ");
        if !enhanced.to_lowercase().contains(&stem.to_lowercase()) {
            enhanced = format!("{enhanced} ({stem})");
        }
    }

    if let Some(budget) = session.active_entities.get("budget").and_then(|v| v.as_u64()) {
        if lower.contains("košta") || lower.contains("kosta") || lower.contains("cena") {
            enhanced = format!("{enhanced} (budžet do {budget} EUR)");
        }
    }

    if had_question_mark {
        enhanced.push('?');
    }
    enhanced
}

/// Every active-view entry whose kind maps to a filter field becomes a
/// context-derived implicit filter.
pub fn filters_from_active_view(session: &SessionContext) -> StructuredFilters {
    let view = &session.active_entities;
    let mut filters = StructuredFilters::default();

    filters.destination = view
        .get("destination")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    if let Some(budget) = view.get("budget").and_then(|v| v.as_u64()) {
        filters.price_max = Some(budget as u32);
        filters.price_range = Some(PriceRange::from_amount(budget as u32));
    }

    filters.travel_month = view
        .get("travel_dates")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<TravelMonth>().ok());

    filters.group_size = view
        .get("group_composition")
        .and_then(|v| v.as_u64())
        .map(|n| n as u32);

    if view
        .get("preference")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s == "family_friendly")
    {
        filters.family_friendly = Some(true);
    }

    filters
}
