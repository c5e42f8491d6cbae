use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::db::{VectorMatch, VectorStore};
use crate::error::Result;
use crate::models::{
    AppliedPenalty, HardFilter, HardFilterField, PenaltyKind, ScoredChunk, StructuredFilters,
};

/// Drives the vector store with a single priority-selected equality filter
/// and applies the remaining filters as weighted soft penalties after
/// retrieval.
///
/// Weights reflect business priority: destination (hard) > price > month >
/// duration > category.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    top_k: usize,
    overfetch_factor: usize,
    fallback_threshold: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            top_k: config.top_k.max(1),
            overfetch_factor: config.overfetch_factor.max(1),
            fallback_threshold: config.fallback_threshold,
        }
    }

    pub async fn retrieve(
        &self,
        embedding: &[f32],
        filters: &StructuredFilters,
    ) -> Result<Vec<ScoredChunk>> {
        let hard_filter = select_hard_filter(filters);
        let overfetch = (self.top_k * self.overfetch_factor) as u32;

        let matches = self
            .store
            .query(embedding, hard_filter.as_ref(), overfetch)
            .await?;

        // Sparse metadata on a legitimate match must not produce an empty
        // answer: drop the hard filter and let penalties do the ranking.
        let (matches, fallback_mode) =
            if hard_filter.is_some() && matches.len() < self.fallback_threshold {
                tracing::debug!(
                    found = matches.len(),
                    threshold = self.fallback_threshold,
                    "Hard-filtered search too narrow, retrying unfiltered"
                );
                (self.store.query(embedding, None, overfetch).await?, true)
            } else {
                (matches, false)
            };

        let hard_field = if fallback_mode {
            None
        } else {
            hard_filter.as_ref().map(|f| f.field)
        };

        let mut scored: Vec<ScoredChunk> = matches
            .into_iter()
            .map(|candidate| score_candidate(candidate, filters, hard_field))
            .collect();

        scored.sort_by(|a, b| {
            b.adjusted_score
                .partial_cmp(&a.adjusted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.top_k);

        tracing::debug!(
            results = scored.len(),
            fallback_mode,
            hard_filter = ?hard_filter,
            "Retrieval complete"
        );
        Ok(scored)
    }
}

/// Fixed priority order for the single equality predicate the store
/// accepts: destination, then travel_month, then category, then
/// price_range. Everything else is always soft.
pub fn select_hard_filter(filters: &StructuredFilters) -> Option<HardFilter> {
    if let Some(destination) = &filters.destination {
        return Some(HardFilter {
            field: HardFilterField::Destination,
            value: destination.clone(),
        });
    }
    if let Some(month) = filters.travel_month {
        return Some(HardFilter {
            field: HardFilterField::TravelMonth,
            value: month.to_string(),
        });
    }
    if let Some(category) = filters.category {
        return Some(HardFilter {
            field: HardFilterField::Category,
            value: category.to_string(),
        });
    }
    if let Some(price_range) = filters.price_range {
        return Some(HardFilter {
            field: HardFilterField::PriceRange,
            value: price_range.to_string(),
        });
    }
    None
}

/// Distance-to-similarity conversion. `1/(1+x)` stays in (0, 1] for any
/// non-negative distance, unlike `1-x` which goes negative past 1.
fn to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

fn score_candidate(
    candidate: VectorMatch,
    filters: &StructuredFilters,
    hard_field: Option<HardFilterField>,
) -> ScoredChunk {
    let similarity = to_similarity(candidate.distance);
    let mut penalties: Vec<AppliedPenalty> = Vec::new();
    let metadata = &candidate.metadata;

    // Destination is only soft in fallback mode; with metadata equality it
    // would have been the hard filter.
    if hard_field != Some(HardFilterField::Destination) {
        if let (Some(wanted), Some(actual)) = (&filters.destination, &metadata.destination) {
            if !wanted.eq_ignore_ascii_case(actual) {
                penalties.push(AppliedPenalty {
                    kind: PenaltyKind::DestinationMismatch,
                    factor: 0.5,
                });
            }
        }
    }

    // Price ceiling: small overshoots absorbed at <= 20%, floor at half.
    if let (Some(price_max), Some(price_min)) = (filters.price_max, metadata.price_min) {
        if price_min > price_max && price_max > 0 {
            let overshoot_ratio = (price_min - price_max) as f32 / price_max as f32;
            let factor = (1.0 - 0.2 * overshoot_ratio).max(0.5);
            penalties.push(AppliedPenalty {
                kind: PenaltyKind::PriceOvershoot,
                factor,
            });
        }
    }

    if hard_field != Some(HardFilterField::TravelMonth) {
        if let (Some(wanted), Some(actual)) = (filters.travel_month, metadata.travel_month) {
            if wanted != actual {
                if wanted.is_adjacent(actual) {
                    penalties.push(AppliedPenalty {
                        kind: PenaltyKind::AdjacentMonth,
                        factor: 0.7,
                    });
                } else {
                    penalties.push(AppliedPenalty {
                        kind: PenaltyKind::DistantMonth,
                        factor: 0.4,
                    });
                }
            }
        }
    }

    if let (Some(wanted), Some(actual)) = (filters.duration_days, metadata.duration_days) {
        if wanted > 0 && wanted != actual {
            let ratio = (actual as f32 - wanted as f32).abs() / wanted as f32;
            let factor = 1.0 - ratio.min(0.5);
            penalties.push(AppliedPenalty {
                kind: PenaltyKind::DurationMismatch,
                factor,
            });
        }
    }

    if hard_field != Some(HardFilterField::Category) {
        if let (Some(wanted), Some(actual)) = (filters.category, metadata.category) {
            if wanted != actual {
                penalties.push(AppliedPenalty {
                    kind: PenaltyKind::CategoryMismatch,
                    factor: 0.7,
                });
            }
        }
    }

    if let (Some(wanted), Some(actual)) = (filters.family_friendly, metadata.family_friendly) {
        if wanted != actual {
            penalties.push(AppliedPenalty {
                kind: PenaltyKind::FamilyFriendlyConflict,
                factor: 0.6,
            });
        }
    }

    let adjusted_score = penalties
        .iter()
        .fold(similarity, |score, penalty| score * penalty.factor);

    ScoredChunk {
        chunk_id: candidate.chunk_id,
        source_file: candidate.source_file,
        page: candidate.page,
        text: candidate.text,
        metadata: candidate.metadata,
        similarity,
        adjusted_score,
        penalties,
    }
}
