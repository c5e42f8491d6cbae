use serde::{Deserialize, Serialize};

use super::{Category, EnrichedMetadata, PriceRange, Season, TransportType, TravelMonth, UserType};

/// Intent classification for a user utterance, detected by keyword patterns
/// before the LLM parse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    #[default]
    Search,
    Recommendation,
    Comparison,
    Information,
    Booking,
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Recommendation => write!(f, "recommendation"),
            Self::Comparison => write!(f, "comparison"),
            Self::Information => write!(f, "information"),
            Self::Booking => write!(f, "booking"),
        }
    }
}

/// Structured filters extracted from an utterance and its session context.
/// Each field is independently optional; absent means "no constraint".
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StructuredFilters {
    pub destination: Option<String>,
    pub category: Option<Category>,
    pub price_range: Option<PriceRange>,
    pub price_min: Option<u32>,
    pub price_max: Option<u32>,
    pub duration_days: Option<u32>,
    pub transport_type: Option<TransportType>,
    pub travel_month: Option<TravelMonth>,
    pub season: Option<Season>,
    pub family_friendly: Option<bool>,
    pub group_size: Option<u32>,
}

impl StructuredFilters {
    pub fn is_empty(&self) -> bool {
        self.destination.is_none()
            && self.category.is_none()
            && self.price_range.is_none()
            && self.price_min.is_none()
            && self.price_max.is_none()
            && self.duration_days.is_none()
            && self.transport_type.is_none()
            && self.travel_month.is_none()
            && self.season.is_none()
            && self.family_friendly.is_none()
            && self.group_size.is_none()
    }

    /// Fill absent fields from context-derived filters. Explicit values
    /// always win over inherited ones.
    pub fn inherit_from(&mut self, implicit: &StructuredFilters) {
        if self.destination.is_none() {
            self.destination = implicit.destination.clone();
        }
        if self.category.is_none() {
            self.category = implicit.category;
        }
        if self.price_range.is_none() {
            self.price_range = implicit.price_range;
        }
        if self.price_min.is_none() {
            self.price_min = implicit.price_min;
        }
        if self.price_max.is_none() {
            self.price_max = implicit.price_max;
        }
        if self.duration_days.is_none() {
            self.duration_days = implicit.duration_days;
        }
        if self.transport_type.is_none() {
            self.transport_type = implicit.transport_type;
        }
        if self.travel_month.is_none() {
            self.travel_month = implicit.travel_month;
        }
        if self.season.is_none() {
            self.season = implicit.season;
        }
        if self.family_friendly.is_none() {
            self.family_friendly = implicit.family_friendly;
        }
        if self.group_size.is_none() {
            self.group_size = implicit.group_size;
        }
    }
}

/// A user message rewritten into a self-contained query using session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewrittenQuery {
    pub text: String,
    pub implicit_filters: StructuredFilters,
    pub context_switch_detected: bool,
}

impl RewrittenQuery {
    /// Identity rewrite used when enhancement fails or is unnecessary.
    pub fn passthrough(text: &str) -> Self {
        Self {
            text: text.to_string(),
            implicit_filters: StructuredFilters::default(),
            context_switch_detected: false,
        }
    }
}

/// Output of the self-query parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub semantic_query: String,
    pub filters: StructuredFilters,
    pub intent: QueryIntent,
    pub confidence: f32,
}

/// The single equality predicate handed to the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardFilter {
    pub field: HardFilterField,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardFilterField {
    Destination,
    TravelMonth,
    Category,
    PriceRange,
}

impl HardFilterField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::TravelMonth => "travel_month",
            Self::Category => "category",
            Self::PriceRange => "price_range",
        }
    }
}

/// Which soft penalty fired on a candidate, with its multiplicative factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedPenalty {
    pub kind: PenaltyKind,
    pub factor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    PriceOvershoot,
    AdjacentMonth,
    DistantMonth,
    DurationMismatch,
    CategoryMismatch,
    FamilyFriendlyConflict,
    DestinationMismatch,
}

/// A retrieval candidate after similarity conversion and post-scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub source_file: String,
    pub page: Option<u32>,
    pub text: String,
    pub metadata: EnrichedMetadata,
    /// Raw similarity `1 / (1 + distance)`, always in (0, 1].
    pub similarity: f32,
    /// Similarity after multiplicative penalties.
    pub adjusted_score: f32,
    pub penalties: Vec<AppliedPenalty>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceCitation {
    pub document_name: String,
    pub similarity: f32,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// What the core returns for a batch query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<SourceCitation>,
    pub suggested_questions: Vec<String>,
    pub filters: StructuredFilters,
    pub confidence: f32,
}

/// Streaming surface: zero or more `Content` events terminated by exactly
/// one `Complete` or one `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerEvent {
    Content {
        chunk: String,
    },
    Complete {
        sources: Vec<SourceCitation>,
        suggested_questions: Vec<String>,
        confidence: f32,
        total_chunks: usize,
        response_length: usize,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub user_type: UserType,
    #[serde(default)]
    pub stream: bool,
}
