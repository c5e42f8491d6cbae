use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    #[default]
    Client,
    Agent,
}

/// One message of a conversation turn, kept verbatim in the recent ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub entities: HashMap<String, Value>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Kinds of tourism entities tracked across a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Destination,
    Budget,
    TravelDates,
    GroupComposition,
    Accommodation,
    Transport,
    Activities,
    Preference,
}

impl EntityKind {
    /// Sticky kinds survive a context switch: the previous value is kept as
    /// a secondary rather than replaced.
    pub fn is_sticky(&self) -> bool {
        matches!(
            self,
            Self::Budget | Self::GroupComposition | Self::TravelDates
        )
    }

    /// Singleton kinds hold exactly one active value; a new value replaces
    /// the old one in the active view.
    pub fn is_singleton(&self) -> bool {
        matches!(self, Self::Destination)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Destination => write!(f, "destination"),
            Self::Budget => write!(f, "budget"),
            Self::TravelDates => write!(f, "travel_dates"),
            Self::GroupComposition => write!(f, "group_composition"),
            Self::Accommodation => write!(f, "accommodation"),
            Self::Transport => write!(f, "transport"),
            Self::Activities => write!(f, "activities"),
            Self::Preference => write!(f, "preference"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "destination" | "location" => Ok(Self::Destination),
            "budget" | "price_max" | "price" => Ok(Self::Budget),
            "travel_dates" | "travel_month" | "dates" => Ok(Self::TravelDates),
            "group_composition" | "group_size" => Ok(Self::GroupComposition),
            "accommodation" => Ok(Self::Accommodation),
            "transport" => Ok(Self::Transport),
            "activities" => Ok(Self::Activities),
            "preference" => Ok(Self::Preference),
            _ => Err(format!("Unknown entity kind: {s}")),
        }
    }
}

/// An entity extracted from a single user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    pub value: Value,
    pub confidence: f32,
}

/// Long-term record of an entity in the session's EntityMap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub kind: EntityKind,
    pub value: Value,
    pub confidence: f32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: u32,
    #[serde(default)]
    pub source_messages: Vec<String>,
    /// Values displaced from the active slot; singleton kinds keep their
    /// history here.
    #[serde(default)]
    pub previous_values: Vec<Value>,
    /// Later conflicting mentions of a sticky kind. The primary `value`
    /// stays in force; secondaries are available as alternatives.
    #[serde(default)]
    pub secondary_values: Vec<Value>,
}

/// Complete per-session state: recent-turn ring, long-term entity map and
/// the active view that drives implicit filters.
///
/// The serialized layout is additive: fields this version does not know are
/// preserved through a round-trip via the flattened `extra` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    #[serde(default)]
    pub user_type: UserType,
    pub total_messages: u32,
    #[serde(default)]
    pub recent_messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub entity_map: HashMap<String, TrackedEntity>,
    #[serde(default)]
    pub active_entities: HashMap<String, Value>,
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SessionContext {
    pub fn new(session_id: String, user_type: UserType) -> Self {
        Self {
            session_id,
            user_type,
            total_messages: 0,
            recent_messages: Vec::new(),
            entity_map: HashMap::new(),
            active_entities: HashMap::new(),
            last_updated: Utc::now(),
            extra: HashMap::new(),
        }
    }

    /// Document names cited by the most recent assistant message, used by
    /// the rewriter to bind pronouns to concrete offers.
    pub fn last_cited_sources(&self) -> Vec<String> {
        self.recent_messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.sources.clone())
            .unwrap_or_default()
    }

    pub fn active_destination(&self) -> Option<String> {
        self.active_entities
            .get("destination")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}
