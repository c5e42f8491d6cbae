use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One indexable text window cut from a source document.
///
/// The id is a deterministic hash of source file, position and text, so
/// re-ingesting the same document overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_file: String,
    pub page: Option<u32>,
    pub position: i32,
    pub text: String,
    pub token_count: i32,
    pub metadata: EnrichedMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tour,
    Hotel,
    Restaurant,
    Attraction,
}

impl Category {
    /// Classification priority when textual evidence overlaps.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Tour => 0,
            Self::Restaurant => 1,
            Self::Hotel => 2,
            Self::Attraction => 3,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tour => write!(f, "tour"),
            Self::Hotel => write!(f, "hotel"),
            Self::Restaurant => write!(f, "restaurant"),
            Self::Attraction => write!(f, "attraction"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tour" => Ok(Self::Tour),
            "hotel" => Ok(Self::Hotel),
            "restaurant" => Ok(Self::Restaurant),
            "attraction" => Ok(Self::Attraction),
            _ => Err(format!("Unknown category: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceRange {
    Budget,
    Moderate,
    Expensive,
    Luxury,
}

impl PriceRange {
    /// Classify an EUR per-person amount into a band.
    pub fn from_amount(amount: u32) -> Self {
        match amount {
            0..=149 => Self::Budget,
            150..=500 => Self::Moderate,
            501..=1000 => Self::Expensive,
            _ => Self::Luxury,
        }
    }
}

impl std::fmt::Display for PriceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Budget => write!(f, "budget"),
            Self::Moderate => write!(f, "moderate"),
            Self::Expensive => write!(f, "expensive"),
            Self::Luxury => write!(f, "luxury"),
        }
    }
}

impl std::str::FromStr for PriceRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "budget" => Ok(Self::Budget),
            "moderate" => Ok(Self::Moderate),
            "expensive" => Ok(Self::Expensive),
            "luxury" => Ok(Self::Luxury),
            _ => Err(format!("Unknown price range: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    Air,
    Bus,
    Car,
    Train,
    Mixed,
    None,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Air => write!(f, "air"),
            Self::Bus => write!(f, "bus"),
            Self::Car => write!(f, "car"),
            Self::Train => write!(f, "train"),
            Self::Mixed => write!(f, "mixed"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "air" | "plane" | "flight" => Ok(Self::Air),
            "bus" => Ok(Self::Bus),
            "car" => Ok(Self::Car),
            "train" => Ok(Self::Train),
            "mixed" => Ok(Self::Mixed),
            "none" => Ok(Self::None),
            _ => Err(format!("Unknown transport type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TravelMonth {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl TravelMonth {
    pub fn index(&self) -> u8 {
        match self {
            Self::January => 1,
            Self::February => 2,
            Self::March => 3,
            Self::April => 4,
            Self::May => 5,
            Self::June => 6,
            Self::July => 7,
            Self::August => 8,
            Self::September => 9,
            Self::October => 10,
            Self::November => 11,
            Self::December => 12,
        }
    }

    /// Calendar adjacency, with the December-January wraparound.
    pub fn is_adjacent(&self, other: TravelMonth) -> bool {
        let a = self.index() as i8;
        let b = other.index() as i8;
        let diff = (a - b).abs();
        diff == 1 || diff == 11
    }
}

impl std::fmt::Display for TravelMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::January => "january",
            Self::February => "february",
            Self::March => "march",
            Self::April => "april",
            Self::May => "may",
            Self::June => "june",
            Self::July => "july",
            Self::August => "august",
            Self::September => "september",
            Self::October => "october",
            Self::November => "november",
            Self::December => "december",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for TravelMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "january" => Ok(Self::January),
            "february" => Ok(Self::February),
            "march" => Ok(Self::March),
            "april" => Ok(Self::April),
            "may" => Ok(Self::May),
            "june" => Ok(Self::June),
            "july" => Ok(Self::July),
            "august" => Ok(Self::August),
            "september" => Ok(Self::September),
            "october" => Ok(Self::October),
            "november" => Ok(Self::November),
            "december" => Ok(Self::December),
            _ => Err(format!("Unknown month: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    YearRound,
    Summer,
    Winter,
    Spring,
    Autumn,
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::YearRound => write!(f, "year_round"),
            Self::Summer => write!(f, "summer"),
            Self::Winter => write!(f, "winter"),
            Self::Spring => write!(f, "spring"),
            Self::Autumn => write!(f, "autumn"),
        }
    }
}

impl std::str::FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "year_round" => Ok(Self::YearRound),
            "summer" => Ok(Self::Summer),
            "winter" => Ok(Self::Winter),
            "spring" => Ok(Self::Spring),
            "autumn" => Ok(Self::Autumn),
            _ => Err(format!("Unknown season: {s}")),
        }
    }
}

/// Closed-schema structured annotation of a chunk.
///
/// Every field is optional; the enricher is told to leave a field absent
/// rather than guess, and the validator resets anything it cannot parse.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnrichedMetadata {
    pub destination: Option<String>,
    pub category: Option<Category>,
    pub price_range: Option<PriceRange>,
    pub price_min: Option<u32>,
    pub price_max: Option<u32>,
    pub currency: Option<String>,
    pub duration_days: Option<u32>,
    pub transport_type: Option<TransportType>,
    pub travel_month: Option<TravelMonth>,
    pub season: Option<Season>,
    pub family_friendly: Option<bool>,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub subcategory: Option<String>,
    #[serde(default)]
    pub confidence_score: f32,
}

impl EnrichedMetadata {
    /// Metadata for a chunk whose enrichment failed entirely. Still indexed:
    /// retrieval stays possible by vector similarity alone.
    pub fn unenriched() -> Self {
        Self::default()
    }

    /// Enforce internal invariants after parsing model output.
    pub fn normalize(&mut self) {
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if min > max {
                self.price_min = Some(max);
                self.price_max = Some(min);
            }
        }
        self.confidence_score = self.confidence_score.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_adjacency() {
        assert!(TravelMonth::May.is_adjacent(TravelMonth::April));
        assert!(TravelMonth::May.is_adjacent(TravelMonth::June));
        assert!(!TravelMonth::May.is_adjacent(TravelMonth::August));
        assert!(!TravelMonth::May.is_adjacent(TravelMonth::May));
    }

    #[test]
    fn test_month_adjacency_wraps_year_boundary() {
        assert!(TravelMonth::December.is_adjacent(TravelMonth::January));
        assert!(TravelMonth::January.is_adjacent(TravelMonth::December));
    }

    #[test]
    fn test_price_range_from_amount() {
        assert_eq!(PriceRange::from_amount(50), PriceRange::Budget);
        assert_eq!(PriceRange::from_amount(200), PriceRange::Moderate);
        assert_eq!(PriceRange::from_amount(500), PriceRange::Moderate);
        assert_eq!(PriceRange::from_amount(800), PriceRange::Expensive);
        assert_eq!(PriceRange::from_amount(1500), PriceRange::Luxury);
    }

    #[test]
    fn test_category_priority_order() {
        assert!(Category::Tour.priority() < Category::Restaurant.priority());
        assert!(Category::Restaurant.priority() < Category::Hotel.priority());
        assert!(Category::Hotel.priority() < Category::Attraction.priority());
    }

    #[test]
    fn test_normalize_swaps_inverted_price_bounds() {
        let mut metadata = EnrichedMetadata {
            price_min: Some(500),
            price_max: Some(200),
            ..Default::default()
        };
        metadata.normalize();
        assert_eq!(metadata.price_min, Some(200));
        assert_eq!(metadata.price_max, Some(500));
    }

    #[test]
    fn test_enum_round_trip_serialization() {
        let json = serde_json::to_string(&Category::Tour).unwrap();
        assert_eq!(json, "\"tour\"");
        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Category::Tour);

        let json = serde_json::to_string(&Season::YearRound).unwrap();
        assert_eq!(json, "\"year_round\"");
    }

    #[test]
    fn test_unknown_enum_string_is_error() {
        assert!("villa".parse::<Category>().is_err());
        assert!("sometimes".parse::<Season>().is_err());
        assert!("smarch".parse::<TravelMonth>().is_err());
    }
}
