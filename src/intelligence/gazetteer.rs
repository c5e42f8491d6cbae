//! Curated Serbian tourism vocabulary: destinations with their
//! morphological variants, month names across case declensions, seasons,
//! transport and category keyword sets.
//!
//! Matching is substring-based over a lowercased message, longest variant
//! first, so "u amsterdamu" resolves before "amsterdam" would mis-slice.

use crate::models::{Category, Season, TransportType, TravelMonth};

/// (variant, canonical) pairs. Canonical names are the Serbian forms used
/// in chunk metadata ("Rim", not "Rome").
const DESTINATIONS: &[(&str, &str)] = &[
    ("amsterdamu", "Amsterdam"),
    ("amsterdama", "Amsterdam"),
    ("amsterdam", "Amsterdam"),
    ("istanbulu", "Istanbul"),
    ("istanbula", "Istanbul"),
    ("istanbul", "Istanbul"),
    ("rimu", "Rim"),
    ("rima", "Rim"),
    ("rimom", "Rim"),
    ("rim", "Rim"),
    ("roma", "Rim"),
    ("rome", "Rim"),
    ("parizu", "Pariz"),
    ("pariza", "Pariz"),
    ("parizom", "Pariz"),
    ("pariz", "Pariz"),
    ("paris", "Pariz"),
    ("madridu", "Madrid"),
    ("madrida", "Madrid"),
    ("madrid", "Madrid"),
    ("barceloni", "Barcelona"),
    ("barcelone", "Barcelona"),
    ("barcelona", "Barcelona"),
    ("maroku", "Maroko"),
    ("maroka", "Maroko"),
    ("maroko", "Maroko"),
    ("malti", "Malta"),
    ("malte", "Malta"),
    ("malta", "Malta"),
    ("bariju", "Bari"),
    ("barija", "Bari"),
    ("bari", "Bari"),
    ("pulji", "Pulja"),
    ("pulje", "Pulja"),
    ("pulja", "Pulja"),
    ("grčkoj", "Grčka"),
    ("grckoj", "Grčka"),
    ("grčke", "Grčka"),
    ("grcke", "Grčka"),
    ("grčka", "Grčka"),
    ("grcka", "Grčka"),
    ("greece", "Grčka"),
    ("atini", "Atina"),
    ("atine", "Atina"),
    ("atina", "Atina"),
    ("athens", "Atina"),
    ("turskoj", "Turska"),
    ("turske", "Turska"),
    ("turska", "Turska"),
    ("turkey", "Turska"),
    ("lisabonu", "Lisabon"),
    ("lisabona", "Lisabon"),
    ("lisabon", "Lisabon"),
    ("portu", "Porto"),
    ("porto", "Porto"),
    ("toskani", "Toskana"),
    ("toskane", "Toskana"),
    ("toskana", "Toskana"),
    ("beogradu", "Beograd"),
    ("beograda", "Beograd"),
    ("beograd", "Beograd"),
    ("belgrade", "Beograd"),
];

/// Month variants covering Serbian case declensions plus English names.
const MONTHS: &[(&str, TravelMonth)] = &[
    ("januarom", TravelMonth::January),
    ("januaru", TravelMonth::January),
    ("januara", TravelMonth::January),
    ("januar", TravelMonth::January),
    ("january", TravelMonth::January),
    ("februarom", TravelMonth::February),
    ("februaru", TravelMonth::February),
    ("februara", TravelMonth::February),
    ("februar", TravelMonth::February),
    ("february", TravelMonth::February),
    ("martom", TravelMonth::March),
    ("martu", TravelMonth::March),
    ("marta", TravelMonth::March),
    ("mart", TravelMonth::March),
    ("march", TravelMonth::March),
    ("aprilom", TravelMonth::April),
    ("aprilu", TravelMonth::April),
    ("aprila", TravelMonth::April),
    ("april", TravelMonth::April),
    ("majem", TravelMonth::May),
    ("maju", TravelMonth::May),
    ("maja", TravelMonth::May),
    ("maj", TravelMonth::May),
    ("junom", TravelMonth::June),
    ("junu", TravelMonth::June),
    ("juna", TravelMonth::June),
    ("jun", TravelMonth::June),
    ("june", TravelMonth::June),
    ("julijem", TravelMonth::July),
    ("juliju", TravelMonth::July),
    ("julija", TravelMonth::July),
    ("juli", TravelMonth::July),
    ("julu", TravelMonth::July),
    ("jul", TravelMonth::July),
    ("july", TravelMonth::July),
    ("avgustom", TravelMonth::August),
    ("avgustu", TravelMonth::August),
    ("avgusta", TravelMonth::August),
    ("avgust", TravelMonth::August),
    ("august", TravelMonth::August),
    ("avg", TravelMonth::August),
    ("septembrom", TravelMonth::September),
    ("septembru", TravelMonth::September),
    ("septembra", TravelMonth::September),
    ("septembar", TravelMonth::September),
    ("september", TravelMonth::September),
    ("oktobrom", TravelMonth::October),
    ("oktobru", TravelMonth::October),
    ("oktobra", TravelMonth::October),
    ("oktobar", TravelMonth::October),
    ("october", TravelMonth::October),
    ("novembrom", TravelMonth::November),
    ("novembru", TravelMonth::November),
    ("novembra", TravelMonth::November),
    ("novembar", TravelMonth::November),
    ("november", TravelMonth::November),
    ("decembrom", TravelMonth::December),
    ("decembru", TravelMonth::December),
    ("decembra", TravelMonth::December),
    ("decembar", TravelMonth::December),
    ("december", TravelMonth::December),
];

const SEASONS: &[(&str, Season)] = &[
    ("letovanj", Season::Summer),
    ("leto", Season::Summer),
    ("letu", Season::Summer),
    ("summer", Season::Summer),
    ("zimovanj", Season::Winter),
    ("zima", Season::Winter),
    ("zimi", Season::Winter),
    ("winter", Season::Winter),
    ("proleće", Season::Spring),
    ("prolece", Season::Spring),
    ("proleću", Season::Spring),
    ("prolecu", Season::Spring),
    ("spring", Season::Spring),
    ("jesen", Season::Autumn),
    ("autumn", Season::Autumn),
];

const TRANSPORT: &[(&str, TransportType)] = &[
    ("avionom", TransportType::Air),
    ("avion", TransportType::Air),
    ("avio", TransportType::Air),
    ("letom", TransportType::Air),
    ("autobusom", TransportType::Bus),
    ("autobus", TransportType::Bus),
    ("busom", TransportType::Bus),
    ("bus", TransportType::Bus),
    ("vozom", TransportType::Train),
    ("voz", TransportType::Train),
    ("železnic", TransportType::Train),
    ("zeleznic", TransportType::Train),
    ("kolima", TransportType::Car),
    ("autom", TransportType::Car),
];

/// Category keyword sets, listed in classification priority order:
/// tour beats restaurant beats hotel beats attraction.
const TOUR_KEYWORDS: &[&str] = &[
    "aranžman",
    "aranzman",
    "letovanje",
    "letovanja",
    "putovanje",
    "tura",
    "izlet",
    "paket",
    "krstarenje",
    "odmor",
    "more",
    "plaža",
    "plaza",
];

const RESTAURANT_KEYWORDS: &[&str] = &[
    "restoran",
    "kafana",
    "gostionica",
    "jelovnik",
    "meni",
    "menu",
    "hrana",
    "večera",
    "vecera",
];

const HOTEL_KEYWORDS: &[&str] = &[
    "hotel",
    "smeštaj",
    "smestaj",
    "apartman",
    "vila",
    "pansion",
    "resort",
    "noćenje",
    "nocenje",
];

const ATTRACTION_KEYWORDS: &[&str] = &[
    "muzej",
    "crkva",
    "tvrđava",
    "tvrdjava",
    "spomenik",
    "galerija",
    "znamenitost",
];

const FAMILY_KEYWORDS: &[&str] = &["porodic", "familij", "deca", "decu", "decom", "dete", "family"];

/// Resolve a destination mention anywhere in lowercased text to its
/// canonical Serbian name. Longest variant wins.
pub fn canonical_destination(text_lower: &str) -> Option<String> {
    let mut sorted: Vec<(&str, &str)> = DESTINATIONS.to_vec();
    sorted.sort_by_key(|(variant, _)| std::cmp::Reverse(variant.len()));

    sorted
        .into_iter()
        .find(|(variant, _)| text_lower.contains(variant))
        .map(|(_, canonical)| canonical.to_string())
}

/// Canonicalize a destination value that is already isolated (e.g. an LLM
/// filter value): exact variant lookup, falling back to the input as-is
/// with an uppercased first letter.
pub fn canonicalize_destination_value(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    DESTINATIONS
        .iter()
        .find(|(variant, _)| *variant == lower)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| {
            let mut chars = value.trim().chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
}

/// Destination implied by a filename, e.g. "Amsterdam_maj_2024.pdf".
pub fn destination_from_filename(filename: &str) -> Option<String> {
    canonical_destination(&filename.to_lowercase())
}

pub fn month_from_text(text_lower: &str) -> Option<TravelMonth> {
    let mut sorted: Vec<(&str, TravelMonth)> = MONTHS.to_vec();
    sorted.sort_by_key(|(variant, _)| std::cmp::Reverse(variant.len()));

    sorted
        .into_iter()
        .find(|(variant, _)| text_lower.contains(variant))
        .map(|(_, month)| month)
}

pub fn season_from_text(text_lower: &str) -> Option<Season> {
    SEASONS
        .iter()
        .find(|(variant, _)| text_lower.contains(variant))
        .map(|(_, season)| *season)
}

pub fn transport_from_text(text_lower: &str) -> Option<TransportType> {
    let mut sorted: Vec<(&str, TransportType)> = TRANSPORT.to_vec();
    sorted.sort_by_key(|(variant, _)| std::cmp::Reverse(variant.len()));

    sorted
        .into_iter()
        .find(|(variant, _)| text_lower.contains(variant))
        .map(|(_, transport)| transport)
}

/// Keyword-based category classification honoring the priority order
/// tour > restaurant > hotel > attraction when evidence overlaps.
pub fn category_from_text(text_lower: &str) -> Option<Category> {
    if TOUR_KEYWORDS.iter().any(|k| text_lower.contains(k)) {
        return Some(Category::Tour);
    }
    if RESTAURANT_KEYWORDS.iter().any(|k| text_lower.contains(k)) {
        return Some(Category::Restaurant);
    }
    if HOTEL_KEYWORDS.iter().any(|k| text_lower.contains(k)) {
        return Some(Category::Hotel);
    }
    if ATTRACTION_KEYWORDS.iter().any(|k| text_lower.contains(k)) {
        return Some(Category::Attraction);
    }
    None
}

pub fn family_friendly_mentioned(text_lower: &str) -> bool {
    FAMILY_KEYWORDS.iter().any(|k| text_lower.contains(k))
}

/// True if the word appears in the tourism vocabulary at all; used by the
/// expansion validator's off-topic stop-list check.
pub fn known_destinations() -> impl Iterator<Item = &'static str> {
    DESTINATIONS.iter().map(|(_, canonical)| *canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_morphological_variants() {
        assert_eq!(canonical_destination("hotel u rimu"), Some("Rim".into()));
        assert_eq!(canonical_destination("cene za rim"), Some("Rim".into()));
        assert_eq!(canonical_destination("trip to rome"), Some("Rim".into()));
        assert_eq!(
            canonical_destination("aranžman za amsterdam u maju"),
            Some("Amsterdam".into())
        );
        assert_eq!(canonical_destination("a što sa parizom?"), Some("Pariz".into()));
        assert_eq!(canonical_destination("izlet na more"), None);
    }

    #[test]
    fn test_month_case_declensions() {
        assert_eq!(month_from_text("u avgustu"), Some(TravelMonth::August));
        assert_eq!(month_from_text("tokom avgusta"), Some(TravelMonth::August));
        assert_eq!(month_from_text("avgustom"), Some(TravelMonth::August));
        assert_eq!(month_from_text("krajem maja"), Some(TravelMonth::May));
        assert_eq!(month_from_text("u maju"), Some(TravelMonth::May));
        assert_eq!(month_from_text("septembru"), Some(TravelMonth::September));
        assert_eq!(month_from_text("bez meseca"), None);
    }

    #[test]
    fn test_category_priority_tour_beats_hotel() {
        // "aranžman" and "hotel" both present: tour wins
        assert_eq!(
            category_from_text("aranžman uključuje hotel sa 4 zvezdice"),
            Some(Category::Tour)
        );
        assert_eq!(category_from_text("hotel u centru"), Some(Category::Hotel));
        assert_eq!(
            category_from_text("jelovnik restorana"),
            Some(Category::Restaurant)
        );
        assert_eq!(category_from_text("poseta muzeju"), Some(Category::Attraction));
    }

    #[test]
    fn test_seasonal_keyword_letovanja_maps_to_summer() {
        assert_eq!(season_from_text("koja letovanja imaš"), Some(Season::Summer));
        assert_eq!(season_from_text("zimovanje na kopaoniku"), Some(Season::Winter));
    }

    #[test]
    fn test_transport_variants() {
        assert_eq!(transport_from_text("prevoz avionom"), Some(TransportType::Air));
        assert_eq!(transport_from_text("ide se autobusom"), Some(TransportType::Bus));
        assert_eq!(transport_from_text("vozom do budimpešte"), Some(TransportType::Train));
    }

    #[test]
    fn test_destination_from_filename() {
        assert_eq!(
            destination_from_filename("Amsterdam_PROLECE_2024.pdf"),
            Some("Amsterdam".into())
        );
        assert_eq!(
            destination_from_filename("hotel_rim_2024.pdf"),
            Some("Rim".into())
        );
        assert_eq!(destination_from_filename("cenovnik_2024.pdf"), None);
    }

    #[test]
    fn test_canonicalize_destination_value() {
        assert_eq!(canonicalize_destination_value("rome"), "Rim");
        assert_eq!(canonicalize_destination_value("rimu"), "Rim");
        assert_eq!(canonicalize_destination_value("Pariz"), "Pariz");
        // Unknown values pass through, capitalized
        assert_eq!(canonicalize_destination_value("oslo"), "Oslo");
    }

    #[test]
    fn test_family_friendly_detection() {
        assert!(family_friendly_mentioned("letovanje za porodicu sa decom"));
        assert!(!family_friendly_mentioned("romantičan vikend"));
    }
}
