//! Prompt templates for the LLM stages of the pipeline.
//!
//! Templates use `format!()` interpolation for type safety; the Serbian
//! wording fixes the enumeration vocabularies exactly so every stage parses
//! against the same closed schema.

/// Prompt for extracting structured metadata from one document chunk.
///
/// The model is instructed to use `null` rather than guess, and the
/// vocabulary here must stay in lockstep with the `EnrichedMetadata` enums.
///
/// # Example
/// ```
/// use turbot::llm::prompts::metadata_enrichment_prompt;
///
/// let prompt = metadata_enrichment_prompt("rim_prolece_2024.pdf", "Hotel u centru Rima...");
/// assert!(prompt.contains("rim_prolece_2024.pdf"));
/// assert!(prompt.contains("tour|hotel|restaurant|attraction"));
/// ```
pub fn metadata_enrichment_prompt(filename: &str, content: &str) -> String {
    // Cap content to keep the call cheap; the head of a chunk carries the signal.
    let truncated: String = content.chars().take(3000).collect();

    format!(
        r#"Analiziraj ovaj isečak dokumenta turističke agencije i izvuci metapodatke.

DOKUMENT: {filename}
SADRŽAJ:
{truncated}

IZVUCI SLEDEĆE METAPODATKE u JSON formatu:

{{
    "destination": "glavna destinacija u srpskom obliku (npr. 'Rim', 'Amsterdam', 'Maroko') ili null",
    "category": "tour|hotel|restaurant|attraction ili null",
    "price_range": "budget|moderate|expensive|luxury ili null",
    "price_min": broj_ili_null,
    "price_max": broj_ili_null,
    "currency": "EUR|USD|RSD ili null",
    "duration_days": broj_ili_null,
    "transport_type": "air|bus|car|train|mixed|none ili null",
    "travel_month": "january|february|march|april|may|june|july|august|september|october|november|december ili null",
    "season": "year_round|summer|winter|spring|autumn ili null",
    "family_friendly": true_ili_false_ili_null,
    "amenities": ["lista sadržaja - bazen, spa, wifi, parking, klima, balkon"],
    "subcategory": "romantic_getaway|family_vacation|cultural_experience|adventure|all_inclusive ili null",
    "confidence_score": 0.0_do_1.0
}}

PRAVILA:
- Koristi null za sve što NIJE eksplicitno u tekstu. Ne nagađaj.
- Kategorija po prioritetu kada se signali preklapaju: tour > restaurant > hotel > attraction.
- travel_month samo ako je konkretan mesec naveden; season za šire periode.
- confidence_score odražava koliko su informacije jasne u tekstu.

ODGOVORI SAMO SA JSON-om:"#
    )
}

/// System prompt for the self-query parser.
pub fn self_query_system_prompt() -> &'static str {
    "Ti si ekspert za analizu turističkih upita na srpskom jeziku. \
     Odgovaraj samo validnim JSON-om."
}

/// Prompt for parsing a natural-language query into structured filters.
pub fn self_query_prompt(query: &str, intent: &str) -> String {
    format!(
        r#"Analiziraj ovaj turistički upit i izvuci strukturirane informacije.

UPIT: "{query}"
INTENT: {intent}

Izvuci sledeće informacije u JSON formatu:

{{
    "semantic_query": "glavna suština pretrage bez filtera (npr. 'hotel smestaj' umesto 'hotel u Rimu do 200 EUR')",
    "filters": {{
        "destination": "grad ili zemlja u srpskom obliku (Rim, ne Rome) ili null",
        "category": "tour|hotel|restaurant|attraction ili null",
        "price_range": "budget|moderate|expensive|luxury ili null",
        "price_max": broj_ili_null_maksimalna_cena_u_EUR,
        "group_size": broj_ili_null_broj_osoba,
        "family_friendly": true_ili_false_ili_null,
        "travel_month": "january|...|december - SPECIFIČAN mesec ili null",
        "season": "spring|summer|autumn|winter ili null",
        "duration_days": broj_ili_null,
        "transport_type": "air|bus|car|train|mixed ili null"
    }},
    "confidence": 0.0_do_1.0
}}

VAŽNO - SRPSKI PADEŽI:
- Prepoznaj sve padežne oblike meseci: "avgust" = "u avgustu" = "tokom avgusta" = "avgusta" = "avgustom"
- travel_month ima PRIORITET nad season - ako vidiš konkretan mesec, koristi travel_month

UVEK EKSTRAKTUJ AKO JE MOGUĆE:
- category iz konteksta: "letovanje", "more", "plaža" -> "tour"; "hotel", "smeštaj" -> "hotel";
  "restoran", "hrana" -> "restaurant"; "muzej", "crkva", "spomenik" -> "attraction"
- price_range iz konteksta: "jeftino", "budžet" -> "budget"; "skup", "luksuz" -> "luxury"
- price_range automatski iz price_max: <150=budget, 150-500=moderate, 500-1000=expensive, >1000=luxury

PRAVILA:
- semantic_query kratak i fokusiran na suštinu
- Koristi null za nepoznate vrednosti, nikad ne izmišljaj
- confidence visok (>0.8) samo ako si siguran u većinu filtera

ODGOVORI SAMO JSON:"#
    )
}

/// System prompt for the context-aware rewriter.
pub fn rewrite_system_prompt() -> &'static str {
    "Ti si ekspert za razumevanje konteksta u turističkim razgovorima. \
     Poboljšaj korisničku poruku dodavanjem konteksta iz prethodne konverzacije."
}

/// Prompt for rewriting an incomplete user message into a self-contained
/// query. `recent_block` and `entities_block` are preformatted context.
pub fn rewrite_prompt(query: &str, recent_block: &str, entities_block: &str) -> String {
    format!(
        r#"Korisnikova poruka: "{query}"

Prethodna konverzacija:
{recent_block}

Aktivne informacije:
{entities_block}

Zadatak: Poboljšaj korisničku poruku dodavanjem relevantnog konteksta iz konverzacije.

Pravila:
1. Ako poruka ima nejasne reference ("to", "taj hotel", "koliko košta"), zameni ih konkretnim informacijama
2. Dodaj destinaciju ako se pita o cenama/hotelima a destinacija nije spomenuta
3. Zadrži prirodan tok srpskog jezika
4. Ne dodaj previše informacija - budi koncizan
5. Ako je poruka već kompletna, vrati je bez izmena

Odgovori SAMO poboljšanom porukom, bez objašnjenja.

Poboljšana poruka:"#
    )
}

/// Prompt for semantic query expansion with Serbian tourism vocabulary.
///
/// # Example
/// ```
/// use turbot::llm::prompts::expansion_prompt;
///
/// let prompt = expansion_prompt("hotel u Rimu");
/// assert!(prompt.contains("hotel u Rimu"));
/// ```
pub fn expansion_prompt(query: &str) -> String {
    format!(
        r#"Ti si ekspert za srpski jezik i turizam. Proširi turistički upit sinonimima i srodnim terminima.

Originalni upit: "{query}"

Generiši proširenu pretragu koja uključuje:
1. Sinonime na srpskom (hotel -> smeštaj, apartman, vila, pansion)
2. Regionalne termine (Rim -> Roma, Rome, Italija, Italy)
3. Semantičke varijante RELEVANTNE za originalni upit
4. Morfološke oblike superlativa (najbolji -> top, odličan, vrhunski)
5. Turističke termine (letovanje -> odmor, more, plaža, vacation)

Pravila:
- Koristi OR operator između termina
- Maksimalno 12 termina, fokus na relevantnost
- NE dodavaj termine koji menjaju smisao upita
- Format odgovora: samo prošireni upit bez objašnjenja

Primer:
Input: "hotel u Rimu"
Output: "hotel OR smeštaj OR apartman u Rimu OR Roma OR Rome OR Italija"

Tvoj odgovor:"#
    )
}

/// Prompt for LLM-assisted entity extraction over a single user message.
/// `hint_block` carries the active entity view as a disambiguation hint.
pub fn entity_extraction_prompt(message: &str, hint_block: &str) -> String {
    format!(
        r#"Izvuci turističke entitete iz ove korisničke poruke na srpskom jeziku.

PORUKA: "{message}"

KONTEKST (samo kao pomoć za razumevanje, NE izvor vrednosti):
{hint_block}

Vrati JSON niz objekata:
[
  {{"kind": "destination|budget|travel_dates|group_composition|accommodation|transport|activities|preference",
    "value": "vrednost iz poruke",
    "confidence": 0.0_do_1.0}}
]

PRAVILA:
- Izvuci SAMO ono što je eksplicitno u poruci. STROGO ZABRANJENO izmišljanje vrednosti koje nisu u tekstu.
- destination u srpskom kanoničnom obliku (Rim, ne Rimu)
- budget kao broj u EUR
- Prazan niz [] ako nema entiteta

ODGOVORI SAMO JSON:"#
    )
}

/// System prompt for the answer synthesizer: the TurBot persona.
pub fn answer_system_prompt() -> &'static str {
    "Ti si TurBot, stručni turistički agent koji pomaže klijentima da pronađu \
     najbolje turističke aranžmane. Odgovaraj na srpskom jeziku, prirodno i profesionalno."
}

/// Prompt for grounded answer generation over retrieved chunks.
///
/// `results_block` is the labeled context; the model is forbidden from
/// introducing facts outside of it.
pub fn answer_prompt(query: &str, filters_summary: &str, results_block: &str) -> String {
    format!(
        r#"KORISNIKOV UPIT: "{query}"
PRIMENJENI FILTERI: {filters_summary}

PRONAĐENI REZULTATI:
{results_block}

ZADATAK:
Generiši prirodan, koristan odgovor na srpskom jeziku koji:
1. ODGOVARA DIREKTNO na korisnikov upit
2. PREDSTAVLJA pronađene opcije jasno i organizovano
3. IZDVAJA ključne informacije (cene, lokacije, termine)
4. REFERENCIŠE izvore ("Prema aranžmanu XYZ...")
5. KORISTI prirodan, konverzacijski ton

STROGA PRAVILA:
- Koristi ISKLJUČIVO informacije iz pronađenih rezultata iznad.
- Ako u rezultatima nema odgovora, reci to otvoreno i postavi kratko pitanje za pojašnjenje.
- Nikad ne izmišljaj cene, datume ni nazive objekata.
- Ako rezultati ne odgovaraju savršeno kriterijumima, objasni razliku i predloži alternative.

ODGOVOR:"#
    )
}

/// Prompt variant for the truthful no-results answer.
pub fn no_results_prompt(query: &str) -> String {
    format!(
        r#"KORISNIKOV UPIT: "{query}"

U bazi NEMA dokumenata koji odgovaraju ovom upitu.

Napiši kratak, iskren odgovor na srpskom jeziku koji:
1. Jasno kaže da trenutno nemamo informacije o traženom
2. NE izmišlja nikakve ponude, cene ni destinacije
3. Predlaže da korisnik proba sa drugom destinacijom, terminom ili budžetom

ODGOVOR:"#
    )
}
