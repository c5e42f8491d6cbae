mod common;

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    chunk_record, llm_chat_response, mount_embeddings, test_config, test_llm_config,
    MemoryVectorStore,
};
use turbot::config::Config;
use turbot::db::VectorStore;
use turbot::embeddings::EmbeddingProvider;
use turbot::llm::LlmProvider;
use turbot::models::{
    AnswerEvent, Category, EnrichedMetadata, HardFilterField, PriceRange, TravelMonth,
};
use turbot::services::ChatService;
use turbot::session::SessionStore;

struct Harness {
    chat: ChatService,
    store: Arc<MemoryVectorStore>,
    sessions: Arc<SessionStore>,
    _session_dir: tempfile::TempDir,
    _embedding_server: MockServer,
}

async fn harness(store: MemoryVectorStore, llm: LlmProvider) -> Harness {
    let embedding_server = MockServer::start().await;
    mount_embeddings(&embedding_server).await;

    let session_dir = tempfile::TempDir::new().unwrap();
    let config: Config = test_config(
        &session_dir.path().to_string_lossy(),
        embedding_server.uri(),
    );

    let store = Arc::new(store);
    let dyn_store: Arc<dyn VectorStore> = store.clone();
    let sessions = Arc::new(SessionStore::new(&config.session).unwrap());
    let embeddings = EmbeddingProvider::new(&config.embeddings).unwrap();

    let chat = ChatService::new(sessions.clone(), dyn_store, embeddings, llm, &config);

    Harness {
        chat,
        store,
        sessions,
        _session_dir: session_dir,
        _embedding_server: embedding_server,
    }
}

fn amsterdam_metadata() -> EnrichedMetadata {
    EnrichedMetadata {
        destination: Some("Amsterdam".into()),
        category: Some(Category::Tour),
        price_range: Some(PriceRange::Moderate),
        price_min: Some(420),
        price_max: Some(480),
        travel_month: Some(TravelMonth::May),
        duration_days: Some(4),
        confidence_score: 0.9,
        ..Default::default()
    }
}

fn rim_hotel_metadata() -> EnrichedMetadata {
    EnrichedMetadata {
        destination: Some("Rim".into()),
        category: Some(Category::Hotel),
        price_min: Some(200),
        confidence_score: 0.9,
        ..Default::default()
    }
}

fn seeded_store() -> MemoryVectorStore {
    let unit = vec![1.0, 0.0, 0.0];
    MemoryVectorStore::seeded(vec![
        chunk_record(
            "ams1",
            "Amsterdam_PROLECE_2024.pdf",
            "Aranžman za Amsterdam u maju, cena 450 EUR po osobi.",
            amsterdam_metadata(),
            unit.clone(),
        ),
        chunk_record(
            "ams2",
            "Amsterdam_PROLECE_2024.pdf",
            "Uključen prevoz avionom i doručak.",
            amsterdam_metadata(),
            unit.clone(),
        ),
        chunk_record(
            "ams3",
            "Amsterdam_PROLECE_2024.pdf",
            "Polazak sredinom maja, povratak za vikend.",
            amsterdam_metadata(),
            unit.clone(),
        ),
        chunk_record(
            "rim1",
            "hotel_rim_2024.pdf",
            "Hotel u centru Rima, noćenje 200 EUR.",
            rim_hotel_metadata(),
            unit.clone(),
        ),
        chunk_record(
            "rim2",
            "hotel_rim_2024.pdf",
            "Hotel nudi spa centar i doručak.",
            rim_hotel_metadata(),
            unit.clone(),
        ),
        chunk_record(
            "rim3",
            "hotel_rim_2024.pdf",
            "Rezervacije za Rim primamo radnim danima.",
            rim_hotel_metadata(),
            unit,
        ),
    ])
}

fn pariz_store() -> MemoryVectorStore {
    let unit = vec![1.0, 0.0, 0.0];
    let metadata = EnrichedMetadata {
        destination: Some("Pariz".into()),
        category: Some(Category::Tour),
        price_min: Some(280),
        confidence_score: 0.9,
        ..Default::default()
    };
    let rim = EnrichedMetadata {
        destination: Some("Rim".into()),
        category: Some(Category::Tour),
        confidence_score: 0.9,
        ..Default::default()
    };
    MemoryVectorStore::seeded(vec![
        chunk_record("par1", "pariz_2024.pdf", "Aranžman za Pariz.", metadata.clone(), unit.clone()),
        chunk_record("par2", "pariz_2024.pdf", "Pariz sa prevozom.", metadata.clone(), unit.clone()),
        chunk_record("par3", "pariz_2024.pdf", "Pariz, tri noćenja.", metadata, unit.clone()),
        chunk_record("rim1", "rim_2024.pdf", "Aranžman za Rim.", rim.clone(), unit.clone()),
        chunk_record("rim2", "rim_2024.pdf", "Rim sa vodičem.", rim.clone(), unit.clone()),
        chunk_record("rim3", "rim_2024.pdf", "Rim, vikend tura.", rim, unit),
    ])
}

// Scenario: destination + month + budget in one utterance.
#[tokio::test]
async fn destination_month_budget_query_uses_destination_hard_filter() {
    let h = harness(seeded_store(), LlmProvider::unavailable("test")).await;

    let answer = h
        .chat
        .query(
            "s1",
            "Daj mi neki aranžman za Amsterdam u maju, budžet oko 500 EUR.",
        )
        .await
        .unwrap();

    // The store saw exactly {destination: Amsterdam}; month and budget
    // became soft constraints.
    let queries = h.store.recorded_queries();
    assert_eq!(queries.len(), 1);
    let hard = queries[0].clone().unwrap();
    assert_eq!(hard.field, HardFilterField::Destination);
    assert_eq!(hard.value, "Amsterdam");

    assert_eq!(answer.filters.destination.as_deref(), Some("Amsterdam"));
    assert_eq!(answer.filters.travel_month, Some(TravelMonth::May));
    assert_eq!(answer.filters.price_max, Some(500));
    assert_eq!(answer.filters.price_range, Some(PriceRange::Moderate));

    assert!(answer.sources[0].document_name.contains("Amsterdam"));
    assert!(answer.confidence >= 0.4, "confidence {}", answer.confidence);
}

// Scenario: pronoun carry across turns.
#[tokio::test]
async fn pronoun_query_inherits_destination_from_previous_turn() {
    let h = harness(seeded_store(), LlmProvider::unavailable("test")).await;

    let first = h.chat.query("s2", "Tražim hotel u Rimu.").await.unwrap();
    assert!(first
        .sources
        .iter()
        .any(|s| s.document_name == "hotel_rim_2024.pdf"));

    let second = h.chat.query("s2", "Koliko košta?").await.unwrap();

    let queries = h.store.recorded_queries();
    let turn2_filter = queries.last().unwrap().clone().unwrap();
    assert_eq!(turn2_filter.field, HardFilterField::Destination);
    assert_eq!(turn2_filter.value, "Rim");

    assert_eq!(second.filters.destination.as_deref(), Some("Rim"));
}

// Scenario: context switch keeps the sticky budget.
#[tokio::test]
async fn context_switch_keeps_budget_replaces_destination() {
    let h = harness(pariz_store(), LlmProvider::unavailable("test")).await;

    h.chat
        .query("s3", "Tražim aranžman za Rim, budžet 300 EUR.")
        .await
        .unwrap();

    let answer = h.chat.query("s3", "A što sa Parizom?").await.unwrap();

    assert_eq!(answer.filters.destination.as_deref(), Some("Pariz"));
    assert_eq!(answer.filters.price_max, Some(300));

    let queries = h.store.recorded_queries();
    let turn2_filter = queries.last().unwrap().clone().unwrap();
    assert_eq!(turn2_filter.field, HardFilterField::Destination);
    assert_eq!(turn2_filter.value, "Pariz");

    // The active view switched destination but the old value stays in the map
    let session = h.sessions.load("s3").await.unwrap();
    assert_eq!(
        session.active_entities.get("destination").unwrap(),
        &serde_json::json!("Pariz")
    );
    assert_eq!(
        session.active_entities.get("budget").unwrap(),
        &serde_json::json!(300)
    );
    let tracked = session.entity_map.get("destination").unwrap();
    assert!(tracked.previous_values.contains(&serde_json::json!("Rim")));
}

// A conflicting re-mention of a sticky kind (no destination switch) does
// not silently overwrite: the established budget stays in force and the new
// amount is recorded as a secondary.
#[tokio::test]
async fn sticky_budget_re_mention_keeps_original_in_force() {
    let h = harness(pariz_store(), LlmProvider::unavailable("test")).await;

    h.chat
        .query("s12", "Tražim aranžman za Rim, budžet 300 EUR.")
        .await
        .unwrap();
    h.chat
        .query("s12", "Može i skuplje, budžet 500 EUR.")
        .await
        .unwrap();

    let session = h.sessions.load("s12").await.unwrap();
    assert_eq!(
        session.active_entities.get("budget"),
        Some(&serde_json::json!(300))
    );

    let tracked = session.entity_map.get("budget").unwrap();
    assert_eq!(tracked.value, serde_json::json!(300));
    assert_eq!(tracked.secondary_values, vec![serde_json::json!(500)]);
    assert_eq!(tracked.mention_count, 2);

    // And a third turn with no budget mention inherits the primary value
    let answer = h.chat.query("s12", "A što sa Parizom?").await.unwrap();
    assert_eq!(answer.filters.price_max, Some(300));
}

// Scenario: seasonal-only query falls to the travel_month hard filter.
#[tokio::test]
async fn seasonal_query_uses_travel_month_hard_filter() {
    let unit = vec![1.0, 0.0, 0.0];
    let august = EnrichedMetadata {
        category: Some(Category::Tour),
        travel_month: Some(TravelMonth::August),
        confidence_score: 0.9,
        ..Default::default()
    };
    let store = MemoryVectorStore::seeded(vec![
        chunk_record("a1", "letovanje_avgust.pdf", "Letovanje u avgustu.", august.clone(), unit.clone()),
        chunk_record("a2", "letovanje_avgust.pdf", "More i plaža u avgustu.", august.clone(), unit.clone()),
        chunk_record("a3", "letovanje_avgust.pdf", "Polasci tokom avgusta.", august, unit),
    ]);

    let h = harness(store, LlmProvider::unavailable("test")).await;
    let answer = h.chat.query("s4", "koja letovanja imaš u avgustu").await.unwrap();

    let queries = h.store.recorded_queries();
    let hard = queries[0].clone().unwrap();
    assert_eq!(hard.field, HardFilterField::TravelMonth);
    assert_eq!(hard.value, "august");

    assert_eq!(answer.filters.travel_month, Some(TravelMonth::August));
    assert_eq!(answer.filters.category, Some(Category::Tour));
    assert_eq!(answer.filters.destination, None);
}

// Scenario: no data means saying so, not inventing.
#[tokio::test]
async fn empty_corpus_yields_truthful_answer_with_zero_confidence() {
    let h = harness(MemoryVectorStore::new(), LlmProvider::unavailable("test")).await;

    let answer = h
        .chat
        .query("s5", "Koliko košta izlet u Antarktik u januaru?")
        .await
        .unwrap();

    assert!(answer.sources.is_empty());
    assert_eq!(answer.confidence, 0.0);
    assert!(answer.response.contains("nemam informacije"));
    assert!(!answer.suggested_questions.is_empty());
}

// Every citation corresponds to a retrieved top-K chunk.
#[tokio::test]
async fn citations_are_subset_of_retrieved_documents() {
    let h = harness(seeded_store(), LlmProvider::unavailable("test")).await;

    let answer = h
        .chat
        .query("s6", "Tražim aranžman za Amsterdam u maju")
        .await
        .unwrap();

    let known = ["Amsterdam_PROLECE_2024.pdf", "hotel_rim_2024.pdf"];
    for citation in &answer.sources {
        assert!(known.contains(&citation.document_name.as_str()));
    }
    assert!(!answer.sources.is_empty());
}

// A cancelled streaming request commits nothing: the session record on
// disk stays byte-identical.
#[tokio::test]
async fn cancelled_stream_leaves_session_unchanged() {
    let h = harness(seeded_store(), LlmProvider::unavailable("test")).await;

    h.chat.query("s7", "Tražim hotel u Rimu.").await.unwrap();
    let path = h._session_dir.path().join("s7.json");
    let before = std::fs::read(&path).unwrap();

    let rx = h.chat.query_stream("s7", "Koliko košta?").await.unwrap();
    drop(rx);

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let after = std::fs::read(&path).unwrap();
    assert_eq!(before, after, "cancelled request must not mutate the session");
}

// A consumed stream ends with exactly one Complete event and commits the turn.
#[tokio::test]
async fn consumed_stream_completes_and_commits() {
    let h = harness(seeded_store(), LlmProvider::unavailable("test")).await;

    let mut rx = h
        .chat
        .query_stream("s8", "Tražim hotel u Rimu.")
        .await
        .unwrap();

    let mut contents = 0;
    let mut completes = 0;
    while let Some(event) = rx.recv().await {
        match event {
            AnswerEvent::Content { chunk } => {
                assert!(!chunk.is_empty());
                contents += 1;
            }
            AnswerEvent::Complete {
                confidence,
                total_chunks,
                ..
            } => {
                completes += 1;
                assert!(confidence > 0.0);
                assert!(total_chunks > 0);
            }
            AnswerEvent::Error { message } => panic!("unexpected error event: {message}"),
        }
    }

    assert!(contents >= 1);
    assert_eq!(completes, 1);

    let session = h.sessions.load("s8").await.unwrap();
    assert_eq!(session.total_messages, 2);
}

// One LLM that returns prose everywhere: structured stages degrade to
// rules, the synthesizer uses the text, nothing breaks.
#[tokio::test]
async fn non_json_llm_degrades_gracefully_end_to_end() {
    let llm_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(llm_chat_response(
            "Prema aranžmanu Amsterdam_PROLECE_2024.pdf, cena je 450 EUR u maju.",
        )))
        .mount(&llm_server)
        .await;

    let llm = LlmProvider::new(Some(&test_llm_config(llm_server.uri())));
    let h = harness(seeded_store(), llm).await;

    let answer = h
        .chat
        .query("s9", "Daj mi neki aranžman za Amsterdam u maju, budžet oko 500 EUR.")
        .await
        .unwrap();

    // Pattern-extracted filters survived the LLM's refusal to emit JSON
    assert_eq!(answer.filters.destination.as_deref(), Some("Amsterdam"));
    assert_eq!(answer.filters.price_max, Some(500));

    // And the synthesizer's text came through verbatim
    assert!(answer.response.contains("450 EUR"));
    assert!(!answer.sources.is_empty());
}

// Requests on the same session serialize; both turns commit.
#[tokio::test]
async fn concurrent_requests_on_one_session_serialize() {
    let h = harness(seeded_store(), LlmProvider::unavailable("test")).await;

    let chat1 = h.chat.clone();
    let chat2 = h.chat.clone();

    let (a, b) = tokio::join!(
        chat1.query("s10", "Tražim hotel u Rimu."),
        chat2.query("s10", "Tražim aranžman za Amsterdam u maju.")
    );
    a.unwrap();
    b.unwrap();

    let session = h.sessions.load("s10").await.unwrap();
    assert_eq!(session.total_messages, 4);
}
