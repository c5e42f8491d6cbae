use std::sync::Arc;

use crate::config::Config;
use crate::db::VectorStore;
use crate::embeddings::EmbeddingProvider;
use crate::llm::LlmProvider;
use crate::processing::IngestionPipeline;
use crate::services::ChatService;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn VectorStore>,
    pub sessions: Arc<SessionStore>,
    pub chat: ChatService,
    pub pipeline: Arc<IngestionPipeline>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        sessions: Arc<SessionStore>,
        embeddings: EmbeddingProvider,
        llm: LlmProvider,
    ) -> Self {
        let config = Arc::new(config);
        let chat = ChatService::new(
            sessions.clone(),
            store.clone(),
            embeddings.clone(),
            llm.clone(),
            &config,
        );
        let pipeline = Arc::new(IngestionPipeline::new(
            store.clone(),
            embeddings,
            llm,
            &config,
        ));

        Self {
            config,
            store,
            sessions,
            chat,
            pipeline,
        }
    }
}
