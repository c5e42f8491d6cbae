use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::db::VectorStore;
use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, TurBotError};
use crate::intelligence::{ContextRewriter, EntityExtractor, QueryExpander, SelfQueryParser};
use crate::llm::LlmProvider;
use crate::models::{
    Answer, AnswerEvent, ExtractedEntity, ScoredChunk, SessionContext, StructuredFilters,
};
use crate::search::Retriever;
use crate::session::SessionStore;

use super::synthesizer::{apology_answer, AnswerSynthesizer};

const EMBEDDING_DEADLINE: Duration = Duration::from_secs(5);
const SEARCH_DEADLINE: Duration = Duration::from_secs(5);
const PERSIST_DEADLINE: Duration = Duration::from_secs(2);

/// The query side of the pipeline:
/// session load -> entity extraction -> context rewrite -> self-query parse
/// -> expansion -> retrieval -> synthesis -> session commit.
///
/// Requests on one session serialize behind its lock; the session is
/// committed exactly once, after synthesis, so a cancelled request leaves
/// the stored state untouched.
#[derive(Clone)]
pub struct ChatService {
    sessions: Arc<SessionStore>,
    extractor: EntityExtractor,
    rewriter: ContextRewriter,
    parser: SelfQueryParser,
    expander: QueryExpander,
    embeddings: EmbeddingProvider,
    retriever: Arc<Retriever>,
    synthesizer: AnswerSynthesizer,
}

struct PipelineOutput {
    rewritten_text: String,
    filters: StructuredFilters,
    chunks: Vec<ScoredChunk>,
    entities: Vec<ExtractedEntity>,
}

impl ChatService {
    pub fn new(
        sessions: Arc<SessionStore>,
        store: Arc<dyn VectorStore>,
        embeddings: EmbeddingProvider,
        llm: LlmProvider,
        config: &Config,
    ) -> Self {
        Self {
            sessions,
            extractor: EntityExtractor::new(llm.clone()),
            rewriter: ContextRewriter::new(llm.clone()),
            parser: SelfQueryParser::new(llm.clone()),
            expander: QueryExpander::new(llm.clone(), config.retrieval.expansion_cache_size),
            embeddings,
            retriever: Arc::new(Retriever::new(store, &config.retrieval)),
            synthesizer: AnswerSynthesizer::new(llm),
        }
    }

    /// Batch query. The caller always receives a valid answer, a truthful
    /// "no information" answer, or a graceful apology; the only hard error
    /// besides input validation is a failed commit.
    pub async fn query(&self, session_id: &str, utterance: &str) -> Result<Answer> {
        if utterance.trim().is_empty() {
            return Err(TurBotError::Validation("Message cannot be empty".to_string()));
        }

        let lock = self.sessions.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self.sessions.load(session_id).await?;

        let output = match self.run_pipeline(utterance, &session).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(session_id, error = %e, "Query pipeline failed");
                return Ok(apology_answer(&StructuredFilters::default()));
            }
        };

        let answer = self
            .synthesizer
            .synthesize(&output.rewritten_text, &output.chunks, &output.filters)
            .await;

        self.commit(session_id, utterance, &output.entities, &answer)
            .await?;

        Ok(answer)
    }

    /// Streaming query: `Content` events followed by exactly one `Complete`
    /// or one `Error`. Dropping the receiver cancels the request before the
    /// session commit.
    pub async fn query_stream(
        &self,
        session_id: &str,
        utterance: &str,
    ) -> Result<mpsc::Receiver<AnswerEvent>> {
        if utterance.trim().is_empty() {
            return Err(TurBotError::Validation("Message cannot be empty".to_string()));
        }

        let (tx, rx) = mpsc::channel(32);
        let service = self.clone();
        let session_id = session_id.to_string();
        let utterance = utterance.to_string();

        tokio::spawn(async move {
            service.stream_task(&session_id, &utterance, tx).await;
        });

        Ok(rx)
    }

    async fn stream_task(&self, session_id: &str, utterance: &str, tx: mpsc::Sender<AnswerEvent>) {
        let lock = self.sessions.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = match self.sessions.load(session_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(session_id, error = %e, "Session load failed");
                let _ = tx
                    .send(AnswerEvent::Error {
                        message: apology_answer(&StructuredFilters::default()).response,
                    })
                    .await;
                return;
            }
        };

        let output = match self.run_pipeline(utterance, &session).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(session_id, error = %e, "Query pipeline failed");
                let _ = tx
                    .send(AnswerEvent::Error {
                        message: apology_answer(&StructuredFilters::default()).response,
                    })
                    .await;
                return;
            }
        };

        let answer = match self
            .synthesizer
            .stream(&output.rewritten_text, &output.chunks, &output.filters)
            .await
        {
            Ok(mut tokens) => {
                let mut response = String::new();
                while let Some(item) = tokens.next().await {
                    match item {
                        Ok(token) => {
                            response.push_str(&token);
                            if tx
                                .send(AnswerEvent::Content { chunk: token })
                                .await
                                .is_err()
                            {
                                // Receiver dropped: cancelled, nothing committed
                                tracing::debug!(session_id, "Stream cancelled by client");
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::error!(session_id, error = %e, "Stream failed mid-response");
                            let _ = tx
                                .send(AnswerEvent::Error {
                                    message: apology_answer(&StructuredFilters::default())
                                        .response,
                                })
                                .await;
                            return;
                        }
                    }
                }

                if output.chunks.is_empty() {
                    // Keep the no-results contract: empty citations, zero confidence
                    self.synthesizer.no_results_shell(response, &output.filters)
                } else {
                    self.synthesizer
                        .finalize(response, &output.chunks, &output.filters)
                }
            }
            Err(_) => {
                // No streaming backend: degrade to a single batch chunk
                let answer = self
                    .synthesizer
                    .synthesize(&output.rewritten_text, &output.chunks, &output.filters)
                    .await;
                if tx
                    .send(AnswerEvent::Content {
                        chunk: answer.response.clone(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                answer
            }
        };

        if let Err(e) = self
            .commit(session_id, utterance, &output.entities, &answer)
            .await
        {
            tracing::error!(session_id, error = %e, "Session commit failed");
            let _ = tx
                .send(AnswerEvent::Error {
                    message: apology_answer(&StructuredFilters::default()).response,
                })
                .await;
            return;
        }

        let response_length = answer.response.chars().count();
        let _ = tx
            .send(AnswerEvent::Complete {
                sources: answer.sources,
                suggested_questions: answer.suggested_questions,
                confidence: answer.confidence,
                total_chunks: output.chunks.len(),
                response_length,
            })
            .await;
    }

    async fn run_pipeline(
        &self,
        utterance: &str,
        session: &SessionContext,
    ) -> Result<PipelineOutput> {
        let entities = self
            .extractor
            .extract(utterance, &session.active_entities)
            .await?;

        let rewritten = self.rewriter.rewrite(utterance, session).await;
        let parsed = self.parser.parse(&rewritten).await?;
        let expanded = self.expander.expand(&rewritten.text).await;

        let embedding = with_deadline(
            EMBEDDING_DEADLINE,
            "embedding",
            self.embeddings.embed_query(&expanded),
        )
        .await?;

        let chunks = with_deadline(
            SEARCH_DEADLINE,
            "vector search",
            self.retriever.retrieve(&embedding, &parsed.filters),
        )
        .await?;

        tracing::info!(
            session_id = %session.session_id,
            chunks = chunks.len(),
            context_switch = rewritten.context_switch_detected,
            "Pipeline complete"
        );

        Ok(PipelineOutput {
            rewritten_text: rewritten.text,
            filters: parsed.filters,
            chunks,
            entities,
        })
    }

    /// The single end-of-request mutation: user message and assistant
    /// response land in one atomic commit. A failure here is the one error
    /// that surfaces as such.
    async fn commit(
        &self,
        session_id: &str,
        utterance: &str,
        entities: &[ExtractedEntity],
        answer: &Answer,
    ) -> Result<()> {
        let sources: Vec<String> = answer
            .sources
            .iter()
            .map(|s| s.document_name.clone())
            .collect();

        with_deadline(
            PERSIST_DEADLINE,
            "session commit",
            self.sessions.append_turn(
                session_id,
                utterance,
                entities,
                &answer.response,
                &sources,
                answer.confidence,
            ),
        )
        .await
    }

    /// Filters currently in force for a session, for the UI's "active
    /// filters" display.
    pub async fn active_filters(&self, session_id: &str) -> Result<StructuredFilters> {
        let session = self.sessions.load(session_id).await?;
        Ok(crate::intelligence::rewriter::filters_from_active_view(
            &session,
        ))
    }
}

async fn with_deadline<T, F>(deadline: Duration, stage: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(TurBotError::Timeout(format!(
            "{stage} exceeded {}s deadline",
            deadline.as_secs()
        ))),
    }
}
