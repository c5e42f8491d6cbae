use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use nanoid::nanoid;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::SessionConfig;
use crate::error::{Result, TurBotError};
use crate::models::{
    ConversationMessage, ExtractedEntity, MessageRole, SessionContext, TrackedEntity, UserType,
};

/// Hybrid conversation memory: a bounded ring of verbatim recent turns plus
/// a long-term entity map, persisted one JSON file per session.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write never leaves a partial record. Each session is logically
/// single-writer: callers serialize requests through [`SessionStore::session_lock`].
pub struct SessionStore {
    storage_path: PathBuf,
    recent_turns: usize,
    max_idle_hours: i64,
    cache: Mutex<HashMap<String, SessionContext>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let storage_path = PathBuf::from(&config.storage_path);
        std::fs::create_dir_all(&storage_path)?;

        Ok(Self {
            storage_path,
            recent_turns: config.recent_turns.max(1),
            max_idle_hours: config.max_idle_hours,
            cache: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Per-session lock serializing concurrent requests on one session.
    /// Different sessions proceed in parallel.
    pub async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn create(&self, user_type: UserType, user_hint: Option<&str>) -> Result<String> {
        let session_id = nanoid!();
        let mut context = SessionContext::new(session_id.clone(), user_type);
        if let Some(hint) = user_hint.filter(|h| !h.trim().is_empty()) {
            context
                .extra
                .insert("user_hint".to_string(), Value::String(hint.to_string()));
        }
        self.persist(&context).await?;
        self.cache
            .lock()
            .await
            .insert(session_id.clone(), context);

        tracing::info!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    /// Load a session, creating a fresh one on miss. A corrupt or
    /// unreadable record also falls through to a fresh session: reads never
    /// fail the request.
    pub async fn load(&self, session_id: &str) -> Result<SessionContext> {
        validate_session_id(session_id)?;

        if let Some(context) = self.cache.lock().await.get(session_id) {
            return Ok(context.clone());
        }

        let path = self.session_file(session_id);
        let context = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<SessionContext>(&bytes) {
                Ok(context) => context,
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "Corrupt session record, starting fresh");
                    SessionContext::new(session_id.to_string(), UserType::Client)
                }
            },
            Err(_) => SessionContext::new(session_id.to_string(), UserType::Client),
        };

        self.cache
            .lock()
            .await
            .insert(session_id.to_string(), context.clone());
        Ok(context)
    }

    pub async fn active_view(&self, session_id: &str) -> Result<HashMap<String, Value>> {
        Ok(self.load(session_id).await?.active_entities)
    }

    /// Commit one full turn: the user message (with its extracted
    /// entities) and the assistant response (with its citations) land in a
    /// single atomic mutation. Nothing is persisted before this point, so a
    /// cancelled request leaves the on-disk record untouched.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_turn(
        &self,
        session_id: &str,
        user_content: &str,
        entities: &[ExtractedEntity],
        assistant_content: &str,
        sources: &[String],
        confidence: f32,
    ) -> Result<()> {
        let mut context = self.load(session_id).await?;
        let now = Utc::now();

        let mut entity_values: HashMap<String, Value> = HashMap::new();
        for entity in entities {
            entity_values.insert(entity.kind.to_string(), entity.value.clone());
        }

        let user_message_id = nanoid!();
        merge_entities(&mut context, entities, &user_message_id, now);

        context.recent_messages.push(ConversationMessage {
            message_id: user_message_id,
            role: MessageRole::User,
            content: user_content.to_string(),
            timestamp: now,
            entities: entity_values,
            sources: Vec::new(),
            confidence: None,
        });
        context.recent_messages.push(ConversationMessage {
            message_id: nanoid!(),
            role: MessageRole::Assistant,
            content: assistant_content.to_string(),
            timestamp: now,
            entities: HashMap::new(),
            sources: sources.to_vec(),
            confidence: Some(confidence),
        });
        context.total_messages += 2;

        // Evict beyond the ring: raw text is dropped, entities stay merged.
        let max_messages = self.recent_turns * 2;
        while context.recent_messages.len() > max_messages {
            let evicted = context.recent_messages.remove(0);
            archive_message(&mut context, &evicted, now);
        }

        context.last_updated = now;

        self.persist(&context).await?;
        self.cache
            .lock()
            .await
            .insert(session_id.to_string(), context);

        tracing::debug!(session_id, "Turn committed");
        Ok(())
    }

    pub async fn reset(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;

        self.cache.lock().await.remove(session_id);

        let path = self.session_file(session_id);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }

        tracing::info!(session_id, "Session reset");
        Ok(())
    }

    /// Drop sessions idle past the configured age. Running the sweep twice
    /// produces the same outcome as running it once.
    pub async fn janitor_sweep(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::hours(self.max_idle_hours);
        let mut removed = 0u64;

        let mut entries = tokio::fs::read_dir(&self.storage_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let last_updated = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<SessionContext>(&bytes)
                    .map(|c| c.last_updated)
                    .ok(),
                Err(_) => None,
            };

            let expired = match last_updated {
                Some(ts) => ts < cutoff,
                // Unreadable records are dead weight either way
                None => true,
            };

            if expired {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove session file");
                    continue;
                }

                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    self.cache.lock().await.remove(stem);
                    self.locks.lock().await.remove(stem);
                }
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Janitor swept idle sessions");
        }
        Ok(removed)
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        self.storage_path.join(format!("{session_id}.json"))
    }

    /// Write-to-temp-then-rename: the commit is atomic at the filesystem
    /// level.
    async fn persist(&self, context: &SessionContext) -> Result<()> {
        let path = self.session_file(&context.session_id);
        let tmp_path = self.storage_path.join(format!(
            ".{}.tmp",
            context.session_id
        ));

        let bytes = serde_json::to_vec_pretty(context)?;
        tokio::fs::write(&tmp_path, &bytes).await.map_err(|e| {
            TurBotError::Session(format!("Failed to write session record: {e}"))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            TurBotError::Session(format!("Failed to commit session record: {e}"))
        })?;

        Ok(())
    }
}

fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty()
        || session_id.contains('/')
        || session_id.contains('\\')
        || session_id.contains("..")
    {
        return Err(TurBotError::Validation(format!(
            "Invalid session id: {session_id}"
        )));
    }
    Ok(())
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => a == b,
    }
}

/// Apply the entity merge rules for one new user message.
///
/// Same kind + same value increments the mention count. On a conflicting
/// value the kind decides: sticky kinds (budget, dates, group) keep the
/// established value in force and record the new one as a secondary; every
/// other kind hands the active slot to the latest mention, with singleton
/// kinds (destination) keeping the displaced value as history. Kinds absent
/// from this message inherit their active value unchanged.
fn merge_entities(
    context: &mut SessionContext,
    entities: &[ExtractedEntity],
    message_id: &str,
    now: DateTime<Utc>,
) {
    for entity in entities {
        let key = entity.kind.to_string();

        let active_value = match context.entity_map.get_mut(&key) {
            Some(existing) if values_equal(&existing.value, &entity.value) => {
                existing.mention_count += 1;
                existing.last_seen = now;
                existing.confidence = existing.confidence.max(entity.confidence);
                existing.source_messages.push(message_id.to_string());
                existing.value.clone()
            }
            Some(existing) if entity.kind.is_sticky() => {
                existing.mention_count += 1;
                existing.last_seen = now;
                existing.source_messages.push(message_id.to_string());
                if !existing
                    .secondary_values
                    .iter()
                    .any(|v| values_equal(v, &entity.value))
                {
                    existing.secondary_values.push(entity.value.clone());
                }
                existing.value.clone()
            }
            Some(existing) => {
                let old_value = std::mem::replace(&mut existing.value, entity.value.clone());
                if entity.kind.is_singleton() {
                    existing.previous_values.push(old_value);
                }
                existing.mention_count += 1;
                existing.last_seen = now;
                existing.confidence = entity.confidence;
                existing.source_messages.push(message_id.to_string());
                entity.value.clone()
            }
            None => {
                context.entity_map.insert(
                    key.clone(),
                    TrackedEntity {
                        kind: entity.kind,
                        value: entity.value.clone(),
                        confidence: entity.confidence,
                        first_seen: now,
                        last_seen: now,
                        mention_count: 1,
                        source_messages: vec![message_id.to_string()],
                        previous_values: Vec::new(),
                        secondary_values: Vec::new(),
                    },
                );
                entity.value.clone()
            }
        };

        context.active_entities.insert(key, active_value);
    }
}

/// A message leaving the recent ring loses its raw text but feeds its
/// entities back into the long-term map.
fn archive_message(context: &mut SessionContext, message: &ConversationMessage, now: DateTime<Utc>) {
    for (key, value) in &message.entities {
        match context.entity_map.get_mut(key) {
            Some(existing) => {
                existing.mention_count += 1;
                existing.last_seen = now;
            }
            None => {
                let Ok(kind) = key.parse() else {
                    continue;
                };
                context.entity_map.insert(
                    key.clone(),
                    TrackedEntity {
                        kind,
                        value: value.clone(),
                        confidence: 0.8,
                        first_seen: message.timestamp,
                        last_seen: now,
                        mention_count: 1,
                        source_messages: vec![message.message_id.clone()],
                        previous_values: Vec::new(),
                        secondary_values: Vec::new(),
                    },
                );
            }
        }
    }
}
