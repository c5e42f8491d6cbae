use axum::{
    extract::{Multipart, Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, TurBotError};
use crate::models::{QueryRequest, UserType};

use super::state::AppState;

pub async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let stats = state.store.stats().await?;
    Ok(Json(json!({
        "status": "healthy",
        "service": "turbot",
        "indexed_chunks": stats.total_chunks,
        "documents": stats.documents.len(),
    })))
}

/// Primary entry point: one utterance in, an answer (batch JSON) or an SSE
/// event stream out.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Response> {
    if request.stream {
        let rx = state
            .chat
            .query_stream(&request.session_id, &request.message)
            .await?;

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            let event = rx.recv().await?;
            Some((Event::default().json_data(&event), rx))
        });

        Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
    } else {
        let answer = state
            .chat
            .query(&request.session_id, &request.message)
            .await?;
        Ok(Json(answer).into_response())
    }
}

pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TurBotError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| TurBotError::Validation("Missing file name".to_string()))?;

        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(TurBotError::Validation(
                "Only PDF files are allowed".to_string(),
            ));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| TurBotError::Validation(format!("Failed to read upload: {e}")))?;

        if bytes.is_empty() {
            return Err(TurBotError::Validation("Empty file".to_string()));
        }

        let report = state.pipeline.ingest(&filename, &bytes).await?;
        return Ok(Json(serde_json::to_value(report)?));
    }

    Err(TurBotError::Validation(
        "Missing 'file' field in upload".to_string(),
    ))
}

pub async fn list_documents(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let stats = state.store.stats().await?;
    Ok(Json(json!({
        "documents": stats.documents,
        "total": stats.documents.len(),
    })))
}

pub async fn collection_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let stats = state.store.stats().await?;
    Ok(Json(serde_json::to_value(stats)?))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let deleted = state.store.delete_document(&filename).await?;
    if deleted == 0 {
        return Err(TurBotError::NotFound(format!(
            "Document not found: {filename}"
        )));
    }
    Ok(Json(json!({
        "message": format!("Document {filename} deleted"),
        "chunks_removed": deleted,
    })))
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub user_type: UserType,
    #[serde(default)]
    pub user_hint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

pub async fn create_session(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<CreateSessionResponse>> {
    // An empty body means defaults; anything else must parse
    let request: CreateSessionRequest = if body.is_empty() {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    let session_id = state
        .sessions
        .create(request.user_type, request.user_hint.as_deref())
        .await?;
    Ok(Json(CreateSessionResponse { session_id }))
}

pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.sessions.reset(&session_id).await?;
    Ok(Json(json!({ "message": "Session reset" })))
}

/// Filters currently in force for a session, for the agent dashboard's
/// "active filters" display.
pub async fn active_filters(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let filters = state.chat.active_filters(&session_id).await?;
    Ok(Json(serde_json::to_value(filters)?))
}
