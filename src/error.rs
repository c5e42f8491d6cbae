use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TurBotError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API rate limit exceeded, retry after {retry_after:?} seconds")]
    ApiRateLimit { retry_after: Option<u64> },

    #[error("API authentication error: {0}")]
    ApiAuth(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("Stage timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for TurBotError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            TurBotError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            TurBotError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            TurBotError::Database(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            TurBotError::Embedding(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            TurBotError::Processing(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            TurBotError::Session(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            TurBotError::Http(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            TurBotError::Json(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            TurBotError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            TurBotError::ApiRateLimit { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            TurBotError::ApiAuth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            TurBotError::Llm(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            TurBotError::LlmUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            TurBotError::LlmRateLimit { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("LLM rate limit exceeded, retry after {retry_after:?} seconds"),
            ),
            TurBotError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            TurBotError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, TurBotError>;
