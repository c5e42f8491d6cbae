use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/chat", post(handlers::chat))
        .route("/documents/upload", post(handlers::upload_document))
        .route("/documents/list", get(handlers::list_documents))
        .route("/documents/stats", get(handlers::collection_stats))
        .route("/documents/{filename}", delete(handlers::delete_document))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{session_id}/reset", post(handlers::reset_session))
        .route(
            "/sessions/{session_id}/filters",
            get(handlers::active_filters),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
