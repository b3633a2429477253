use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, documents, health};
use crate::state::AppState;

/// Creates the application router.
///
/// This function sets up:
/// - Health check endpoint
/// - Chat endpoints (batch, streaming, conversation management)
/// - Document endpoints (upload, lookup, search, stats), each scoped to
///   the tenant named in the request
///
/// # Arguments
///
/// * `state` - Shared application state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/chat/message", post(chat::send_message))
        .route("/api/chat/stream", post(chat::stream_message))
        .route("/api/chat/conversations", get(chat::list_conversations))
        .route(
            "/api/chat/conversations/:conversation_id",
            get(chat::get_conversation).delete(chat::delete_conversation),
        )
        .route("/api/documents", post(documents::upload_document))
        .route("/api/documents/batch", post(documents::upload_batch))
        .route("/api/documents/search", post(documents::search_documents))
        .route("/api/documents/stats", get(documents::get_stats))
        .route(
            "/api/documents/:document_id",
            get(documents::get_document)
                .put(documents::update_document)
                .delete(documents::delete_document),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
