use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;

use crate::chat::StreamEvent;
use crate::core::errors::ApiError;
use crate::server::handlers::utils::require_field;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub organization_id: Option<String>,
    pub conversation_id: Option<String>,
}

/// An absent `message` is a caller error, but an empty one is not; the
/// pipeline resolves empty input itself and still produces a full result.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = payload
        .message
        .ok_or_else(|| ApiError::BadRequest("message is required".to_string()))?;
    let organization_id = require_field(payload.organization_id.as_deref(), "organization_id")?;

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let result = tenant
        .chat
        .chat(&message, payload.conversation_id.as_deref(), None)
        .await;
    Ok(Json(result))
}

/// Same body as [`send_message`], answered as an SSE stream of pipeline
/// events: `token` frames while the model produces text, then one `done`
/// or `error`.
pub async fn stream_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let message = payload
        .message
        .ok_or_else(|| ApiError::BadRequest("message is required".to_string()))?;
    let organization_id = require_field(payload.organization_id.as_deref(), "organization_id")?;

    let tenant = state.tenants.get_or_create(&organization_id).await;
    let events = tenant.chat.chat_stream(message, payload.conversation_id, None).await;

    let stream = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        Some((Ok::<_, Infallible>(to_sse_event(&event)), events))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &StreamEvent) -> Event {
    match Event::default().json_data(event) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::error!("failed to serialize stream event: {}", err);
            Event::default().data(r#"{"type":"error","message":"internal serialization error"}"#)
        }
    }
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.conversations.summaries().await?;
    let count = conversations.len();
    Ok(Json(json!({
        "conversations": conversations,
        "count": count
    })))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.conversations.history(&conversation_id).await?;
    if messages.is_empty() {
        return Err(ApiError::NotFound("Conversation not found".to_string()));
    }

    let count = messages.len();
    Ok(Json(json!({
        "conversation_id": conversation_id,
        "messages": messages,
        "message_count": count
    })))
}

/// Deleting is idempotent: removing an unknown conversation still reports
/// success.
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let _ = state.conversations.delete(&conversation_id).await?;
    Ok(Json(json!({
        "status": "deleted",
        "conversation_id": conversation_id
    })))
}
