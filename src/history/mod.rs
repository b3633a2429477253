//! Conversation history.
//!
//! Turns are kept in process memory behind the [`ConversationStore`] trait;
//! a durable log can slot in behind the same trait without touching the
//! chat pipeline. Only completed turns land here, so a restart loses
//! context but never records a half-finished exchange.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub message_count: usize,
    pub last_activity: DateTime<Utc>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends one turn, creating the conversation on first use. The
    /// timestamp is assigned here, not by the caller.
    async fn append(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ApiError>;

    /// Full history in append order. Unknown conversations read as empty.
    async fn history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, ApiError>;

    /// Removes a conversation, reporting whether it existed.
    async fn delete(&self, conversation_id: &str) -> Result<bool, ApiError>;

    /// One summary per conversation, most recently active first.
    async fn summaries(&self) -> Result<Vec<ConversationSummary>, ApiError>;
}

#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ApiError> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.to_string())
            .or_default()
            .push(StoredMessage {
                role,
                content: content.to_string(),
                timestamp: Utc::now(),
            });
        Ok(())
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, ApiError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool, ApiError> {
        let mut conversations = self.conversations.write().await;
        Ok(conversations.remove(conversation_id).is_some())
    }

    async fn summaries(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        let conversations = self.conversations.read().await;
        let mut summaries: Vec<ConversationSummary> = conversations
            .iter()
            .map(|(id, messages)| ConversationSummary {
                conversation_id: id.clone(),
                message_count: messages.len(),
                last_activity: messages
                    .last()
                    .map(|m| m.timestamp)
                    .unwrap_or_else(Utc::now),
            })
            .collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }
}
