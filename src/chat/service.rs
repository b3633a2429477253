use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::config::service::lookup_u64;
use crate::core::errors::ApiError;
use crate::history::{ConversationStore, MessageRole, StoredMessage};
use crate::index::VectorIndex;
use crate::llm::GenerationProvider;
use crate::sentiment::{SentimentResult, SentimentService};

use super::prompt::{self, SourceRef};

/// Sent in place of a model response when the pipeline fails. The caller
/// still gets a complete, well-formed result.
pub const FALLBACK_RESPONSE: &str = "I apologize, but I'm having trouble processing your request right now. Please try again in a moment, or contact our support team for immediate assistance.";

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub top_k: usize,
    pub history_window: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            history_window: 5,
        }
    }
}

impl ChatOptions {
    pub fn from_config(config: &Value) -> Self {
        let defaults = Self::default();
        Self {
            top_k: lookup_u64(config, "chat.top_k", defaults.top_k as u64) as usize,
            history_window: lookup_u64(
                config,
                "chat.history_window",
                defaults.history_window as u64,
            ) as usize,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMetadata {
    pub model: String,
    pub timestamp: String,
    pub organization_id: String,
    pub context_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub sentiment: SentimentResult,
    pub conversation_id: String,
    pub metadata: ChatMetadata,
}

/// Events emitted on the streaming path. `Done` closes a successful stream
/// and carries everything the batch result would have; `Error` closes a
/// failed one. Tokens already delivered are not retracted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token {
        token: String,
    },
    Done {
        response: String,
        conversation_id: String,
        sources: Vec<SourceRef>,
        sentiment: SentimentResult,
    },
    Error {
        message: String,
    },
}

/// Per-tenant chat pipeline: sentiment, retrieval, prompt assembly,
/// generation, history bookkeeping. Owns every conversation write so that
/// failed turns are guaranteed to leave history untouched.
#[derive(Clone)]
pub struct ChatService {
    organization_id: String,
    index: VectorIndex,
    sentiment: SentimentService,
    provider: Arc<dyn GenerationProvider>,
    conversations: Arc<dyn ConversationStore>,
    options: ChatOptions,
}

impl ChatService {
    pub fn new(
        organization_id: &str,
        index: VectorIndex,
        sentiment: SentimentService,
        provider: Arc<dyn GenerationProvider>,
        conversations: Arc<dyn ConversationStore>,
        options: ChatOptions,
    ) -> Self {
        Self {
            organization_id: organization_id.to_string(),
            index,
            sentiment,
            provider,
            conversations,
            options,
        }
    }

    /// Runs one complete turn. Never returns an error: any pipeline failure
    /// resolves to the apology response with `metadata.error` set, a fresh
    /// conversation id, and no history write.
    ///
    /// History comes from `history` when the caller manages it, otherwise
    /// from the conversation store under `conversation_id`.
    pub async fn chat(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        history: Option<&[StoredMessage]>,
    ) -> ChatResult {
        let sentiment = self.sentiment.analyze(message).await;

        match self
            .run_pipeline(message, conversation_id, history, &sentiment)
            .await
        {
            Ok(result) => {
                if let Err(err) = self
                    .record_turn(&result.conversation_id, message, &result.response)
                    .await
                {
                    tracing::warn!("failed to record conversation turn: {}", err);
                }
                result
            }
            Err(err) => {
                tracing::error!("chat pipeline failed: {}", err);
                self.error_result(sentiment, err.to_string())
            }
        }
    }

    /// Streaming variant of [`chat`](Self::chat), with the same history
    /// override. The returned receiver yields `Token` events as the model
    /// produces text, then exactly one `Done` or `Error`. Dropping the
    /// receiver cancels the turn; a cancelled or failed turn writes no
    /// history.
    pub async fn chat_stream(
        &self,
        message: String,
        conversation_id: Option<String>,
        history: Option<Vec<StoredMessage>>,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let service = self.clone();

        tokio::spawn(async move {
            service
                .stream_pipeline(message, conversation_id, history, tx)
                .await;
        });

        rx
    }

    async fn run_pipeline(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        history: Option<&[StoredMessage]>,
        sentiment: &SentimentResult,
    ) -> Result<ChatResult, ApiError> {
        let documents = self.index.search(message, self.options.top_k, None).await?;
        let context = prompt::build_context(&documents);

        let fetched;
        let turns: &[StoredMessage] = match history {
            Some(turns) => turns,
            None => {
                fetched = match conversation_id {
                    Some(id) => self.conversations.history(id).await?,
                    None => Vec::new(),
                };
                &fetched
            }
        };

        let messages = prompt::prepare_messages(
            message,
            &context,
            turns,
            sentiment,
            self.options.history_window,
        );
        let response = self.provider.generate(&messages).await?;

        Ok(ChatResult {
            response,
            sources: prompt::format_sources(&documents),
            sentiment: sentiment.clone(),
            conversation_id: conversation_id
                .map(str::to_string)
                .unwrap_or_else(prompt::generate_conversation_id),
            metadata: ChatMetadata {
                model: self.provider.model().to_string(),
                timestamp: Utc::now().to_rfc3339(),
                organization_id: self.organization_id.clone(),
                context_used: !documents.is_empty(),
                error: None,
            },
        })
    }

    async fn stream_pipeline(
        self,
        message: String,
        conversation_id: Option<String>,
        history: Option<Vec<StoredMessage>>,
        tx: mpsc::Sender<StreamEvent>,
    ) {
        let sentiment = self.sentiment.analyze(&message).await;
        let conversation_id = conversation_id.unwrap_or_else(prompt::generate_conversation_id);

        let prepared = async {
            let documents = self.index.search(&message, self.options.top_k, None).await?;
            let history = match history {
                Some(turns) => turns,
                None => self.conversations.history(&conversation_id).await?,
            };
            Ok::<_, ApiError>((documents, history))
        }
        .await;

        let (documents, history) = match prepared {
            Ok(parts) => parts,
            Err(err) => {
                tracing::error!("chat stream setup failed: {}", err);
                let _ = tx
                    .send(StreamEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
                return;
            }
        };

        let context = prompt::build_context(&documents);
        let messages = prompt::prepare_messages(
            &message,
            &context,
            &history,
            &sentiment,
            self.options.history_window,
        );

        let mut tokens = match self.provider.generate_stream(&messages).await {
            Ok(rx) => rx,
            Err(err) => {
                tracing::error!("chat stream start failed: {}", err);
                let _ = tx
                    .send(StreamEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
                return;
            }
        };

        let mut response = String::new();
        while let Some(item) = tokens.recv().await {
            match item {
                Ok(token) => {
                    response.push_str(&token);
                    if tx.send(StreamEvent::Token { token }).await.is_err() {
                        // Caller hung up mid-stream; abandon the turn.
                        return;
                    }
                }
                Err(err) => {
                    tracing::error!("generation stream failed: {}", err);
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: err.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }

        // The provider finished cleanly, so the turn counts even if the
        // Done event no longer has a listener.
        if let Err(err) = self
            .record_turn(&conversation_id, &message, &response)
            .await
        {
            tracing::warn!("failed to record conversation turn: {}", err);
        }

        let _ = tx
            .send(StreamEvent::Done {
                response,
                conversation_id,
                sources: prompt::format_sources(&documents),
                sentiment,
            })
            .await;
    }

    async fn record_turn(
        &self,
        conversation_id: &str,
        message: &str,
        response: &str,
    ) -> Result<(), ApiError> {
        self.conversations
            .append(conversation_id, MessageRole::User, message)
            .await?;
        self.conversations
            .append(conversation_id, MessageRole::Assistant, response)
            .await
    }

    fn error_result(&self, sentiment: SentimentResult, error: String) -> ChatResult {
        ChatResult {
            response: FALLBACK_RESPONSE.to_string(),
            sources: Vec::new(),
            sentiment,
            conversation_id: prompt::generate_conversation_id(),
            metadata: ChatMetadata {
                model: self.provider.model().to_string(),
                timestamp: Utc::now().to_rfc3339(),
                organization_id: self.organization_id.clone(),
                context_used: false,
                error: Some(error),
            },
        }
    }
}
