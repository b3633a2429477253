use serde::Serialize;
use serde_json::{Map, Value};

use crate::history::{MessageRole, StoredMessage};
use crate::index::DocumentSearchResult;
use crate::llm::PromptMessage;
use crate::sentiment::{Priority, SentimentLabel, SentimentResult};

pub const SYSTEM_PROMPT: &str = "You are a helpful AI customer support assistant. Your goal is to provide accurate, friendly, and efficient support to customers.

Guidelines:
1. ALWAYS use the provided context to answer questions when available
2. If the context doesn't contain the answer, say so politely and offer to help differently
3. Be concise but thorough - provide complete answers without unnecessary verbosity
4. For urgent/frustrated customers, be extra empathetic and prioritize quick resolution
5. Include specific steps when explaining how to do something
6. If you cite information from the context, be accurate and don't make things up
7. End with a friendly closing and ask if they need further help

Tone:
- Professional yet warm and friendly
- Patient and empathetic
- Clear and easy to understand
- Adapt tone based on customer sentiment (more empathetic for frustrated customers)

Remember: You're here to help solve problems and make customers happy!";

pub const NO_CONTEXT_MARKER: &str = "No relevant information found in the knowledge base.";

/// Source citation attached to a chat result.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub id: String,
    pub title: String,
    pub category: String,
    pub score: f32,
    pub url: Option<String>,
}

pub fn generate_conversation_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("conv_{}", &hex[..12])
}

/// Renders retrieved documents into the labeled context block the model
/// answers from. Zero results becomes an explicit marker so the model knows
/// the knowledge base came up empty instead of guessing.
pub fn build_context(documents: &[DocumentSearchResult]) -> String {
    if documents.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    let parts: Vec<String> = documents
        .iter()
        .enumerate()
        .map(|(i, result)| {
            format!(
                "[Source {}: {} (Relevance: {:.2})]\n{}\n",
                i + 1,
                metadata_str(&result.document.metadata, "title", "Untitled"),
                result.score,
                result.document.content
            )
        })
        .collect();

    parts.join("\n")
}

/// Assembles the full prompt: system instruction (with an empathy clause for
/// hot negative messages), the trailing window of history, and one final
/// user turn carrying the context plus the verbatim question.
pub fn prepare_messages(
    message: &str,
    context: &str,
    history: &[StoredMessage],
    sentiment: &SentimentResult,
    history_window: usize,
) -> Vec<PromptMessage> {
    let mut messages = Vec::new();

    let mut system = SYSTEM_PROMPT.to_string();
    if sentiment.label == SentimentLabel::Negative && sentiment.priority == Priority::High {
        system.push_str(&format!(
            "\n\nIMPORTANT: This customer is {} and needs urgent help. Be extra empathetic and prioritize quick resolution.",
            sentiment.emotion
        ));
    }
    messages.push(PromptMessage::system(system));

    let window_start = history.len().saturating_sub(history_window);
    for turn in &history[window_start..] {
        messages.push(match turn.role {
            MessageRole::User => PromptMessage::user(turn.content.clone()),
            MessageRole::Assistant => PromptMessage::assistant(turn.content.clone()),
        });
    }

    messages.push(PromptMessage::user(format!(
        "Context from knowledge base:\n{}\n\n---\n\nCustomer question: {}\n\nPlease provide a helpful response based on the context above. If the context doesn't fully answer the question, acknowledge what you can help with and what might need additional assistance.",
        context, message
    )));

    messages
}

pub fn format_sources(documents: &[DocumentSearchResult]) -> Vec<SourceRef> {
    documents
        .iter()
        .map(|result| SourceRef {
            id: result.document.id.clone(),
            title: metadata_str(&result.document.metadata, "title", "Untitled"),
            category: metadata_str(&result.document.metadata, "category", "general"),
            score: result.score,
            url: result
                .document
                .metadata
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect()
}

fn metadata_str(metadata: &Map<String, Value>, key: &str, default: &str) -> String {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}
