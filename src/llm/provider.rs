use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::errors::ApiError;

/// One turn of the prompt in OpenAI chat format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// model identifier reported in chat metadata
    fn model(&self) -> &str;

    /// chat completion (non-streaming)
    async fn generate(&self, messages: &[PromptMessage]) -> Result<String, ApiError>;

    /// chat completion (streaming); the receiver yields text fragments in
    /// order and closes when the provider finishes or the caller hangs up
    async fn generate_stream(
        &self,
        messages: &[PromptMessage],
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;
}
