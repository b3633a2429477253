//! Chat completion providers behind the [`GenerationProvider`] trait.

mod openai;
mod provider;

pub use openai::{GenerationOptions, OpenAiChatProvider};
pub use provider::{GenerationProvider, PromptMessage};
