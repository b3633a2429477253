//! The retrieval-augmented chat pipeline.
//!
//! One turn flows sentiment → retrieval → prompt → generation, then lands
//! in conversation history. [`ChatService`] drives the whole sequence and
//! absorbs failures into a well-formed fallback result, so callers never
//! see a raw pipeline error.

mod prompt;
mod service;

pub use prompt::{
    build_context, format_sources, generate_conversation_id, prepare_messages, SourceRef,
    NO_CONTEXT_MARKER, SYSTEM_PROMPT,
};
pub use service::{
    ChatMetadata, ChatOptions, ChatResult, ChatService, StreamEvent, FALLBACK_RESPONSE,
};
