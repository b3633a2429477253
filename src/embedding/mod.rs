//! Embedding gateway: provider access with retry, batching, and the
//! vector-similarity helpers used by retrieval.

mod provider;
mod service;

pub use provider::{EmbeddingProvider, OpenAiEmbeddings};
pub use service::{cosine_similarity, top_k, EmbeddingOptions, EmbeddingService};
