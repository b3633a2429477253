//! Per-tenant service handles.
//!
//! Tenants share one document store, one conversation store, and one set of
//! model providers; what differs per tenant is the collection scoping. The
//! registry builds a tenant's [`VectorIndex`] and [`ChatService`] lazily on
//! first use and keeps a bounded cache of them, evicting the least recently
//! used handle when the bound is exceeded. Eviction only drops the cached
//! handle; the tenant's documents stay in the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::chat::{ChatOptions, ChatService};
use crate::core::config::service::lookup_u64;
use crate::embedding::EmbeddingService;
use crate::history::ConversationStore;
use crate::index::{DocumentStore, VectorIndex};
use crate::llm::GenerationProvider;
use crate::sentiment::SentimentService;

const DEFAULT_MAX_CACHED: usize = 64;

pub struct TenantHandle {
    pub index: VectorIndex,
    pub chat: ChatService,
}

struct Entry {
    handle: Arc<TenantHandle>,
    last_used: Instant,
}

pub struct TenantRegistry {
    store: Arc<dyn DocumentStore>,
    embeddings: EmbeddingService,
    sentiment: SentimentService,
    provider: Arc<dyn GenerationProvider>,
    conversations: Arc<dyn ConversationStore>,
    chat_options: ChatOptions,
    capacity: usize,
    entries: RwLock<HashMap<String, Entry>>,
}

impl TenantRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embeddings: EmbeddingService,
        sentiment: SentimentService,
        provider: Arc<dyn GenerationProvider>,
        conversations: Arc<dyn ConversationStore>,
        chat_options: ChatOptions,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            embeddings,
            sentiment,
            provider,
            conversations,
            chat_options,
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity_from_config(config: &Value) -> usize {
        lookup_u64(config, "tenants.max_cached", DEFAULT_MAX_CACHED as u64) as usize
    }

    /// Returns the tenant's handle, building and caching it on first use.
    /// Handles already checked out stay valid after eviction.
    pub async fn get_or_create(&self, organization_id: &str) -> Arc<TenantHandle> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(organization_id) {
            entry.last_used = Instant::now();
            return entry.handle.clone();
        }

        tracing::debug!("creating tenant handle for {}", organization_id);
        let handle = Arc::new(self.build_handle(organization_id));
        entries.insert(
            organization_id.to_string(),
            Entry {
                handle: handle.clone(),
                last_used: Instant::now(),
            },
        );

        if entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .filter(|(id, _)| id.as_str() != organization_id)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                entries.remove(&id);
                tracing::debug!("evicted cached tenant handle for {}", id);
            }
        }

        handle
    }

    fn build_handle(&self, organization_id: &str) -> TenantHandle {
        let index = VectorIndex::new(
            self.store.clone(),
            self.embeddings.clone(),
            organization_id,
        );
        let chat = ChatService::new(
            organization_id,
            index.clone(),
            self.sentiment.clone(),
            self.provider.clone(),
            self.conversations.clone(),
            self.chat_options.clone(),
        );
        TenantHandle { index, chat }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::core::errors::ApiError;
    use crate::embedding::{EmbeddingOptions, EmbeddingProvider};
    use crate::history::MemoryConversationStore;
    use crate::index::SqliteDocumentStore;
    use crate::llm::PromptMessage;
    use crate::sentiment::{SentimentClassifier, SentimentConfig, SentimentLabel};

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn model(&self) -> &str {
            "stub-embedder"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn vectorize(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct StubClassifier;

    #[async_trait]
    impl SentimentClassifier for StubClassifier {
        fn model(&self) -> &str {
            "stub-classifier"
        }

        async fn classify(&self, _text: &str) -> Result<(SentimentLabel, f32), ApiError> {
            Ok((SentimentLabel::Positive, 0.5))
        }
    }

    struct StubGenerator;

    #[async_trait]
    impl GenerationProvider for StubGenerator {
        fn model(&self) -> &str {
            "stub-chat"
        }

        async fn generate(&self, _messages: &[PromptMessage]) -> Result<String, ApiError> {
            Ok("ok".to_string())
        }

        async fn generate_stream(
            &self,
            _messages: &[PromptMessage],
        ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    async fn test_registry(capacity: usize) -> TenantRegistry {
        let tmp = std::env::temp_dir().join(format!(
            "ansera-tenants-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let store = Arc::new(SqliteDocumentStore::with_path(tmp).await.unwrap());
        TenantRegistry::new(
            store,
            EmbeddingService::new(Arc::new(StubEmbedder), EmbeddingOptions::default()),
            SentimentService::new(Arc::new(StubClassifier), SentimentConfig::default()),
            Arc::new(StubGenerator),
            Arc::new(MemoryConversationStore::new()),
            ChatOptions::default(),
            capacity,
        )
    }

    #[tokio::test]
    async fn same_tenant_reuses_the_cached_handle() {
        let registry = test_registry(4).await;

        let first = registry.get_or_create("acme").await;
        let second = registry.get_or_create("acme").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.index.organization_id(), "acme");
    }

    #[tokio::test]
    async fn distinct_tenants_get_distinct_handles() {
        let registry = test_registry(4).await;

        let alpha = registry.get_or_create("alpha").await;
        let beta = registry.get_or_create("beta").await;

        assert!(!Arc::ptr_eq(&alpha, &beta));
        assert_eq!(alpha.index.organization_id(), "alpha");
        assert_eq!(beta.index.organization_id(), "beta");
    }

    #[tokio::test]
    async fn over_capacity_evicts_the_least_recently_used() {
        let registry = test_registry(2).await;

        let alpha_first = registry.get_or_create("alpha").await;
        let beta_first = registry.get_or_create("beta").await;

        // Touch alpha so beta becomes the eviction candidate.
        registry.get_or_create("alpha").await;
        registry.get_or_create("gamma").await;

        let alpha_again = registry.get_or_create("alpha").await;
        assert!(Arc::ptr_eq(&alpha_first, &alpha_again));

        let beta_again = registry.get_or_create("beta").await;
        assert!(!Arc::ptr_eq(&beta_first, &beta_again));
    }
}
