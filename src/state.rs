use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;

use crate::chat::ChatOptions;
use crate::core::config::service::{lookup_f64, lookup_str, lookup_u64};
use crate::core::config::{AppPaths, ConfigService};
use crate::embedding::{EmbeddingOptions, EmbeddingService, OpenAiEmbeddings};
use crate::history::{ConversationStore, MemoryConversationStore};
use crate::index::{DocumentStore, SqliteDocumentStore};
use crate::llm::{GenerationOptions, GenerationProvider, OpenAiChatProvider};
use crate::sentiment::{HfSentimentClassifier, SentimentConfig, SentimentService};
use crate::tenants::TenantRegistry;

/// Global application state shared across all routes.
///
/// Holds the merged configuration snapshot, the shared conversation store,
/// and the tenant registry through which every tenant-scoped service is
/// reached.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Value,
    pub conversations: Arc<dyn ConversationStore>,
    pub tenants: TenantRegistry,
}

impl AppState {
    /// Builds the full service graph: paths and configuration, the SQLite
    /// document store, the model providers, and the tenant registry wired
    /// over all of them.
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let settings = config.load_config();
        crate::logging::init(&paths);

        let store: Arc<dyn DocumentStore> = Arc::new(
            SqliteDocumentStore::new(paths.as_ref())
                .await
                .context("failed to open document index")?,
        );

        let openai_key = resolve_api_key(&settings, "providers.openai.api_key", "OPENAI_API_KEY");
        if openai_key.is_empty() {
            tracing::warn!("OPENAI_API_KEY is not configured; embedding and chat calls will fail");
        }

        let embeddings = build_embedding_service(&settings, &openai_key);
        let sentiment = build_sentiment_service(&settings);
        let provider = build_generation_provider(&settings, &openai_key);
        let conversations: Arc<dyn ConversationStore> = Arc::new(MemoryConversationStore::new());

        let tenants = TenantRegistry::new(
            store,
            embeddings,
            sentiment,
            provider,
            conversations.clone(),
            ChatOptions::from_config(&settings),
            TenantRegistry::capacity_from_config(&settings),
        );

        Ok(Arc::new(AppState {
            paths,
            settings,
            conversations,
            tenants,
        }))
    }
}

fn build_embedding_service(settings: &Value, api_key: &str) -> EmbeddingService {
    let provider = OpenAiEmbeddings::new(
        openai_base_url(settings),
        api_key.to_string(),
        lookup_str(
            settings,
            "providers.openai.embedding_model",
            "text-embedding-3-small",
        ),
        lookup_u64(settings, "providers.openai.embedding_dimensions", 1536) as usize,
        openai_timeout(settings),
    );
    EmbeddingService::new(Arc::new(provider), EmbeddingOptions::from_config(settings))
}

fn build_sentiment_service(settings: &Value) -> SentimentService {
    let api_token = resolve_api_key(settings, "providers.sentiment.api_key", "HF_API_TOKEN");
    if api_token.is_empty() {
        tracing::warn!("no sentiment API token configured; analysis will fall back to neutral");
    }

    let classifier = HfSentimentClassifier::new(
        &lookup_str(
            settings,
            "providers.sentiment.base_url",
            "https://api-inference.huggingface.co",
        ),
        &api_token,
        &lookup_str(
            settings,
            "providers.sentiment.model",
            "distilbert-base-uncased-finetuned-sst-2-english",
        ),
        Duration::from_secs(lookup_u64(
            settings,
            "providers.sentiment.request_timeout_secs",
            30,
        )),
    );
    SentimentService::new(Arc::new(classifier), SentimentConfig::from_config(settings))
}

fn build_generation_provider(settings: &Value, api_key: &str) -> Arc<dyn GenerationProvider> {
    let defaults = GenerationOptions::default();
    let options = GenerationOptions {
        temperature: lookup_f64(
            settings,
            "chat.temperature",
            f64::from(defaults.temperature),
        ) as f32,
        max_tokens: lookup_u64(settings, "chat.max_tokens", u64::from(defaults.max_tokens)) as u32,
    };

    Arc::new(OpenAiChatProvider::new(
        &openai_base_url(settings),
        api_key,
        &lookup_str(settings, "providers.openai.chat_model", "gpt-4-turbo-preview"),
        options,
        openai_timeout(settings),
    ))
}

fn openai_base_url(settings: &Value) -> String {
    lookup_str(
        settings,
        "providers.openai.base_url",
        "https://api.openai.com/v1",
    )
}

fn openai_timeout(settings: &Value) -> Duration {
    Duration::from_secs(lookup_u64(
        settings,
        "providers.openai.request_timeout_secs",
        60,
    ))
}

// Environment wins over config so deployments can rotate keys without
// touching the settings file.
fn resolve_api_key(settings: &Value, config_path: &str, env_var: &str) -> String {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    lookup_str(settings, config_path, "")
}
