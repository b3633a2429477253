use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::errors::ApiError;

/// External embedding model reached over a call interface. Implementations
/// must return one vector per input, all with the advertised dimensionality.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier reported in results and logs.
    fn model(&self) -> &str;

    /// Fixed output dimensionality of every vector this provider returns.
    fn dimensions(&self) -> usize;

    async fn vectorize(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// OpenAI-compatible `/v1/embeddings` client.
#[derive(Clone)]
pub struct OpenAiEmbeddings {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    client: Client,
}

impl OpenAiEmbeddings {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        dimensions: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dimensions,
            timeout,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn vectorize(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::EmbeddingProvider(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::EmbeddingProvider(format!(
                "embeddings request failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| ApiError::EmbeddingProvider(e.to_string()))?;

        let data = payload["data"]
            .as_array()
            .ok_or_else(|| ApiError::EmbeddingProvider("malformed embeddings response".to_string()))?;

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let vals = item["embedding"].as_array().ok_or_else(|| {
                ApiError::EmbeddingProvider("embeddings response item missing vector".to_string())
            })?;
            let vec: Vec<f32> = vals
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            embeddings.push(vec);
        }

        Ok(embeddings)
    }
}
