use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

/// Binary sentiment model. `Neutral` never comes out of a classifier; it is
/// reserved for the fallback result built upstream.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    fn model(&self) -> &str;

    async fn classify(&self, text: &str) -> Result<(SentimentLabel, f32), ApiError>;
}

/// Hosted inference endpoint speaking the Hugging Face text-classification
/// shape: `{"inputs": text}` in, ranked `[{label, score}]` predictions out.
#[derive(Clone)]
pub struct HfSentimentClassifier {
    base_url: String,
    api_token: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl HfSentimentClassifier {
    pub fn new(base_url: &str, api_token: &str, model: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            model: model.to_string(),
            timeout,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl SentimentClassifier for HfSentimentClassifier {
    fn model(&self) -> &str {
        &self.model
    }

    async fn classify(&self, text: &str) -> Result<(SentimentLabel, f32), ApiError> {
        let url = format!("{}/models/{}", self.base_url, self.model);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .timeout(self.timeout)
            .json(&json!({ "inputs": text }))
            .send()
            .await
            .map_err(|e| ApiError::SentimentProvider(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::SentimentProvider(format!(
                "classifier returned {}: {}",
                status, body
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| ApiError::SentimentProvider(e.to_string()))?;

        // Predictions arrive per input, ranked by score. Some deployments
        // skip the outer nesting for single inputs.
        let prediction = if payload[0][0].is_object() {
            &payload[0][0]
        } else {
            &payload[0]
        };

        let label = match prediction["label"].as_str() {
            Some("POSITIVE") => SentimentLabel::Positive,
            Some("NEGATIVE") => SentimentLabel::Negative,
            Some(other) => {
                return Err(ApiError::SentimentProvider(format!(
                    "unexpected classifier label: {}",
                    other
                )))
            }
            None => {
                return Err(ApiError::SentimentProvider(
                    "classifier response missing label".to_string(),
                ))
            }
        };
        let score = prediction["score"].as_f64().unwrap_or_default() as f32;

        Ok((label, score))
    }
}
