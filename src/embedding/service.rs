use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::config::service::lookup_u64;
use crate::core::errors::ApiError;
use crate::text;

use super::provider::EmbeddingProvider;

/// Tuning knobs for the gateway. Defaults mirror the reference provider
/// limits: 100 inputs per batch call, 3 attempts with 1s/2s/4s backoff, and
/// a 32,000-character input ceiling (about 8,000 tokens).
#[derive(Debug, Clone)]
pub struct EmbeddingOptions {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub batch_size: usize,
    pub max_input_chars: usize,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            batch_size: 100,
            max_input_chars: 32_000,
        }
    }
}

impl EmbeddingOptions {
    pub fn from_config(config: &Value) -> Self {
        let defaults = Self::default();
        Self {
            max_retries: lookup_u64(config, "embedding.max_retries", defaults.max_retries as u64)
                as u32,
            retry_base_delay: defaults.retry_base_delay,
            batch_size: lookup_u64(config, "embedding.batch_size", defaults.batch_size as u64)
                as usize,
            max_input_chars: lookup_u64(
                config,
                "embedding.max_input_chars",
                defaults.max_input_chars as u64,
            ) as usize,
        }
    }
}

/// Wraps the embedding provider with input cleanup, bounded retry, and batch
/// chunking. All vectorization in the crate goes through here so the
/// dimensionality guarantee is checked in one place.
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    options: EmbeddingOptions,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: EmbeddingOptions) -> Self {
        Self { provider, options }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embeds one text. Retries transient provider failures with exponential
    /// backoff before giving up; an empty input after cleanup is a caller
    /// error and is never retried.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let normalized = text::normalize(text, self.options.max_input_chars);
        if normalized.is_empty() {
            return Err(ApiError::EmptyInput(
                "cannot embed empty or whitespace-only text".to_string(),
            ));
        }

        let mut last_err: Option<ApiError> = None;
        for attempt in 0..self.options.max_retries {
            if attempt > 0 {
                let delay = self.options.retry_base_delay * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            match self.vectorize_checked(std::slice::from_ref(&normalized)).await {
                Ok(mut vectors) => match vectors.pop() {
                    Some(vector) => return Ok(vector),
                    None => {
                        last_err = Some(ApiError::EmbeddingProvider(
                            "provider returned no vectors".to_string(),
                        ));
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        "embedding attempt {}/{} failed: {}",
                        attempt + 1,
                        self.options.max_retries,
                        err
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ApiError::EmbeddingProvider("embedding never attempted".to_string())))
    }

    /// Embeds many texts. Inputs that clean down to nothing are dropped, the
    /// rest are sent in chunks of `batch_size`. A failed chunk degrades to
    /// per-item `embed` calls, and an item that still fails contributes a
    /// zero vector, so the output length always equals the filtered input
    /// length.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let normalized: Vec<String> = texts
            .iter()
            .map(|t| text::normalize(t, self.options.max_input_chars))
            .filter(|t| !t.is_empty())
            .collect();

        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(normalized.len());
        for chunk in normalized.chunks(self.options.batch_size.max(1)) {
            match self.vectorize_checked(chunk).await {
                Ok(mut vectors) => embeddings.append(&mut vectors),
                Err(err) => {
                    tracing::warn!(
                        "batch embedding of {} items failed, degrading to per-item calls: {}",
                        chunk.len(),
                        err
                    );
                    for item in chunk {
                        match self.embed(item).await {
                            Ok(vector) => embeddings.push(vector),
                            Err(item_err) => {
                                tracing::warn!(
                                    "substituting zero vector after repeated failures: {}",
                                    item_err
                                );
                                embeddings.push(vec![0.0; self.provider.dimensions()]);
                            }
                        }
                    }
                }
            }
        }

        Ok(embeddings)
    }

    /// One provider call with the result count and dimensionality verified.
    async fn vectorize_checked(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let vectors = self.provider.vectorize(inputs).await?;

        if vectors.len() != inputs.len() {
            return Err(ApiError::EmbeddingProvider(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                inputs.len()
            )));
        }

        let expected = self.provider.dimensions();
        for vector in &vectors {
            if vector.len() != expected {
                return Err(ApiError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        Ok(vectors)
    }
}

/// Cosine similarity in [-1, 1]. Returns 0.0 when either vector has zero
/// magnitude or the lengths disagree, never dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Ranks candidate vectors against a query, descending by cosine similarity.
/// The sort is stable, so equal scores keep their input order. Returns at
/// most `k` `(candidate_index, score)` pairs.
pub fn top_k(query: &[f32], candidates: &[Vec<f32>], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct FlakyProvider {
        dims: usize,
        fail_first: usize,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl FlakyProvider {
        fn new(dims: usize, fail_first: usize) -> Self {
            Self {
                dims,
                fail_first,
                calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn model(&self) -> &str {
            "test-embedder"
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        async fn vectorize(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            let call = self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            self.batch_sizes.lock().unwrap().push(inputs.len());
            if call < self.fail_first {
                return Err(ApiError::EmbeddingProvider("simulated outage".to_string()));
            }
            Ok(inputs
                .iter()
                .map(|input| {
                    let seed = input.len() as f32;
                    (0..self.dims).map(|i| seed + i as f32).collect()
                })
                .collect())
        }
    }

    struct WrongDimsProvider;

    #[async_trait]
    impl EmbeddingProvider for WrongDimsProvider {
        fn model(&self) -> &str {
            "bad-embedder"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn vectorize(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0, 2.0]).collect())
        }
    }

    fn fast_options() -> EmbeddingOptions {
        EmbeddingOptions {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1),
            batch_size: 100,
            max_input_chars: 32_000,
        }
    }

    #[tokio::test]
    async fn embed_rejects_empty_input_without_calling_provider() {
        let provider = Arc::new(FlakyProvider::new(4, 0));
        let service = EmbeddingService::new(provider.clone(), fast_options());

        let err = service.embed("   \n\t ").await.unwrap_err();
        assert!(matches!(err, ApiError::EmptyInput(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn embed_retries_transient_failures() {
        let provider = Arc::new(FlakyProvider::new(4, 2));
        let service = EmbeddingService::new(provider.clone(), fast_options());

        let vector = service.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn embed_gives_up_after_max_retries() {
        let provider = Arc::new(FlakyProvider::new(4, usize::MAX));
        let service = EmbeddingService::new(provider.clone(), fast_options());

        let err = service.embed("hello").await.unwrap_err();
        assert!(matches!(err, ApiError::EmbeddingProvider(_)));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn embed_surfaces_dimension_mismatch() {
        let service = EmbeddingService::new(Arc::new(WrongDimsProvider), fast_options());

        let err = service.embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn embed_batch_of_nothing_is_empty() {
        let provider = Arc::new(FlakyProvider::new(4, 0));
        let service = EmbeddingService::new(provider.clone(), fast_options());

        assert!(service.embed_batch(&[]).await.unwrap().is_empty());
        assert!(service
            .embed_batch(&["  ".to_string(), "\n".to_string()])
            .await
            .unwrap()
            .is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn embed_batch_filters_blanks_and_preserves_order() {
        let provider = Arc::new(FlakyProvider::new(4, 0));
        let service = EmbeddingService::new(provider.clone(), fast_options());

        let texts = vec![
            "first".to_string(),
            "   ".to_string(),
            "second one".to_string(),
        ];
        let vectors = service.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 2);
        // Seeded by input length: "first" is 5 chars, "second one" is 10.
        assert_eq!(vectors[0][0], 5.0);
        assert_eq!(vectors[1][0], 10.0);
    }

    #[tokio::test]
    async fn embed_batch_chunks_by_batch_size() {
        let provider = Arc::new(FlakyProvider::new(4, 0));
        let mut options = fast_options();
        options.batch_size = 2;
        let service = EmbeddingService::new(provider.clone(), options);

        let texts: Vec<String> = (0..5).map(|i| format!("text number {}", i)).collect();
        let vectors = service.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 5);
        assert_eq!(*provider.batch_sizes.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn embed_batch_substitutes_zero_vectors_on_total_failure() {
        let provider = Arc::new(FlakyProvider::new(4, usize::MAX));
        let service = EmbeddingService::new(provider.clone(), fast_options());

        let texts = vec!["one".to_string(), "two".to_string()];
        let vectors = service.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 2);
        for vector in &vectors {
            assert_eq!(vector, &vec![0.0; 4]);
        }
    }

    #[test]
    fn cosine_similarity_basics() {
        let v = vec![1.0f32, 2.0, 3.0];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();

        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&v, &[0.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&v, &[1.0, 2.0]), 0.0);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn top_k_ranks_descending_and_caps_at_k() {
        let query = vec![1.0f32, 0.0];
        let candidates = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![-1.0, 0.0],
        ];

        let ranked = top_k(&query, &candidates, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, 1);
        assert_eq!(ranked[1].0, 2);

        let all = top_k(&query, &candidates, 10);
        assert_eq!(all.len(), 4);
        assert_eq!(all.last().unwrap().0, 3);
    }

    #[test]
    fn top_k_keeps_input_order_on_ties() {
        let query = vec![1.0f32, 0.0];
        let candidates = vec![vec![2.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]];

        let ranked = top_k(&query, &candidates, 3);
        let indices: Vec<usize> = ranked.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
