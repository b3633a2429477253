use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::service::{lookup_f64, lookup_string_list, lookup_u64};
use crate::text::normalize;

use super::classifier::{SentimentClassifier, SentimentLabel};

const URGENCY_KEYWORDS: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "critical",
    "emergency",
    "broken",
    "not working",
];

const ESCALATION_KEYWORDS: &[&str] = &[
    "cancel",
    "refund",
    "lawsuit",
    "lawyer",
    "terrible",
    "worst",
    "angry",
    "furious",
    "manager",
    "supervisor",
    "unacceptable",
    "disgusted",
    "incompetent",
    "scam",
    "fraud",
    "never again",
    "disappointed",
];

const FRUSTRATION_KEYWORDS: &[&str] = &[
    "frustrated",
    "annoyed",
    "upset",
    "irritated",
    "confused",
    "disappointed",
    "unhappy",
];

/// Routing knobs. The keyword lists and thresholds ship with tuned defaults
/// and can be overridden per deployment under the `sentiment:` config block.
#[derive(Debug, Clone)]
pub struct SentimentConfig {
    pub max_input_chars: usize,
    pub escalation_score_threshold: f32,
    pub strong_emotion_threshold: f32,
    pub trend_threshold: f32,
    pub urgency_keywords: Vec<String>,
    pub escalation_keywords: Vec<String>,
    pub frustration_keywords: Vec<String>,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 2048,
            escalation_score_threshold: 0.85,
            strong_emotion_threshold: 0.8,
            trend_threshold: 0.2,
            urgency_keywords: to_strings(URGENCY_KEYWORDS),
            escalation_keywords: to_strings(ESCALATION_KEYWORDS),
            frustration_keywords: to_strings(FRUSTRATION_KEYWORDS),
        }
    }
}

impl SentimentConfig {
    pub fn from_config(config: &Value) -> Self {
        let defaults = Self::default();
        Self {
            max_input_chars: lookup_u64(
                config,
                "sentiment.max_input_chars",
                defaults.max_input_chars as u64,
            ) as usize,
            escalation_score_threshold: lookup_f64(
                config,
                "sentiment.escalation_score_threshold",
                f64::from(defaults.escalation_score_threshold),
            ) as f32,
            strong_emotion_threshold: lookup_f64(
                config,
                "sentiment.strong_emotion_threshold",
                f64::from(defaults.strong_emotion_threshold),
            ) as f32,
            trend_threshold: lookup_f64(
                config,
                "sentiment.trend_threshold",
                f64::from(defaults.trend_threshold),
            ) as f32,
            urgency_keywords: lookup_string_list(config, "sentiment.urgency_keywords")
                .unwrap_or(defaults.urgency_keywords),
            escalation_keywords: lookup_string_list(config, "sentiment.escalation_keywords")
                .unwrap_or(defaults.escalation_keywords),
            frustration_keywords: lookup_string_list(config, "sentiment.frustration_keywords")
                .unwrap_or(defaults.frustration_keywords),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub score: f32,
    pub priority: Priority,
    pub needs_escalation: bool,
    pub emotion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationTrend {
    pub trend: TrendDirection,
    pub message_count: usize,
    pub scores: Vec<f32>,
    pub average_sentiment: f32,
    pub latest: Option<SentimentResult>,
}

/// Turns raw classifier output into routing signals: a priority level, an
/// escalation flag, and a coarse emotion tag. Classification failures
/// degrade to a neutral result so the caller's pipeline keeps moving.
#[derive(Clone)]
pub struct SentimentService {
    classifier: Arc<dyn SentimentClassifier>,
    config: SentimentConfig,
}

impl SentimentService {
    pub fn new(classifier: Arc<dyn SentimentClassifier>, config: SentimentConfig) -> Self {
        Self { classifier, config }
    }

    /// Scores one message. Never fails: blank input and classifier errors
    /// both yield the neutral fallback, the latter with the error recorded.
    pub async fn analyze(&self, text: &str) -> SentimentResult {
        if text.trim().is_empty() {
            return self.neutral_result(None);
        }

        let truncated = normalize(text, self.config.max_input_chars);

        match self.classifier.classify(&truncated).await {
            Ok((label, score)) => {
                let lower = truncated.to_lowercase();
                SentimentResult {
                    label,
                    score,
                    priority: self.priority_for(label, score, &lower),
                    needs_escalation: self.needs_escalation(label, score, &lower),
                    emotion: self.infer_emotion(label, score, &lower),
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!("sentiment classification failed: {}", err);
                self.neutral_result(Some(err.to_string()))
            }
        }
    }

    /// Scores each message independently, preserving input order.
    pub async fn analyze_batch(&self, texts: &[String]) -> Vec<SentimentResult> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.analyze(text).await);
        }
        results
    }

    /// Tracks how a conversation is going: each message maps to a signed
    /// score (positive confidence up, negative confidence down) and the mean
    /// of the last three is compared against the mean of the whole thread.
    pub async fn analyze_conversation(&self, messages: &[String]) -> ConversationTrend {
        if messages.is_empty() {
            return ConversationTrend {
                trend: TrendDirection::InsufficientData,
                message_count: 0,
                scores: Vec::new(),
                average_sentiment: 0.0,
                latest: None,
            };
        }

        let results = self.analyze_batch(messages).await;
        let scores: Vec<f32> = results
            .iter()
            .map(|r| match r.label {
                SentimentLabel::Positive => r.score,
                SentimentLabel::Negative => -r.score,
                SentimentLabel::Neutral => 0.0,
            })
            .collect();

        let average_sentiment = scores.iter().sum::<f32>() / scores.len() as f32;

        ConversationTrend {
            trend: self.trend_for(&scores),
            message_count: messages.len(),
            scores,
            average_sentiment,
            latest: results.into_iter().last(),
        }
    }

    fn trend_for(&self, scores: &[f32]) -> TrendDirection {
        if scores.len() < 2 {
            return TrendDirection::InsufficientData;
        }

        let recent = &scores[scores.len() - scores.len().min(3)..];
        let recent_avg = recent.iter().sum::<f32>() / recent.len() as f32;
        let overall_avg = scores.iter().sum::<f32>() / scores.len() as f32;

        if recent_avg > overall_avg + self.config.trend_threshold {
            TrendDirection::Improving
        } else if recent_avg < overall_avg - self.config.trend_threshold {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        }
    }

    fn priority_for(&self, label: SentimentLabel, score: f32, lower: &str) -> Priority {
        let urgent = contains_any(lower, &self.config.urgency_keywords);

        match label {
            SentimentLabel::Negative => {
                if score > self.config.escalation_score_threshold || urgent {
                    Priority::High
                } else {
                    Priority::Medium
                }
            }
            _ => {
                if urgent {
                    Priority::Medium
                } else {
                    Priority::Low
                }
            }
        }
    }

    // Escalation keywords count regardless of the predicted label; a happy
    // message asking to cancel still belongs in front of a human.
    fn needs_escalation(&self, label: SentimentLabel, score: f32, lower: &str) -> bool {
        if label == SentimentLabel::Negative && score > self.config.escalation_score_threshold {
            return true;
        }
        if contains_any(lower, &self.config.escalation_keywords) {
            return true;
        }

        let frustration_hits = self
            .config
            .frustration_keywords
            .iter()
            .filter(|word| lower.contains(word.as_str()))
            .count();
        frustration_hits >= 2
    }

    fn infer_emotion(&self, label: SentimentLabel, score: f32, lower: &str) -> String {
        let strong = score > self.config.strong_emotion_threshold;

        let emotion = match label {
            SentimentLabel::Negative => {
                if contains_any(lower, &["angry", "furious", "rage"]) {
                    "angry"
                } else if contains_any(lower, &["frustrated", "frustrating"]) {
                    "frustrated"
                } else if contains_any(lower, &["confused", "don't understand"]) {
                    "confused"
                } else if strong {
                    "frustrated"
                } else {
                    "concerned"
                }
            }
            SentimentLabel::Positive => {
                if contains_any(lower, &["thank", "thanks", "grateful"]) {
                    "grateful"
                } else if contains_any(lower, &["love", "awesome", "excellent"]) {
                    "excited"
                } else if strong {
                    "happy"
                } else {
                    "satisfied"
                }
            }
            SentimentLabel::Neutral => "neutral",
        };

        emotion.to_string()
    }

    fn neutral_result(&self, error: Option<String>) -> SentimentResult {
        SentimentResult {
            label: SentimentLabel::Neutral,
            score: 0.5,
            priority: Priority::Medium,
            needs_escalation: false,
            emotion: "neutral".to_string(),
            error,
        }
    }
}

fn contains_any<S: AsRef<str>>(text: &str, words: &[S]) -> bool {
    words.iter().any(|word| text.contains(word.as_ref()))
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::core::errors::ApiError;

    struct FixedClassifier {
        label: SentimentLabel,
        score: f32,
    }

    #[async_trait]
    impl SentimentClassifier for FixedClassifier {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn classify(&self, _text: &str) -> Result<(SentimentLabel, f32), ApiError> {
            Ok((self.label, self.score))
        }
    }

    struct CountingClassifier {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SentimentClassifier for CountingClassifier {
        fn model(&self) -> &str {
            "counting"
        }

        async fn classify(&self, text: &str) -> Result<(SentimentLabel, f32), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            Ok((SentimentLabel::Positive, 0.9))
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl SentimentClassifier for FailingClassifier {
        fn model(&self) -> &str {
            "failing"
        }

        async fn classify(&self, _text: &str) -> Result<(SentimentLabel, f32), ApiError> {
            Err(ApiError::SentimentProvider("model is loading".to_string()))
        }
    }

    /// Marks texts containing "good" positive and "bad" negative, both with
    /// high confidence, so trend scenarios can be scripted.
    struct MarkerClassifier;

    #[async_trait]
    impl SentimentClassifier for MarkerClassifier {
        fn model(&self) -> &str {
            "marker"
        }

        async fn classify(&self, text: &str) -> Result<(SentimentLabel, f32), ApiError> {
            if text.contains("bad") {
                Ok((SentimentLabel::Negative, 0.9))
            } else {
                Ok((SentimentLabel::Positive, 0.9))
            }
        }
    }

    fn service_with(label: SentimentLabel, score: f32) -> SentimentService {
        SentimentService::new(
            Arc::new(FixedClassifier { label, score }),
            SentimentConfig::default(),
        )
    }

    fn messages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn blank_input_skips_the_classifier() {
        let classifier = Arc::new(CountingClassifier {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });
        let service =
            SentimentService::new(classifier.clone(), SentimentConfig::default());

        let result = service.analyze("   \n\t ").await;

        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.score, 0.5);
        assert_eq!(result.priority, Priority::Medium);
        assert!(!result.needs_escalation);
        assert_eq!(result.emotion, "neutral");
        assert!(result.error.is_none());
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn long_input_is_truncated_before_classification() {
        let classifier = Arc::new(CountingClassifier {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });
        let config = SentimentConfig {
            max_input_chars: 10,
            ..SentimentConfig::default()
        };
        let service = SentimentService::new(classifier.clone(), config);

        service.analyze("word ".repeat(50).as_str()).await;

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].chars().count() <= 10);
    }

    #[tokio::test]
    async fn hot_refund_demand_gets_high_priority_and_escalation() {
        let service = service_with(SentimentLabel::Negative, 0.95);

        let result = service
            .analyze("This is terrible, I want a refund immediately!")
            .await;

        assert_eq!(result.label, SentimentLabel::Negative);
        assert_eq!(result.priority, Priority::High);
        assert!(result.needs_escalation);
        assert_eq!(result.emotion, "frustrated");
    }

    #[tokio::test]
    async fn urgency_keyword_raises_priority_even_at_low_confidence() {
        let service = service_with(SentimentLabel::Negative, 0.55);

        let result = service.analyze("The export is broken for us").await;
        assert_eq!(result.priority, Priority::High);

        let calm = service.analyze("The export misbehaves sometimes").await;
        assert_eq!(calm.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn positive_messages_stay_low_priority_unless_urgent() {
        let service = service_with(SentimentLabel::Positive, 0.9);

        let routine = service.analyze("Everything works nicely").await;
        assert_eq!(routine.priority, Priority::Low);

        let urgent = service
            .analyze("Great product, but I need this urgent question answered")
            .await;
        assert_eq!(urgent.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn escalation_keywords_apply_regardless_of_label() {
        let service = service_with(SentimentLabel::Positive, 0.9);

        let result = service
            .analyze("I love the product but please cancel my plan")
            .await;

        assert!(result.needs_escalation);
        assert_eq!(result.priority, Priority::Low);
    }

    #[tokio::test]
    async fn two_distinct_frustration_words_escalate() {
        let service = service_with(SentimentLabel::Negative, 0.5);

        let double = service.analyze("I'm upset and honestly confused").await;
        assert!(double.needs_escalation);

        let single = service.analyze("I'm upset about the delay").await;
        assert!(!single.needs_escalation);
    }

    #[tokio::test]
    async fn emotions_follow_wording_then_confidence() {
        let angry = service_with(SentimentLabel::Negative, 0.6)
            .analyze("I am angry about my bill")
            .await;
        assert_eq!(angry.emotion, "angry");

        let confused = service_with(SentimentLabel::Negative, 0.6)
            .analyze("I don't understand the invoice")
            .await;
        assert_eq!(confused.emotion, "confused");

        let concerned = service_with(SentimentLabel::Negative, 0.6)
            .analyze("Something seems off with my account")
            .await;
        assert_eq!(concerned.emotion, "concerned");

        let grateful = service_with(SentimentLabel::Positive, 0.9)
            .analyze("Thank you for the quick fix")
            .await;
        assert_eq!(grateful.emotion, "grateful");

        let happy = service_with(SentimentLabel::Positive, 0.9)
            .analyze("That solved my problem")
            .await;
        assert_eq!(happy.emotion, "happy");

        let satisfied = service_with(SentimentLabel::Positive, 0.6)
            .analyze("That solved my problem")
            .await;
        assert_eq!(satisfied.emotion, "satisfied");
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_neutral_with_error_marker() {
        let service = SentimentService::new(
            Arc::new(FailingClassifier),
            SentimentConfig::default(),
        );

        let result = service.analyze("anything at all").await;

        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.priority, Priority::Medium);
        assert!(!result.needs_escalation);
        assert!(result.error.as_deref().unwrap().contains("model is loading"));
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let service =
            SentimentService::new(Arc::new(MarkerClassifier), SentimentConfig::default());

        let results = service
            .analyze_batch(&messages(&["good news", "bad day"]))
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].label, SentimentLabel::Positive);
        assert_eq!(results[1].label, SentimentLabel::Negative);
    }

    #[tokio::test]
    async fn conversation_trends_follow_recent_messages() {
        let service =
            SentimentService::new(Arc::new(MarkerClassifier), SentimentConfig::default());

        let improving = service
            .analyze_conversation(&messages(&["bad", "bad", "good", "good", "good"]))
            .await;
        assert_eq!(improving.trend, TrendDirection::Improving);
        assert_eq!(improving.message_count, 5);
        assert_eq!(improving.scores[0], -0.9);
        assert_eq!(improving.scores[4], 0.9);

        let declining = service
            .analyze_conversation(&messages(&["good", "good", "bad", "bad", "bad"]))
            .await;
        assert_eq!(declining.trend, TrendDirection::Declining);

        let stable = service
            .analyze_conversation(&messages(&["good", "good", "good"]))
            .await;
        assert_eq!(stable.trend, TrendDirection::Stable);
        assert!((stable.average_sentiment - 0.9).abs() < 1e-6);
        assert_eq!(
            stable.latest.as_ref().unwrap().label,
            SentimentLabel::Positive
        );

        let short = service.analyze_conversation(&messages(&["good"])).await;
        assert_eq!(short.trend, TrendDirection::InsufficientData);

        let empty = service.analyze_conversation(&[]).await;
        assert_eq!(empty.trend, TrendDirection::InsufficientData);
        assert_eq!(empty.message_count, 0);
        assert!(empty.latest.is_none());
    }
}
