//! Sentiment signals for support routing.
//!
//! A binary classifier supplies the raw label and confidence; the service
//! layers the routing rules on top (priority, escalation, emotion, trend).
//! Sentiment is advisory, so every failure path degrades to a neutral
//! result instead of surfacing an error.

mod classifier;
mod service;

pub use classifier::{HfSentimentClassifier, SentimentClassifier, SentimentLabel};
pub use service::{
    ConversationTrend, Priority, SentimentConfig, SentimentResult, SentimentService,
    TrendDirection,
};
