//! News-sentiment signal generator.
//!
//! Sentiment analysis itself happens upstream (an external analyzer pushes
//! scored samples in via [`SentimentGenerator::ingest`]); this generator
//! turns the latest fresh sample for a market into a trading signal.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use market_core::types::{Direction, Signal, SnapshotHistory};
use tracing::debug;

use crate::generator::SignalGenerator;

pub const STRATEGY_ID: &str = "sentiment";

#[derive(Debug, Clone)]
pub struct SentimentConfig {
    /// Minimum absolute score before a signal is emitted.
    pub threshold: f64,
    /// Samples older than this are ignored.
    pub max_sample_age_secs: i64,
    pub signal_ttl_secs: i64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            max_sample_age_secs: 1800,
            signal_ttl_secs: 600,
        }
    }
}

/// One scored sentiment observation for a market.
#[derive(Debug, Clone)]
pub struct SentimentSample {
    /// Net sentiment in [-1.0, 1.0].
    pub score: f64,
    /// Analyzer confidence in [0.0, 1.0].
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

pub struct SentimentGenerator {
    config: SentimentConfig,
    samples: DashMap<String, SentimentSample>,
}

impl SentimentGenerator {
    pub fn new(config: SentimentConfig) -> Self {
        Self {
            config,
            samples: DashMap::new(),
        }
    }

    /// Record the latest analyzer output for a market, replacing any
    /// previous sample.
    pub fn ingest(
        &self,
        market_id: impl Into<String>,
        score: f64,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) {
        let market_id = market_id.into();
        debug!(market = %market_id, score, confidence, "Sentiment sample ingested");
        self.samples.insert(
            market_id,
            SentimentSample {
                score: score.clamp(-1.0, 1.0),
                confidence: confidence.clamp(0.0, 1.0),
                timestamp,
            },
        );
    }
}

impl SignalGenerator for SentimentGenerator {
    fn id(&self) -> &str {
        STRATEGY_ID
    }

    fn evaluate(&self, market_id: &str, _history: &SnapshotHistory) -> Option<Signal> {
        let sample = self.samples.get(market_id)?;
        let now = Utc::now();

        let age = now.signed_duration_since(sample.timestamp).num_seconds();
        if age > self.config.max_sample_age_secs {
            return None;
        }
        if sample.score.abs() < self.config.threshold {
            return None;
        }

        let direction = if sample.score > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };

        Some(Signal::new(
            STRATEGY_ID,
            market_id,
            direction,
            sample.score.abs(),
            sample.confidence,
            now,
            self.config.signal_ttl_secs,
        ))
    }
}
