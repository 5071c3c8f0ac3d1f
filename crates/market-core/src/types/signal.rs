//! Trading signals produced by the strategy generators.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a signal or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Flat => Direction::Flat,
        }
    }

    /// Sign convention used by the aggregator's weighted vote.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Flat => 0.0,
        }
    }
}

/// A directional, confidence-scored opinion from one strategy about one
/// market. Strength is signed: its sign always agrees with `direction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Identifier of the producing strategy.
    pub strategy: String,
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Signed strength in [-1.0, 1.0].
    pub strength: f64,
    /// Self-assessed confidence in [0.0, 1.0].
    pub confidence: f64,
    /// Signals older than this are discarded by the aggregator.
    pub expires_at: DateTime<Utc>,
}

impl Signal {
    /// Create a signal from an unsigned strength magnitude; the stored
    /// strength is signed according to `direction`.
    pub fn new(
        strategy: impl Into<String>,
        market_id: impl Into<String>,
        direction: Direction,
        magnitude: f64,
        confidence: f64,
        timestamp: DateTime<Utc>,
        ttl_secs: i64,
    ) -> Self {
        let magnitude = magnitude.clamp(0.0, 1.0);
        Self {
            strategy: strategy.into(),
            market_id: market_id.into(),
            timestamp,
            direction,
            strength: direction.sign() * magnitude,
            confidence: confidence.clamp(0.0, 1.0),
            expires_at: timestamp + Duration::seconds(ttl_secs),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Contribution to the aggregator's weighted vote.
    pub fn weight(&self) -> f64 {
        self.strength * self.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_sign_follows_direction() {
        let now = Utc::now();
        let long = Signal::new("sentiment", "m1", Direction::Long, 0.6, 0.8, now, 300);
        assert_eq!(long.strength, 0.6);
        assert!((long.weight() - 0.48).abs() < 1e-12);

        let short = Signal::new("sentiment", "m1", Direction::Short, 0.6, 0.8, now, 300);
        assert_eq!(short.strength, -0.6);
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let signal = Signal::new("vol", "m1", Direction::Long, 0.5, 0.5, now, 60);
        assert!(!signal.is_expired(now));
        assert!(signal.is_expired(now + Duration::seconds(61)));
    }

    #[test]
    fn test_bounds_clamped() {
        let now = Utc::now();
        let signal = Signal::new("coint", "m1", Direction::Short, 3.0, 1.7, now, 60);
        assert_eq!(signal.strength, -1.0);
        assert_eq!(signal.confidence, 1.0);
    }
}
