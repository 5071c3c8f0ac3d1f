//! Fused, actionable decisions produced by the signal aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::{Direction, Signal};

/// Read-only provenance of one contributing signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalContribution {
    pub strategy: String,
    pub direction: Direction,
    pub strength: f64,
    pub confidence: f64,
}

impl From<&Signal> for SignalContribution {
    fn from(signal: &Signal) -> Self {
        Self {
            strategy: signal.strategy.clone(),
            direction: signal.direction,
            strength: signal.strength,
            confidence: signal.confidence,
        }
    }
}

/// The fused output of combining all current signals for a market.
/// Produced by the aggregator, consumed once by the sizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub market_id: String,
    pub direction: Direction,
    /// Combined confidence in [0.0, 1.0], derivable purely from the
    /// contributing signals.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub contributions: Vec<SignalContribution>,
}

impl Decision {
    /// Strategy of the strongest contributor, used as the position's origin.
    pub fn dominant_strategy(&self) -> &str {
        self.contributions
            .iter()
            .max_by(|a, b| {
                let wa = (a.strength * a.confidence).abs();
                let wb = (b.strength * b.confidence).abs();
                wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|c| c.strategy.as_str())
            .unwrap_or("aggregate")
    }
}
