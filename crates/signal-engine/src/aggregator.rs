//! Confidence-weighted signal fusion.
//!
//! Collapses the signals emitted for one market on one tick into a single
//! [`Decision`], or into no decision at all when the evidence is thin or
//! the generators disagree too much.

use chrono::{DateTime, Utc};
use market_core::types::{Decision, Direction, Signal, SignalContribution};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Minimum number of live signals before any decision is made.
    pub min_generators: usize,
    /// Decisions below this combined confidence are discarded.
    pub min_confidence: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_generators: 2,
            min_confidence: 0.3,
        }
    }
}

pub struct SignalAggregator {
    config: AggregatorConfig,
}

impl SignalAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Fuse the tick's signals for one market.
    ///
    /// Expired, directionless and wrong-market signals are dropped before
    /// any arithmetic. The net conviction is the confidence-weighted sum
    /// of signed strengths; its sign picks the direction. Combined
    /// confidence is the |strength|-weighted average of the contributors'
    /// confidences, discounted by the fraction of contributors voting
    /// against the winning side.
    pub fn aggregate(
        &self,
        market_id: &str,
        signals: &[Signal],
        now: DateTime<Utc>,
    ) -> Option<Decision> {
        let live: Vec<&Signal> = signals
            .iter()
            .filter(|s| {
                s.market_id == market_id && s.direction != Direction::Flat && !s.is_expired(now)
            })
            .collect();

        if live.len() < self.config.min_generators {
            debug!(
                market = %market_id,
                live = live.len(),
                required = self.config.min_generators,
                "Not enough live signals to decide"
            );
            return None;
        }

        let net: f64 = live.iter().map(|s| s.weight()).sum();
        if net == 0.0 {
            // Perfect disagreement carries no information
            return None;
        }
        let direction = if net > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };

        let weight_sum: f64 = live.iter().map(|s| s.strength.abs()).sum();
        if weight_sum <= f64::EPSILON {
            return None;
        }
        let avg_confidence: f64 = live
            .iter()
            .map(|s| s.confidence * s.strength.abs())
            .sum::<f64>()
            / weight_sum;

        let opposing = live
            .iter()
            .filter(|s| s.direction == direction.opposite())
            .count();
        let penalty = opposing as f64 / live.len() as f64;
        let confidence = (avg_confidence * (1.0 - penalty)).clamp(0.0, 1.0);

        if confidence < self.config.min_confidence {
            debug!(
                market = %market_id,
                confidence,
                floor = self.config.min_confidence,
                "Decision discarded below confidence floor"
            );
            return None;
        }

        let contributions: Vec<SignalContribution> =
            live.iter().map(|s| SignalContribution::from(*s)).collect();

        Some(Decision {
            market_id: market_id.to_string(),
            direction,
            confidence,
            timestamp: now,
            contributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(strategy: &str, direction: Direction, magnitude: f64, confidence: f64) -> Signal {
        Signal::new(strategy, "market1", direction, magnitude, confidence, Utc::now(), 300)
    }

    #[test]
    fn test_single_signal_is_not_enough() {
        let aggregator = SignalAggregator::new(AggregatorConfig::default());
        let signals = vec![signal("sentiment", Direction::Long, 0.9, 0.9)];
        assert!(aggregator.aggregate("market1", &signals, Utc::now()).is_none());
    }

    #[test]
    fn test_majority_long_with_dissent() {
        let aggregator = SignalAggregator::new(AggregatorConfig::default());
        let signals = vec![
            signal("sentiment", Direction::Long, 0.6, 0.8),
            signal("cointegration", Direction::Long, 0.4, 0.6),
            signal("volatility", Direction::Short, 0.2, 0.3),
        ];

        let decision = aggregator.aggregate("market1", &signals, Utc::now()).unwrap();
        assert_eq!(decision.direction, Direction::Long);
        // avg = (0.8*0.6 + 0.6*0.4 + 0.3*0.2) / 1.2 = 0.65, one of three opposes
        assert!((decision.confidence - 0.65 * (2.0 / 3.0)).abs() < 1e-9);
        assert_eq!(decision.contributions.len(), 3);
    }

    #[test]
    fn test_exact_cancellation_yields_none() {
        let aggregator = SignalAggregator::new(AggregatorConfig::default());
        let signals = vec![
            signal("sentiment", Direction::Long, 0.5, 0.8),
            signal("cointegration", Direction::Short, 0.5, 0.8),
        ];
        assert!(aggregator.aggregate("market1", &signals, Utc::now()).is_none());
    }

    #[test]
    fn test_expired_signals_are_dropped() {
        let aggregator = SignalAggregator::new(AggregatorConfig::default());
        let stale = Signal::new(
            "sentiment",
            "market1",
            Direction::Long,
            0.9,
            0.9,
            Utc::now() - chrono::Duration::hours(1),
            60,
        );
        let signals = vec![stale, signal("volatility", Direction::Long, 0.5, 0.7)];
        assert!(aggregator.aggregate("market1", &signals, Utc::now()).is_none());
    }

    #[test]
    fn test_other_market_signals_ignored() {
        let aggregator = SignalAggregator::new(AggregatorConfig::default());
        let mut foreign = signal("sentiment", Direction::Long, 0.9, 0.9);
        foreign.market_id = "market2".to_string();
        let signals = vec![foreign, signal("volatility", Direction::Long, 0.5, 0.7)];
        assert!(aggregator.aggregate("market1", &signals, Utc::now()).is_none());
    }

    #[test]
    fn test_heavy_disagreement_fails_confidence_floor() {
        let aggregator = SignalAggregator::new(AggregatorConfig::default());
        // Net barely long but half the voters oppose at low confidence
        let signals = vec![
            signal("sentiment", Direction::Long, 0.4, 0.4),
            signal("cointegration", Direction::Short, 0.3, 0.4),
        ];
        assert!(aggregator.aggregate("market1", &signals, Utc::now()).is_none());
    }
}
