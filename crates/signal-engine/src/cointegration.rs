//! Pair-cointegration signal generator.
//!
//! Tracks the log-price spread between a market and its configured partner
//! over a rolling window. A high-|z| spread against a sufficiently
//! correlated partner is read as mean-reverting mispricing: the generator
//! fades the spread on the market it is asked about.

use chrono::Utc;
use dashmap::DashMap;
use market_core::types::{Direction, Signal, SnapshotHistory};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::generator::SignalGenerator;

pub const STRATEGY_ID: &str = "cointegration";

#[derive(Debug, Clone)]
pub struct CointegrationConfig {
    /// Rolling window (observations) for the spread statistics.
    pub window: usize,
    /// Minimum aligned observations before any statistics are trusted.
    pub min_observations: usize,
    /// |z| at which a signal is emitted.
    pub entry_zscore: f64,
    /// |z| mapped to full strength.
    pub max_zscore: f64,
    /// Minimum |correlation| between the legs for the pair to count as
    /// related; a cheap stand-in for a full cointegration test.
    pub min_correlation: f64,
    pub signal_ttl_secs: i64,
}

impl Default for CointegrationConfig {
    fn default() -> Self {
        Self {
            window: 30,
            min_observations: 20,
            entry_zscore: 2.0,
            max_zscore: 4.0,
            min_correlation: 0.6,
            signal_ttl_secs: 300,
        }
    }
}

pub struct PairCointegrationGenerator {
    config: CointegrationConfig,
    /// market -> partner market.
    pairs: HashMap<String, String>,
    /// Shared history book, owned by the engine.
    histories: Arc<DashMap<String, SnapshotHistory>>,
}

impl PairCointegrationGenerator {
    pub fn new(
        config: CointegrationConfig,
        pairs: HashMap<String, String>,
        histories: Arc<DashMap<String, SnapshotHistory>>,
    ) -> Self {
        Self {
            config,
            pairs,
            histories,
        }
    }
}

impl SignalGenerator for PairCointegrationGenerator {
    fn id(&self) -> &str {
        STRATEGY_ID
    }

    fn evaluate(&self, market_id: &str, history: &SnapshotHistory) -> Option<Signal> {
        let partner_id = self.pairs.get(market_id)?;
        let partner_prices = self.histories.get(partner_id.as_str())?.prices();
        let own_prices = history.prices();

        let n = own_prices.len().min(partner_prices.len()).min(self.config.window);
        if n < self.config.min_observations {
            return None;
        }

        // Align the most recent n observations of both legs
        let xs: Vec<f64> = own_prices[own_prices.len() - n..]
            .iter()
            .filter(|p| **p > 0.0)
            .map(|p| p.ln())
            .collect();
        let ys: Vec<f64> = partner_prices[partner_prices.len() - n..]
            .iter()
            .filter(|p| **p > 0.0)
            .map(|p| p.ln())
            .collect();
        if xs.len() != n || ys.len() != n {
            return None;
        }

        let corr = pearson(&xs, &ys)?;
        if corr.abs() < self.config.min_correlation {
            return None;
        }

        // Hedge ratio from OLS of own on partner, then z-score the spread
        let beta = covariance(&xs, &ys)? / variance(&ys)?;
        let spread: Vec<f64> = xs.iter().zip(&ys).map(|(x, y)| x - beta * y).collect();
        let mean = spread.iter().sum::<f64>() / spread.len() as f64;
        let std = (spread.iter().map(|s| (s - mean).powi(2)).sum::<f64>()
            / (spread.len() - 1) as f64)
            .sqrt();
        if std <= f64::EPSILON {
            return None;
        }
        let z = (spread[spread.len() - 1] - mean) / std;
        trace!(market = %market_id, partner = %partner_id, z, corr, "Spread z-score");

        if z.abs() < self.config.entry_zscore {
            return None;
        }

        // Rich spread => own leg overpriced vs partner => fade it short
        let direction = if z > 0.0 {
            Direction::Short
        } else {
            Direction::Long
        };
        let strength = (z.abs() / self.config.max_zscore).min(1.0);

        Some(Signal::new(
            STRATEGY_ID,
            market_id,
            direction,
            strength,
            corr.abs(),
            Utc::now(),
            self.config.signal_ttl_secs,
        ))
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    if var <= f64::EPSILON {
        None
    } else {
        Some(var)
    }
}

fn covariance(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs);
    let my = mean(ys);
    Some(
        xs.iter()
            .zip(ys)
            .map(|(x, y)| (x - mx) * (y - my))
            .sum::<f64>()
            / (xs.len() - 1) as f64,
    )
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let cov = covariance(xs, ys)?;
    Some(cov / (variance(xs)?.sqrt() * variance(ys)?.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use market_core::types::MarketSnapshot;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn history_from(prices: &[f64]) -> SnapshotHistory {
        let mut history = SnapshotHistory::new(100);
        let base = Utc::now() - Duration::seconds(prices.len() as i64);
        for (i, p) in prices.iter().enumerate() {
            history.push(MarketSnapshot::new(
                "m",
                base + Duration::seconds(i as i64),
                Decimal::from_f64(*p).unwrap(),
                Decimal::new(100, 0),
            ));
        }
        history
    }

    fn generator_with(
        own: &[f64],
        partner: &[f64],
    ) -> (PairCointegrationGenerator, SnapshotHistory) {
        let histories = Arc::new(DashMap::new());
        histories.insert("partner".to_string(), history_from(partner));
        let mut pairs = HashMap::new();
        pairs.insert("own".to_string(), "partner".to_string());
        let generator = PairCointegrationGenerator::new(
            CointegrationConfig::default(),
            pairs,
            histories,
        );
        (generator, history_from(own))
    }

    #[test]
    fn test_insufficient_history_yields_none() {
        let (generator, history) = generator_with(&[0.5, 0.51, 0.52], &[0.5, 0.51, 0.52]);
        assert!(generator.evaluate("own", &history).is_none());
    }

    #[test]
    fn test_unpaired_market_yields_none() {
        let (generator, history) =
            generator_with(&[0.5; 30], &[0.5; 30]);
        assert!(generator.evaluate("other", &history).is_none());
    }

    #[test]
    fn test_divergence_from_tracked_partner_signals_short() {
        // Two legs moving in lockstep, then the own leg spikes rich at the end
        let mut own: Vec<f64> = (0..29).map(|i| 0.50 + 0.002 * i as f64).collect();
        let partner: Vec<f64> = (0..30).map(|i| 0.40 + 0.002 * i as f64).collect();
        own.push(0.70); // last own print far above the fitted spread

        let (generator, history) = generator_with(&own, &partner);
        let signal = generator.evaluate("own", &history).unwrap();
        assert_eq!(signal.direction, Direction::Short);
        assert!(signal.strength < 0.0);
        assert!(signal.confidence >= 0.6);
    }

    #[test]
    fn test_uncorrelated_pair_yields_none() {
        // Partner flat-noise sawtooth while own trends: correlation near zero
        let own: Vec<f64> = (0..30).map(|i| 0.30 + 0.01 * i as f64).collect();
        let partner: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 0.50 } else { 0.52 })
            .collect();
        let (generator, history) = generator_with(&own, &partner);
        assert!(generator.evaluate("own", &history).is_none());
    }
}
