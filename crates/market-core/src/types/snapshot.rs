//! Market snapshot types and per-market rolling history.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single observation of one market's prices and volume.
///
/// Immutable once produced; superseded by newer snapshots, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub last_price: Decimal,
    pub volume: Decimal,
}

impl MarketSnapshot {
    pub fn new(
        market_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        last_price: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            timestamp,
            best_bid: None,
            best_ask: None,
            last_price,
            volume,
        }
    }

    pub fn with_book(mut self, best_bid: Decimal, best_ask: Decimal) -> Self {
        self.best_bid = Some(best_bid);
        self.best_ask = Some(best_ask);
        self
    }

    /// Midpoint of the book when both sides exist, last trade otherwise.
    pub fn mark_price(&self) -> Decimal {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => (bid + ask) / Decimal::TWO,
            _ => self.last_price,
        }
    }

    /// Whether the snapshot is too old to act on at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: i64) -> bool {
        now.signed_duration_since(self.timestamp) > Duration::seconds(max_age_secs)
    }
}

/// Bounded ring of snapshots for one market, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHistory {
    capacity: usize,
    snapshots: VecDeque<MarketSnapshot>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            snapshots: VecDeque::with_capacity(capacity.max(2)),
        }
    }

    /// Append a snapshot, evicting the oldest when at capacity.
    /// Out-of-order snapshots (older than the latest) are discarded.
    pub fn push(&mut self, snapshot: MarketSnapshot) {
        if let Some(latest) = self.snapshots.back() {
            if snapshot.timestamp < latest.timestamp {
                return;
            }
        }
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<&MarketSnapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Mark prices over the stored window as f64, oldest first.
    pub fn prices(&self) -> Vec<f64> {
        self.snapshots
            .iter()
            .filter_map(|s| s.mark_price().to_f64())
            .collect()
    }

    /// Simple returns over the stored window, oldest first.
    pub fn returns(&self) -> Vec<f64> {
        let prices = self.prices();
        prices
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect()
    }

    /// Mean simple return over the most recent `window` returns.
    pub fn mean_return(&self, window: usize) -> Option<f64> {
        let returns = self.returns();
        if returns.len() < window || window == 0 {
            return None;
        }
        let tail = &returns[returns.len() - window..];
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }

    /// Standard deviation of simple returns over the most recent `window`
    /// returns. Returns `None` with insufficient history.
    pub fn realized_volatility(&self, window: usize) -> Option<f64> {
        let returns = self.returns();
        if returns.len() < window || window < 2 {
            return None;
        }
        let tail = &returns[returns.len() - window..];
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        let var =
            tail.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (tail.len() - 1) as f64;
        Some(var.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(secs: i64, price: Decimal) -> MarketSnapshot {
        MarketSnapshot::new(
            "market1",
            Utc::now() + Duration::seconds(secs),
            price,
            Decimal::new(1000, 0),
        )
    }

    #[test]
    fn test_mark_price_prefers_midpoint() {
        let s = snap(0, Decimal::new(55, 2)).with_book(Decimal::new(50, 2), Decimal::new(60, 2));
        assert_eq!(s.mark_price(), Decimal::new(55, 2));

        let s = snap(0, Decimal::new(42, 2));
        assert_eq!(s.mark_price(), Decimal::new(42, 2));
    }

    #[test]
    fn test_history_eviction_and_ordering() {
        let mut history = SnapshotHistory::new(3);
        for i in 0..5 {
            history.push(snap(i, Decimal::new(50 + i, 2)));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().last_price, Decimal::new(54, 2));

        // Out-of-order snapshot is dropped
        history.push(snap(-100, Decimal::new(1, 2)));
        assert_eq!(history.latest().unwrap().last_price, Decimal::new(54, 2));
    }

    #[test]
    fn test_realized_volatility_needs_history() {
        let mut history = SnapshotHistory::new(50);
        assert!(history.realized_volatility(5).is_none());

        for i in 0..10 {
            let price = if i % 2 == 0 { 50 } else { 55 };
            history.push(snap(i, Decimal::new(price, 2)));
        }
        let vol = history.realized_volatility(5).unwrap();
        assert!(vol > 0.0);
    }

    #[test]
    fn test_flat_prices_have_zero_volatility() {
        let mut history = SnapshotHistory::new(50);
        for i in 0..10 {
            history.push(snap(i, Decimal::new(50, 2)));
        }
        assert_eq!(history.realized_volatility(5), Some(0.0));
        assert_eq!(history.mean_return(5), Some(0.0));
    }
}
