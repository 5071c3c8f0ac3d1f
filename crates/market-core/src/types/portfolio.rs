//! Portfolio state and session risk limits.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reason the circuit breaker tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripReason {
    /// Today's realized loss exceeded the daily loss limit.
    DailyLossLimit,
    /// Drawdown from peak equity exceeded the threshold.
    MaxDrawdown,
    /// Operator-forced halt.
    Manual,
}

/// Risk limit configuration, immutable within a trading session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum fraction of equity committed to a single new position.
    pub max_position_fraction: Decimal,
    /// Maximum aggregate open exposure as a fraction of equity.
    pub max_portfolio_exposure: Decimal,
    /// Drawdown from peak equity at which the breaker trips (e.g. 0.10).
    pub max_drawdown_pct: Decimal,
    /// Absolute realized loss per session before the breaker trips.
    pub daily_loss_limit: Decimal,
    /// Per-market concentration cap as a fraction of equity.
    pub max_market_exposure: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_fraction: Decimal::new(10, 2),  // 10% of equity
            max_portfolio_exposure: Decimal::new(50, 2), // 50% of equity
            max_drawdown_pct: Decimal::new(10, 2),       // 10% drawdown
            daily_loss_limit: Decimal::new(100, 0),      // $100/day
            max_market_exposure: Decimal::new(20, 2),    // 20% per market
        }
    }
}

/// Session-scoped portfolio state. One mutable instance per trading
/// session; created at session start, persisted at session end, never
/// silently reset mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub session_date: NaiveDate,
    pub equity: Decimal,
    /// Peak marked equity; only reset at a session boundary.
    pub peak_equity: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Today's realized loss, as a positive accumulator.
    pub daily_realized_loss: Decimal,
    pub wins: u64,
    pub losses: u64,
    pub breaker_tripped: bool,
    pub trip_reason: Option<TripReason>,
    pub tripped_at: Option<DateTime<Utc>>,
}

impl PortfolioState {
    pub fn new(session_date: NaiveDate, starting_equity: Decimal) -> Self {
        Self {
            session_date,
            equity: starting_equity,
            peak_equity: starting_equity,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            daily_realized_loss: Decimal::ZERO,
            wins: 0,
            losses: 0,
            breaker_tripped: false,
            trip_reason: None,
            tripped_at: None,
        }
    }

    /// Equity marked to current prices.
    pub fn marked_equity(&self) -> Decimal {
        self.equity + self.unrealized_pnl
    }

    /// Drawdown from peak marked equity, in [0, 1].
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let dd = (self.peak_equity - self.marked_equity()) / self.peak_equity;
        dd.max(Decimal::ZERO)
    }

    /// Apply a realized fill P&L: updates equity, the daily loss
    /// accumulator, win/loss counters, and the peak.
    pub fn apply_realized(&mut self, pnl: Decimal) {
        self.equity += pnl;
        self.realized_pnl += pnl;
        if pnl < Decimal::ZERO {
            self.daily_realized_loss += -pnl;
            self.losses += 1;
        } else {
            self.wins += 1;
        }
        self.refresh_peak();
    }

    /// Update unrealized P&L from the latest mark-to-market pass.
    pub fn set_unrealized(&mut self, unrealized: Decimal) {
        self.unrealized_pnl = unrealized;
        self.refresh_peak();
    }

    pub fn trip(&mut self, reason: TripReason, at: DateTime<Utc>) {
        self.breaker_tripped = true;
        self.trip_reason = Some(reason);
        self.tripped_at = Some(at);
    }

    pub fn clear_breaker(&mut self) {
        self.breaker_tripped = false;
        self.trip_reason = None;
        self.tripped_at = None;
    }

    /// Roll to a new trading session: clears the daily loss accumulator and
    /// the breaker, and re-bases the peak — the only point where the peak
    /// is allowed to reset.
    pub fn roll_session(&mut self, session_date: NaiveDate) {
        self.session_date = session_date;
        self.daily_realized_loss = Decimal::ZERO;
        self.peak_equity = self.marked_equity();
        self.clear_breaker();
    }

    fn refresh_peak(&mut self) {
        let marked = self.marked_equity();
        if marked > self.peak_equity {
            self.peak_equity = marked;
        }
    }
}
