//! Open position tracking with stop, target, and trailing-stop state.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::signal::Direction;

/// Trailing-stop state carried by an open position. The stop only ever
/// moves in the profitable direction, never against the holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingStop {
    /// Favorable move from entry (as a fraction) required before the
    /// trailing stop starts ratcheting.
    pub activation_pct: Decimal,
    /// Offset of the stop from the best observed price.
    pub offset_pct: Decimal,
    pub activated: bool,
    /// Best (most favorable) price observed since entry.
    pub best_price: Decimal,
}

impl TrailingStop {
    pub fn new(activation_pct: Decimal, offset_pct: Decimal, entry_price: Decimal) -> Self {
        Self {
            activation_pct,
            offset_pct,
            activated: false,
            best_price: entry_price,
        }
    }
}

/// An open position in one market. Created by the lifecycle manager on a
/// filled entry order, mutated only by it, destroyed on full exit fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub market_id: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_timestamp: DateTime<Utc>,
    /// Active stop-loss level; exactly one per open position.
    pub stop_loss: Decimal,
    /// Optional take-profit level.
    pub take_profit: Option<Decimal>,
    pub trailing: Option<TrailingStop>,
    /// Strategy that originated the entry decision.
    pub strategy_origin: String,
    /// Time-based exit: holding period in seconds.
    pub max_holding_secs: i64,
    /// Fees accumulated on entry/exit fills.
    pub fees_paid: Decimal,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        market_id: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        quantity: Decimal,
        entry_timestamp: DateTime<Utc>,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
        strategy_origin: impl Into<String>,
        max_holding_secs: i64,
    ) -> Self {
        debug_assert!(direction != Direction::Flat, "positions are never flat");
        Self {
            id: Uuid::new_v4(),
            market_id: market_id.into(),
            direction,
            entry_price,
            quantity,
            entry_timestamp,
            stop_loss,
            take_profit,
            trailing: None,
            strategy_origin: strategy_origin.into(),
            max_holding_secs,
            fees_paid: Decimal::ZERO,
        }
    }

    pub fn with_trailing(mut self, activation_pct: Decimal, offset_pct: Decimal) -> Self {
        self.trailing = Some(TrailingStop::new(activation_pct, offset_pct, self.entry_price));
        self
    }

    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Unrealized P&L at `price`, before fees.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        match self.direction {
            Direction::Short => (self.entry_price - price) * self.quantity,
            _ => (price - self.entry_price) * self.quantity,
        }
    }

    pub fn stop_hit(&self, price: Decimal) -> bool {
        match self.direction {
            Direction::Short => price >= self.stop_loss,
            _ => price <= self.stop_loss,
        }
    }

    pub fn target_hit(&self, price: Decimal) -> bool {
        match (self.take_profit, self.direction) {
            (Some(target), Direction::Short) => price <= target,
            (Some(target), _) => price >= target,
            (None, _) => false,
        }
    }

    pub fn holding_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.entry_timestamp)
            >= Duration::seconds(self.max_holding_secs)
    }

    /// Re-anchor the entry stop to the current volatility regime. The stop
    /// distance is `base_stop_pct` of entry scaled by `vol_multiplier`, so
    /// it widens when realized volatility runs hot and narrows when it
    /// cools. A ratcheted trailing stop owns the level and is never
    /// loosened. Returns the new stop when it moved.
    pub fn adjust_stop_for_volatility(
        &mut self,
        base_stop_pct: Decimal,
        vol_multiplier: Decimal,
    ) -> Option<Decimal> {
        if self.trailing.as_ref().is_some_and(|t| t.activated) {
            return None;
        }
        let distance = self.entry_price * base_stop_pct * vol_multiplier;
        let candidate = match self.direction {
            Direction::Short => self.entry_price + distance,
            _ => self.entry_price - distance,
        };
        if candidate == self.stop_loss {
            return None;
        }
        self.stop_loss = candidate;
        Some(candidate)
    }

    /// Ratchet the trailing stop on a new price. Tracks the best favorable
    /// price, activates once the move from entry exceeds the activation
    /// distance, and only ever tightens the stop in the holder's favor.
    /// Returns the new stop level when it moved.
    pub fn update_trailing(&mut self, price: Decimal) -> Option<Decimal> {
        let direction = self.direction;
        let entry_price = self.entry_price;
        let trailing = self.trailing.as_mut()?;

        match direction {
            Direction::Short => {
                if price < trailing.best_price {
                    trailing.best_price = price;
                }
            }
            _ => {
                if price > trailing.best_price {
                    trailing.best_price = price;
                }
            }
        }

        if !trailing.activated {
            let favorable_move = match direction {
                Direction::Short => (entry_price - trailing.best_price) / entry_price,
                _ => (trailing.best_price - entry_price) / entry_price,
            };
            if favorable_move < trailing.activation_pct {
                return None;
            }
            trailing.activated = true;
        }

        let candidate = match direction {
            Direction::Short => trailing.best_price * (Decimal::ONE + trailing.offset_pct),
            _ => trailing.best_price * (Decimal::ONE - trailing.offset_pct),
        };

        let improved = match direction {
            Direction::Short => candidate < self.stop_loss,
            _ => candidate > self.stop_loss,
        };
        if improved {
            self.stop_loss = candidate;
            Some(candidate)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_position() -> Position {
        Position::open(
            "market1",
            Direction::Long,
            Decimal::new(50, 2),  // 0.50 entry
            Decimal::new(100, 0),
            Utc::now(),
            Decimal::new(45, 2),  // 0.45 stop
            Some(Decimal::new(60, 2)),
            "sentiment",
            3600,
        )
    }

    #[test]
    fn test_long_triggers() {
        let pos = long_position();
        assert!(!pos.stop_hit(Decimal::new(46, 2)));
        assert!(pos.stop_hit(Decimal::new(45, 2)));
        assert!(pos.stop_hit(Decimal::new(40, 2)));

        assert!(!pos.target_hit(Decimal::new(59, 2)));
        assert!(pos.target_hit(Decimal::new(60, 2)));
    }

    #[test]
    fn test_short_triggers() {
        let pos = Position::open(
            "market1",
            Direction::Short,
            Decimal::new(50, 2),
            Decimal::new(100, 0),
            Utc::now(),
            Decimal::new(55, 2),
            Some(Decimal::new(40, 2)),
            "cointegration",
            3600,
        );
        assert!(pos.stop_hit(Decimal::new(55, 2)));
        assert!(!pos.stop_hit(Decimal::new(54, 2)));
        assert!(pos.target_hit(Decimal::new(40, 2)));
        assert_eq!(
            pos.unrealized_pnl(Decimal::new(45, 2)),
            Decimal::new(5, 0) // (0.50 - 0.45) * 100
        );
    }

    #[test]
    fn test_trailing_stop_only_moves_favorably() {
        // 4% activation, 3% offset
        let mut pos = long_position().with_trailing(Decimal::new(4, 2), Decimal::new(3, 2));

        // Below activation distance: stop unchanged
        assert!(pos.update_trailing(Decimal::new(51, 2)).is_none());
        assert_eq!(pos.stop_loss, Decimal::new(45, 2));

        // 0.60 is +20% from entry: activates, stop = 0.60 * 0.97 = 0.582
        let new_stop = pos.update_trailing(Decimal::new(60, 2)).unwrap();
        assert_eq!(new_stop, Decimal::new(582, 3));

        // Pullback never loosens the stop
        assert!(pos.update_trailing(Decimal::new(55, 2)).is_none());
        assert_eq!(pos.stop_loss, Decimal::new(582, 3));

        // New high ratchets it further
        let new_stop = pos.update_trailing(Decimal::new(70, 2)).unwrap();
        assert_eq!(new_stop, Decimal::new(679, 3));
    }

    #[test]
    fn test_volatility_reanchors_stop_both_ways() {
        let mut pos = long_position(); // 0.50 entry, 0.45 stop
        let base = Decimal::new(10, 2); // 10% base distance

        // Hot regime, 2x multiplier: stop widens to 0.50 - 0.10 = 0.40
        let widened = pos.adjust_stop_for_volatility(base, Decimal::TWO).unwrap();
        assert_eq!(widened, Decimal::new(40, 2));

        // Calm regime, 0.5x: stop narrows to 0.50 - 0.025 = 0.475
        let narrowed = pos
            .adjust_stop_for_volatility(base, Decimal::new(5, 1))
            .unwrap();
        assert_eq!(narrowed, Decimal::new(475, 3));

        // Same multiplier again is a no-op
        assert!(pos
            .adjust_stop_for_volatility(base, Decimal::new(5, 1))
            .is_none());
    }

    #[test]
    fn test_volatility_never_loosens_a_ratcheted_trailing_stop() {
        let mut pos = long_position().with_trailing(Decimal::new(4, 2), Decimal::new(3, 2));

        // Ratchet the trailing stop well above entry
        pos.update_trailing(Decimal::new(60, 2)).unwrap();
        assert_eq!(pos.stop_loss, Decimal::new(582, 3));

        // A hot regime must not pull the stop back below the ratchet
        assert!(pos
            .adjust_stop_for_volatility(Decimal::new(10, 2), Decimal::TWO)
            .is_none());
        assert_eq!(pos.stop_loss, Decimal::new(582, 3));
    }

    #[test]
    fn test_holding_expiry() {
        let mut pos = long_position();
        pos.max_holding_secs = 60;
        assert!(!pos.holding_expired(pos.entry_timestamp + Duration::seconds(59)));
        assert!(pos.holding_expired(pos.entry_timestamp + Duration::seconds(60)));
    }
}
