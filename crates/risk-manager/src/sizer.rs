//! Fractional-Kelly position sizing with volatility and drawdown scaling.

use market_core::types::{Decision, Direction, PortfolioState, RiskLimits};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

/// Why the sizer refused to size a decision. Rejections are expected
/// outcomes, not failures; the engine logs them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("circuit breaker is tripped")]
    CircuitBreaker,
    #[error("an opposite-direction position is already open in this market")]
    OppositePositionOpen,
    #[error("market concentration {current} would exceed cap {cap}")]
    MarketConcentration { current: Decimal, cap: Decimal },
    #[error("portfolio exposure {current} would exceed cap {cap}")]
    PortfolioExposure { current: Decimal, cap: Decimal },
    #[error("scaled size rounds to zero contracts")]
    ZeroQuantity,
}

#[derive(Debug, Clone)]
pub struct SizerConfig {
    /// Fraction of full Kelly actually committed (0.5 = half-Kelly).
    pub kelly_fraction: f64,
    /// Realized volatility at which positions run unscaled.
    pub target_volatility: f64,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: 0.5,
            target_volatility: 0.02,
        }
    }
}

/// Everything the sizer needs to know about the portfolio at sizing time.
/// Exposures are snapshotted by the caller before the tick's decisions are
/// sized, so concurrent ticks see a consistent picture.
pub struct SizingContext<'a> {
    pub portfolio: &'a PortfolioState,
    pub limits: &'a RiskLimits,
    /// Aggregate notional of all open positions.
    pub open_exposure: Decimal,
    /// Notional already open in the decision's market.
    pub market_exposure: Decimal,
    /// Direction of the open position in this market, if any.
    pub open_direction: Option<Direction>,
    /// Short-window realized volatility of the market, when observable.
    pub recent_volatility: Option<f64>,
}

pub struct PositionSizer {
    config: SizerConfig,
}

impl PositionSizer {
    pub fn new(config: SizerConfig) -> Self {
        Self { config }
    }

    /// Size a decision into a whole number of contracts.
    ///
    /// On an even-payout binary contract, a decision held with confidence
    /// `c` maps to win probability `(1 + c) / 2`, for which the full Kelly
    /// stake is exactly `c` of equity. That stake is multiplied down by
    /// the Kelly fraction, capped at the per-position fraction, and only
    /// then scaled by volatility and the drawdown taper, so the risk
    /// scalers always bite even when raw Kelly exceeds the cap.
    pub fn size(
        &self,
        decision: &Decision,
        entry_price: Decimal,
        ctx: &SizingContext<'_>,
    ) -> Result<Decimal, RejectReason> {
        if ctx.portfolio.breaker_tripped {
            return Err(RejectReason::CircuitBreaker);
        }
        if let Some(open) = ctx.open_direction {
            if open != Direction::Flat && open != decision.direction {
                return Err(RejectReason::OppositePositionOpen);
            }
        }
        if entry_price <= Decimal::ZERO {
            return Err(RejectReason::ZeroQuantity);
        }

        // Fractional Kelly, capped first so the scalers below apply to the
        // fraction actually at risk
        let kelly = decision.confidence * self.config.kelly_fraction;
        let mut fraction = Decimal::from_f64(kelly)
            .unwrap_or(Decimal::ZERO)
            .min(ctx.limits.max_position_fraction);

        let vol = ctx
            .recent_volatility
            .unwrap_or(self.config.target_volatility)
            .max(self.config.target_volatility);
        let vol_scale = self.config.target_volatility / vol;
        fraction *= Decimal::from_f64(vol_scale).unwrap_or(Decimal::ZERO);

        // Drawdown taper: linear to zero at the breaker threshold
        let taper = if ctx.limits.max_drawdown_pct > Decimal::ZERO {
            (Decimal::ONE - ctx.portfolio.drawdown() / ctx.limits.max_drawdown_pct)
                .clamp(Decimal::ZERO, Decimal::ONE)
        } else {
            Decimal::ONE
        };
        fraction *= taper;

        let equity = ctx.portfolio.equity;
        let notional = fraction * equity;

        let market_cap = ctx.limits.max_market_exposure * equity;
        if ctx.market_exposure + notional > market_cap {
            return Err(RejectReason::MarketConcentration {
                current: ctx.market_exposure + notional,
                cap: market_cap,
            });
        }
        let portfolio_cap = ctx.limits.max_portfolio_exposure * equity;
        if ctx.open_exposure + notional > portfolio_cap {
            return Err(RejectReason::PortfolioExposure {
                current: ctx.open_exposure + notional,
                cap: portfolio_cap,
            });
        }

        let quantity = (notional / entry_price).floor();
        if quantity <= Decimal::ZERO {
            return Err(RejectReason::ZeroQuantity);
        }

        debug!(
            market = %decision.market_id,
            confidence = decision.confidence,
            %fraction,
            %quantity,
            "Sized decision"
        );
        Ok(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn decision(confidence: f64) -> Decision {
        Decision {
            market_id: "market1".to_string(),
            direction: Direction::Long,
            confidence,
            timestamp: Utc::now(),
            contributions: vec![],
        }
    }

    fn portfolio(equity: i64) -> PortfolioState {
        PortfolioState::new(
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            Decimal::new(equity, 0),
        )
    }

    fn ctx<'a>(portfolio: &'a PortfolioState, limits: &'a RiskLimits) -> SizingContext<'a> {
        SizingContext {
            portfolio,
            limits,
            open_exposure: Decimal::ZERO,
            market_exposure: Decimal::ZERO,
            open_direction: None,
            recent_volatility: None,
        }
    }

    #[test]
    fn test_half_kelly_capped_by_position_fraction() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let portfolio = portfolio(10000);
        let limits = RiskLimits {
            max_position_fraction: Decimal::new(5, 2),
            ..RiskLimits::default()
        };

        // Confidence 0.7: half-Kelly wants 35% but the cap holds it at 5%.
        // $500 at $0.50 a contract is 1000 contracts.
        let quantity = sizer
            .size(&decision(0.7), Decimal::new(50, 2), &ctx(&portfolio, &limits))
            .unwrap();
        assert_eq!(quantity, Decimal::new(1000, 0));
    }

    #[test]
    fn test_uncapped_half_kelly_fraction() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let portfolio = portfolio(1000);
        let limits = RiskLimits {
            max_position_fraction: Decimal::ONE,
            max_portfolio_exposure: Decimal::ONE,
            max_market_exposure: Decimal::ONE,
            ..RiskLimits::default()
        };
        let mut context = ctx(&portfolio, &limits);
        context.open_exposure = Decimal::ZERO;

        // With the cap out of the way, size is exactly c/2 of equity
        let quantity = sizer.size(&decision(0.6), Decimal::new(50, 2), &context).unwrap();
        assert_eq!(quantity, Decimal::new(600, 0)); // 0.30 * 1000 / 0.50
    }

    #[test]
    fn test_tripped_breaker_rejects() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let mut portfolio = portfolio(1000);
        portfolio.trip(market_core::types::TripReason::Manual, Utc::now());
        let limits = RiskLimits::default();

        let result = sizer.size(&decision(0.8), Decimal::new(50, 2), &ctx(&portfolio, &limits));
        assert_eq!(result, Err(RejectReason::CircuitBreaker));
    }

    #[test]
    fn test_opposite_open_position_rejects() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let portfolio = portfolio(1000);
        let limits = RiskLimits::default();
        let mut context = ctx(&portfolio, &limits);
        context.open_direction = Some(Direction::Short);

        let result = sizer.size(&decision(0.8), Decimal::new(50, 2), &context);
        assert_eq!(result, Err(RejectReason::OppositePositionOpen));
    }

    #[test]
    fn test_drawdown_tapers_size_monotonically() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let limits = RiskLimits::default();
        let price = Decimal::new(50, 2);

        let healthy = portfolio(1000);
        let full = sizer.size(&decision(1.0), price, &ctx(&healthy, &limits)).unwrap();

        let mut bruised = portfolio(1000);
        bruised.set_unrealized(Decimal::new(-50, 0)); // 5% drawdown, half taper
        let half = sizer.size(&decision(1.0), price, &ctx(&bruised, &limits)).unwrap();

        assert!(half < full);

        let mut breached = portfolio(1000);
        breached.set_unrealized(Decimal::new(-100, 0)); // at the 10% threshold
        let result = sizer.size(&decision(1.0), price, &ctx(&breached, &limits));
        assert_eq!(result, Err(RejectReason::ZeroQuantity));
    }

    #[test]
    fn test_volatility_scaling_shrinks_size() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let portfolio = portfolio(1000);
        let limits = RiskLimits::default();
        let price = Decimal::new(50, 2);

        let calm = sizer.size(&decision(0.2), price, &ctx(&portfolio, &limits)).unwrap();

        let mut stormy = ctx(&portfolio, &limits);
        stormy.recent_volatility = Some(0.08); // 4x target vol
        let scaled = sizer.size(&decision(0.2), price, &stormy).unwrap();

        assert_eq!(scaled, (calm / Decimal::new(4, 0)).floor());
    }

    #[test]
    fn test_volatility_still_scales_a_capped_kelly_stake() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let portfolio = portfolio(10000);
        let limits = RiskLimits {
            max_position_fraction: Decimal::new(10, 2),
            max_market_exposure: Decimal::ONE,
            max_portfolio_exposure: Decimal::ONE,
            ..RiskLimits::default()
        };
        let price = Decimal::new(50, 2);

        // Confidence 1.0: raw half-Kelly (50%) sits far above the 10% cap.
        // Doubling realized volatility must still halve the size; the cap
        // cannot absorb the scaling.
        let mut calm = ctx(&portfolio, &limits);
        calm.recent_volatility = Some(0.02);
        let calm_qty = sizer.size(&decision(1.0), price, &calm).unwrap();
        assert_eq!(calm_qty, Decimal::new(2000, 0)); // 10% of 10000 at 0.50

        let mut stormy = ctx(&portfolio, &limits);
        stormy.recent_volatility = Some(0.04);
        let stormy_qty = sizer.size(&decision(1.0), price, &stormy).unwrap();
        assert_eq!(stormy_qty, Decimal::new(1000, 0));
        assert!(stormy_qty < calm_qty);
    }

    #[test]
    fn test_portfolio_exposure_cap() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let portfolio = portfolio(1000);
        let limits = RiskLimits::default();
        let mut context = ctx(&portfolio, &limits);
        // Other markets already hold $480 of the $500 portfolio cap; this
        // market is clean, so only the aggregate check can refuse
        context.open_exposure = Decimal::new(480, 0);
        context.market_exposure = Decimal::ZERO;

        let result = sizer.size(&decision(1.0), Decimal::new(50, 2), &context);
        assert!(matches!(result, Err(RejectReason::PortfolioExposure { .. })));
    }

    #[test]
    fn test_market_concentration_cap() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let portfolio = portfolio(1000);
        let limits = RiskLimits::default();
        let mut context = ctx(&portfolio, &limits);
        // Market already holds $180 of a $200 cap; a full-size $100 add breaches it
        context.market_exposure = Decimal::new(180, 0);
        context.open_exposure = Decimal::new(180, 0);

        let result = sizer.size(&decision(1.0), Decimal::new(50, 2), &context);
        assert!(matches!(result, Err(RejectReason::MarketConcentration { .. })));
    }

    #[test]
    fn test_dust_size_rejected() {
        let sizer = PositionSizer::new(SizerConfig::default());
        let portfolio = portfolio(1); // $1 of equity
        let limits = RiskLimits::default();

        let result = sizer.size(&decision(0.5), Decimal::new(50, 2), &ctx(&portfolio, &limits));
        assert_eq!(result, Err(RejectReason::ZeroQuantity));
    }
}
