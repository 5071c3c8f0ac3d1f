//! Volatility-regime signal generator.
//!
//! Classifies the market's regime by comparing short-window realized
//! volatility to the long-window baseline. In calm regimes it trades the
//! prevailing drift; in turbulent regimes it stands down entirely.

use chrono::Utc;
use market_core::types::{Direction, Signal, SnapshotHistory};

use crate::generator::SignalGenerator;

pub const STRATEGY_ID: &str = "volatility";

#[derive(Debug, Clone)]
pub struct VolatilityConfig {
    pub short_window: usize,
    pub long_window: usize,
    /// Short/long vol ratio above which the generator stands down.
    pub turbulent_ratio: f64,
    /// Minimum drift-to-vol ratio (information ratio) worth acting on.
    pub noise_floor: f64,
    /// Information ratio mapped to full strength.
    pub max_info_ratio: f64,
    pub signal_ttl_secs: i64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            short_window: 10,
            long_window: 30,
            turbulent_ratio: 1.5,
            noise_floor: 0.1,
            max_info_ratio: 2.0,
            signal_ttl_secs: 300,
        }
    }
}

pub struct VolatilityRegimeGenerator {
    config: VolatilityConfig,
}

impl VolatilityRegimeGenerator {
    pub fn new(config: VolatilityConfig) -> Self {
        Self { config }
    }
}

impl SignalGenerator for VolatilityRegimeGenerator {
    fn id(&self) -> &str {
        STRATEGY_ID
    }

    fn evaluate(&self, market_id: &str, history: &SnapshotHistory) -> Option<Signal> {
        let short_vol = history.realized_volatility(self.config.short_window)?;
        let long_vol = history.realized_volatility(self.config.long_window)?;
        let drift = history.mean_return(self.config.short_window)?;

        if long_vol <= f64::EPSILON || short_vol <= f64::EPSILON {
            return None;
        }

        let ratio = short_vol / long_vol;
        if ratio >= self.config.turbulent_ratio {
            // Vol expansion regime: no directional edge claimed
            return None;
        }

        let info_ratio = drift / short_vol;
        if info_ratio.abs() < self.config.noise_floor {
            return None;
        }

        let direction = if info_ratio > 0.0 {
            Direction::Long
        } else {
            Direction::Short
        };
        let strength = (info_ratio.abs() / self.config.max_info_ratio).min(1.0);
        // The calmer the regime relative to the turbulence cutoff, the more
        // the drift estimate is trusted
        let confidence =
            ((self.config.turbulent_ratio - ratio) / self.config.turbulent_ratio).clamp(0.0, 1.0);

        Some(Signal::new(
            STRATEGY_ID,
            market_id,
            direction,
            strength,
            confidence,
            Utc::now(),
            self.config.signal_ttl_secs,
        ))
    }
}
