//! Configuration management for the trading engine.

use crate::types::RiskLimits;
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Engine-wide configuration, loaded once at startup. Component-level
/// knobs (aggregator, sizer, lifecycle) live with their components.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Starting bankroll for a fresh session.
    pub starting_equity: Decimal,
    /// Decision-loop tick interval.
    pub tick_interval_secs: u64,
    /// Markets the engine tracks.
    pub markets: Vec<String>,
    /// Snapshots older than this are treated as unavailable data.
    pub max_snapshot_age_secs: i64,
    /// Directory for session persistence files.
    pub data_dir: PathBuf,
    pub risk: RiskLimits,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertsConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_equity: Decimal::new(1000, 0),
            tick_interval_secs: 300,
            markets: Vec::new(),
            max_snapshot_age_secs: 120,
            data_dir: PathBuf::from("data"),
            risk: RiskLimits::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. A variable that is set but does not
    /// parse is a hard error, not a silent default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let risk_defaults = RiskLimits::default();

        Ok(Self {
            starting_equity: parse_env("STARTING_EQUITY", defaults.starting_equity)?,
            tick_interval_secs: parse_env("TRADE_INTERVAL_SECONDS", defaults.tick_interval_secs)?,
            markets: env::var("MARKETS")
                .map(|raw| {
                    raw.split(',')
                        .map(|m| m.trim().to_string())
                        .filter(|m| !m.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            max_snapshot_age_secs: parse_env(
                "MAX_SNAPSHOT_AGE_SECONDS",
                defaults.max_snapshot_age_secs,
            )?,
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            risk: RiskLimits {
                max_position_fraction: parse_env(
                    "MAX_POSITION_FRACTION",
                    risk_defaults.max_position_fraction,
                )?,
                max_portfolio_exposure: parse_env(
                    "MAX_PORTFOLIO_EXPOSURE",
                    risk_defaults.max_portfolio_exposure,
                )?,
                max_drawdown_pct: parse_env("MAX_DRAWDOWN_PCT", risk_defaults.max_drawdown_pct)?,
                daily_loss_limit: parse_env("DAILY_LOSS_LIMIT", risk_defaults.daily_loss_limit)?,
                max_market_exposure: parse_env(
                    "MAX_MARKET_EXPOSURE",
                    risk_defaults.max_market_exposure,
                )?,
            },
            alerts: AlertsConfig {
                telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
                telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
            },
        })
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| Error::Config {
            message: format!("{name} is set but unparseable: {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
