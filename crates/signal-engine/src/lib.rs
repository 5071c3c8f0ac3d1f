//! Signal Engine
//!
//! Strategy signal generators and the confidence-weighted aggregator that
//! fuses them into per-market decisions.

pub mod aggregator;
pub mod cointegration;
pub mod generator;
pub mod sentiment;
pub mod volatility;

pub use aggregator::{AggregatorConfig, SignalAggregator};
pub use cointegration::PairCointegrationGenerator;
pub use generator::SignalGenerator;
pub use sentiment::SentimentGenerator;
pub use volatility::VolatilityRegimeGenerator;
