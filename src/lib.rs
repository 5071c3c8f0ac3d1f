//! EO-Bot: Event-Outcome Market Trading Decision Engine
//!
//! This is the root crate that provides benchmark and integration-test
//! access to the internal modules. For actual functionality, use the
//! individual crates directly:
//!
//! - `market-core`: Core types, errors, configuration, session persistence
//! - `signal-engine`: Strategy signal generators and the decision aggregator
//! - `risk-manager`: Position sizing, circuit breaker, portfolio supervision
//! - `trading-engine`: Tick orchestration, position lifecycles, paper execution

// Re-export for benchmarks
pub use market_core as core;
pub use risk_manager as risk;
pub use signal_engine as signals;
pub use trading_engine as trading;
