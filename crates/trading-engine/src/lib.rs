//! Trading Engine
//!
//! The orchestrating tick loop, per-market position lifecycles, the paper
//! execution gateway and fire-and-forget event notifications.

pub mod engine;
pub mod feed;
pub mod gateway;
pub mod lifecycle;
pub mod notifier;

pub use engine::{EngineStats, TradingEngine, TradingEngineConfig};
pub use feed::SnapshotFeed;
pub use gateway::{ExecutionGateway, PaperGateway};
pub use lifecycle::{ClosedTrade, ExitReason, LifecycleConfig, LifecycleState, MarketLifecycle};
pub use notifier::{EngineEvent, Notifier};
