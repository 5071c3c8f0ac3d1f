//! Core domain types shared across the engine crates.

pub mod decision;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod snapshot;

pub use decision::{Decision, SignalContribution};
pub use order::{Fill, Order, OrderKind, OrderSide, OrderStatus};
pub use portfolio::{PortfolioState, RiskLimits, TripReason};
pub use position::{Position, TrailingStop};
pub use signal::{Direction, Signal};
pub use snapshot::{MarketSnapshot, SnapshotHistory};
