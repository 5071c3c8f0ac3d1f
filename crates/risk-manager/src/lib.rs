//! Risk Manager
//!
//! Position sizing (fractional Kelly with volatility and drawdown scaling)
//! and the portfolio supervisor that owns portfolio state and the circuit
//! breaker.

pub mod sizer;
pub mod supervisor;

pub use sizer::{PositionSizer, RejectReason, SizerConfig, SizingContext};
pub use supervisor::{PortfolioSupervisor, SupervisorConfig};
