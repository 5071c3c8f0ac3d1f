//! Capability contract for signal generators.

use market_core::types::{Signal, SnapshotHistory};

/// A strategy that can produce a trading signal from observable data.
///
/// Generators are pure over their inputs: they never place orders and hold
/// no position state. Returning `None` means the generator lacks
/// sufficient data or nothing cleared its own noise floor. New strategies
/// are added by implementing this contract.
pub trait SignalGenerator: Send + Sync {
    /// Stable identifier recorded as signal provenance.
    fn id(&self) -> &str;

    fn evaluate(&self, market_id: &str, history: &SnapshotHistory) -> Option<Signal>;
}
