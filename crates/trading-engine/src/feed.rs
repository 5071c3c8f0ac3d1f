//! Market data source contract.

use anyhow::Result;
use async_trait::async_trait;
use market_core::types::MarketSnapshot;

/// Supplies the freshest observable snapshot for a market. Implementations
/// may poll a venue, replay a file, or serve canned data in tests; the
/// engine treats any error as the market being unavailable this tick.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    async fn latest(&self, market_id: &str) -> Result<MarketSnapshot>;
}
