//! Execution gateway contract and the paper-trading venue.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use market_core::types::{Fill, Order};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Venue-facing order operations. The engine only talks to the venue
/// through this contract, so a live adapter slots in without touching the
/// lifecycle logic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submit an order, returning the venue-assigned order reference.
    async fn submit_order(&self, order: &Order) -> Result<String>;

    async fn cancel_order(&self, venue_order_id: &str) -> Result<()>;

    /// Venue order references still live on the venue, for reconciliation.
    async fn open_orders(&self) -> Result<Vec<String>>;
}

/// Execution counters for the paper venue.
#[derive(Debug, Default)]
pub struct PaperMetrics {
    pub orders_submitted: AtomicU64,
    pub orders_cancelled: AtomicU64,
}

/// Simulated venue: every order fills immediately and fully at its marked
/// price, minus a flat fee. Fills are reported asynchronously on a channel,
/// same as a live venue would, so the engine's fill handling is exercised
/// for real.
pub struct PaperGateway {
    fee_rate: Decimal,
    fill_tx: mpsc::Sender<Fill>,
    fill_rx: Option<mpsc::Receiver<Fill>>,
    pub metrics: PaperMetrics,
}

impl PaperGateway {
    pub fn new(fee_rate: Decimal) -> Self {
        let (fill_tx, fill_rx) = mpsc::channel(1000);
        Self {
            fee_rate,
            fill_tx,
            fill_rx: Some(fill_rx),
            metrics: PaperMetrics::default(),
        }
    }

    /// Take the fill report receiver. Can only be taken once.
    pub fn take_fill_receiver(&mut self) -> Option<mpsc::Receiver<Fill>> {
        self.fill_rx.take()
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit_order(&self, order: &Order) -> Result<String> {
        let venue_order_id = format!("paper-{}", Uuid::new_v4());
        // No book to cross on the simulated venue; the marked price is the
        // fill price
        let price = order.limit_price.unwrap_or(Decimal::new(50, 2));
        let fee = price * order.quantity * self.fee_rate;

        info!(
            market = %order.market_id,
            side = ?order.side,
            kind = ?order.kind,
            quantity = %order.quantity,
            %price,
            "[PAPER] Order filled"
        );
        self.metrics.orders_submitted.fetch_add(1, Ordering::Relaxed);

        self.fill_tx
            .send(Fill {
                order_id: order.id,
                price,
                quantity: order.quantity,
                fee,
                timestamp: Utc::now(),
            })
            .await?;

        Ok(venue_order_id)
    }

    async fn cancel_order(&self, venue_order_id: &str) -> Result<()> {
        debug!(venue_order_id, "[PAPER] Cancel is a no-op, orders fill instantly");
        self.metrics.orders_cancelled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn open_orders(&self) -> Result<Vec<String>> {
        // Instant fills mean nothing ever rests on the paper venue
        Ok(Vec::new())
    }
}
