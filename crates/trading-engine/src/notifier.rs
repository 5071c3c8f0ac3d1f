//! Fire-and-forget engine event notifications.
//!
//! Events are pushed onto a bounded channel with `try_send`: a slow or
//! absent consumer can never stall the trading path. Dropped events are
//! counted and logged, nothing more.

use market_core::types::{Order, PortfolioState, Position, TripReason};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

use crate::lifecycle::ExitReason;

/// Events worth telling a human about.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    EntryOpened {
        position: Position,
    },
    ExitClosed {
        position: Position,
        realized_pnl: Decimal,
        reason: ExitReason,
    },
    CircuitBreakerTripped {
        reason: TripReason,
        state: PortfolioState,
    },
    OrderFailed {
        order: Order,
        error: String,
    },
}

pub struct Notifier {
    tx: mpsc::Sender<EngineEvent>,
    rx: Option<mpsc::Receiver<EngineEvent>>,
    dropped: AtomicU64,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Some(rx),
            dropped: AtomicU64::new(0),
        }
    }

    /// Take the event receiver. Can only be taken once; a delivery task
    /// (e.g. a Telegram forwarder) drains it.
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.rx.take()
    }

    /// Publish without waiting. Never blocks, never errors the caller.
    pub fn publish(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.tx.try_send(event) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(?event, dropped, "Notification dropped, channel full");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use market_core::types::{Direction, Position};

    fn position() -> Position {
        Position::open(
            "market1",
            Direction::Long,
            Decimal::new(50, 2),
            Decimal::new(100, 0),
            Utc::now(),
            Decimal::new(45, 2),
            None,
            "sentiment",
            86400,
        )
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let mut notifier = Notifier::new(8);
        let mut rx = notifier.take_receiver().unwrap();

        notifier.publish(EngineEvent::EntryOpened { position: position() });

        match rx.recv().await.unwrap() {
            EngineEvent::EntryOpened { position } => assert_eq!(position.market_id, "market1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let notifier = Notifier::new(1);
        // No consumer; second publish must be dropped, not block
        notifier.publish(EngineEvent::EntryOpened { position: position() });
        notifier.publish(EngineEvent::EntryOpened { position: position() });
        assert_eq!(notifier.dropped_count(), 1);
    }
}
