//! Per-market position lifecycle state machine.
//!
//! Exactly one lifecycle exists per tracked market, so a market can never
//! hold more than one position or have more than one order in flight. All
//! transitions are guarded; anything that does not line up with the
//! current state is a `StateCorruption` error, never a silent overwrite.

use chrono::{DateTime, Utc};
use market_core::types::{
    Decision, Direction, Fill, MarketSnapshot, Order, OrderKind, OrderSide, OrderStatus, Position,
};
use market_core::{Error, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::gateway::ExecutionGateway;
use crate::notifier::{EngineEvent, Notifier};

/// Why a position is being exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeLimit,
    /// Operator or breaker-driven flatten.
    Forced,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Stop distance from entry, as a fraction.
    pub stop_loss_pct: Decimal,
    /// Take-profit distance from entry, as a fraction.
    pub take_profit_pct: Decimal,
    pub trailing_activation_pct: Decimal,
    pub trailing_offset_pct: Decimal,
    /// Realized volatility at which the stop runs at its base distance.
    pub baseline_volatility: f64,
    /// Bounds on the volatility multiplier applied to the stop distance.
    pub stop_vol_floor: f64,
    pub stop_vol_ceiling: f64,
    /// Time-based exit after this holding period.
    pub max_holding_secs: i64,
    /// Order submission attempts before giving up.
    pub max_submit_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: Decimal::new(5, 2),
            take_profit_pct: Decimal::new(10, 2),
            trailing_activation_pct: Decimal::new(4, 2),
            trailing_offset_pct: Decimal::new(3, 2),
            baseline_volatility: 0.02,
            stop_vol_floor: 0.5,
            stop_vol_ceiling: 2.0,
            max_holding_secs: 86_400,
            max_submit_attempts: 3,
            retry_base_delay_ms: 50,
        }
    }
}

/// Lifecycle states. The happy path is
/// Idle -> PendingEntry -> Open -> PendingExit -> Idle.
#[derive(Debug, Clone)]
pub enum LifecycleState {
    Idle,
    PendingEntry {
        order: Order,
    },
    Open {
        position: Position,
        /// Exit deferred to the next snapshot after submission failed.
        exit_pending_retry: Option<ExitReason>,
    },
    PendingExit {
        position: Position,
        order: Order,
        reason: ExitReason,
    },
}

/// A fully closed round trip, handed to the engine for P&L accounting.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub position: Position,
    /// Realized P&L net of all fees.
    pub realized_pnl: Decimal,
    pub reason: ExitReason,
}

pub struct MarketLifecycle {
    market_id: String,
    config: LifecycleConfig,
    state: LifecycleState,
    gateway: Arc<dyn ExecutionGateway>,
    notifier: Arc<Notifier>,
    /// Fees accrued on the in-flight entry order.
    accrued_fees: Decimal,
    /// Strategy origin carried from the pending entry decision.
    pending_origin: String,
    /// Set when an exit could not be submitted after all retries.
    exit_escalated: bool,
}

impl MarketLifecycle {
    pub fn new(
        market_id: impl Into<String>,
        config: LifecycleConfig,
        gateway: Arc<dyn ExecutionGateway>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            config,
            state: LifecycleState::Idle,
            gateway,
            notifier,
            accrued_fees: Decimal::ZERO,
            pending_origin: String::new(),
            exit_escalated: false,
        }
    }

    /// Seed a lifecycle with a position recovered from a persisted session.
    pub fn restore(&mut self, position: Position) -> Result<()> {
        if !matches!(self.state, LifecycleState::Idle) {
            return Err(Error::InvalidTransition(format!(
                "cannot restore a position into a non-idle lifecycle for {}",
                self.market_id
            )));
        }
        info!(market = %self.market_id, position = %position.id, "Position restored");
        self.state = LifecycleState::Open {
            position,
            exit_pending_retry: None,
        };
        Ok(())
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, LifecycleState::Idle)
    }

    pub fn exit_escalated(&self) -> bool {
        self.exit_escalated
    }

    /// The open position, whether resting or already exiting.
    pub fn open_position(&self) -> Option<&Position> {
        match &self.state {
            LifecycleState::Open { position, .. } => Some(position),
            LifecycleState::PendingExit { position, .. } => Some(position),
            _ => None,
        }
    }

    /// Notional this lifecycle has committed: the open position's, or the
    /// resting entry order's while its fill is still in flight. Counting
    /// pending entries keeps concurrent ticks from jointly overshooting
    /// the portfolio exposure cap.
    pub fn committed_exposure(&self) -> Option<(Decimal, Direction)> {
        match &self.state {
            LifecycleState::Open { position, .. }
            | LifecycleState::PendingExit { position, .. } => {
                Some((position.notional(), position.direction))
            }
            LifecycleState::PendingEntry { order } => {
                let price = order.limit_price.or(order.average_fill_price)?;
                let direction = match order.side {
                    OrderSide::Sell => Direction::Short,
                    OrderSide::Buy => Direction::Long,
                };
                Some((order.quantity * price, direction))
            }
            LifecycleState::Idle => None,
        }
    }

    pub fn matches_order(&self, order_id: Uuid) -> bool {
        match &self.state {
            LifecycleState::PendingEntry { order } => order.id == order_id,
            LifecycleState::PendingExit { order, .. } => order.id == order_id,
            _ => false,
        }
    }

    /// Submit an entry order for a sized decision. Only valid from Idle.
    pub async fn submit_entry(
        &mut self,
        decision: &Decision,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<()> {
        if !self.is_idle() {
            return Err(Error::InvalidTransition(format!(
                "entry requested for {} while not idle",
                self.market_id
            )));
        }

        let side = OrderSide::entry_for(decision.direction);
        let mut order = Order::new(&self.market_id, side, OrderKind::Entry, quantity, Some(price));

        match self.submit_with_retry(&mut order).await {
            Ok(venue_order_id) => {
                order.venue_order_id = Some(venue_order_id);
                order.status = OrderStatus::Pending;
                info!(
                    market = %self.market_id,
                    order = %order.id,
                    %quantity,
                    %price,
                    direction = ?decision.direction,
                    "Entry order submitted"
                );
                self.accrued_fees = Decimal::ZERO;
                self.pending_origin = decision.dominant_strategy().to_string();
                self.state = LifecycleState::PendingEntry { order };
                Ok(())
            }
            Err(e) => {
                warn!(market = %self.market_id, error = %e, "Entry submission failed");
                self.notifier.publish(EngineEvent::OrderFailed {
                    order,
                    error: e.to_string(),
                });
                Err(Error::ExecutionFailure(e.to_string()))
            }
        }
    }

    /// Evaluate exit rules against a fresh snapshot. Only acts when Open.
    /// `recent_volatility` re-anchors the stop distance to the current
    /// regime before the trigger checks run.
    pub async fn on_snapshot(
        &mut self,
        snapshot: &MarketSnapshot,
        recent_volatility: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let price = snapshot.mark_price();

        let trigger = match &mut self.state {
            LifecycleState::Open {
                position,
                exit_pending_retry,
            } => {
                if let Some(reason) = exit_pending_retry.take() {
                    Some(reason)
                } else {
                    if let Some(multiplier) = recent_volatility.and_then(|vol| {
                        let ratio = (vol / self.config.baseline_volatility)
                            .clamp(self.config.stop_vol_floor, self.config.stop_vol_ceiling);
                        Decimal::from_f64(ratio)
                    }) {
                        if let Some(new_stop) = position
                            .adjust_stop_for_volatility(self.config.stop_loss_pct, multiplier)
                        {
                            debug!(
                                market = %self.market_id,
                                stop = %new_stop,
                                %multiplier,
                                "Stop re-anchored to volatility"
                            );
                        }
                    }
                    if let Some(new_stop) = position.update_trailing(price) {
                        debug!(
                            market = %self.market_id,
                            stop = %new_stop,
                            "Trailing stop ratcheted"
                        );
                    }
                    if position.stop_hit(price) {
                        Some(ExitReason::StopLoss)
                    } else if position.target_hit(price) {
                        Some(ExitReason::TakeProfit)
                    } else if position.holding_expired(now) {
                        Some(ExitReason::TimeLimit)
                    } else {
                        None
                    }
                }
            }
            _ => None,
        };

        if let Some(reason) = trigger {
            self.begin_exit(reason, price).await?;
        }
        Ok(())
    }

    /// Flatten the open position immediately, regardless of exit rules.
    pub async fn force_exit(&mut self, price: Decimal) -> Result<()> {
        if matches!(self.state, LifecycleState::Open { .. }) {
            self.begin_exit(ExitReason::Forced, price).await?;
        }
        Ok(())
    }

    async fn begin_exit(&mut self, reason: ExitReason, price: Decimal) -> Result<()> {
        let state = std::mem::replace(&mut self.state, LifecycleState::Idle);
        let position = match state {
            LifecycleState::Open { position, .. } => position,
            other => {
                self.state = other;
                return Err(Error::InvalidTransition(format!(
                    "exit requested for {} with no open position",
                    self.market_id
                )));
            }
        };

        let side = OrderSide::entry_for(position.direction).opposite();
        let mut order = Order::new(
            &self.market_id,
            side,
            OrderKind::Exit,
            position.quantity,
            Some(price),
        );

        match self.submit_with_retry(&mut order).await {
            Ok(venue_order_id) => {
                order.venue_order_id = Some(venue_order_id);
                order.status = OrderStatus::Pending;
                info!(
                    market = %self.market_id,
                    order = %order.id,
                    ?reason,
                    %price,
                    "Exit order submitted"
                );
                self.state = LifecycleState::PendingExit {
                    position,
                    order,
                    reason,
                };
                Ok(())
            }
            Err(e) => {
                // The position stays open and the exit is retried on the
                // next snapshot; a human is told meanwhile
                error!(
                    market = %self.market_id,
                    ?reason,
                    error = %e,
                    "Exit submission failed after retries, escalating"
                );
                self.exit_escalated = true;
                self.notifier.publish(EngineEvent::OrderFailed {
                    order,
                    error: e.to_string(),
                });
                self.state = LifecycleState::Open {
                    position,
                    exit_pending_retry: Some(reason),
                };
                Err(Error::ExecutionFailure(e.to_string()))
            }
        }
    }

    async fn submit_with_retry(&self, order: &mut Order) -> anyhow::Result<String> {
        let mut last_err = None;
        for attempt in 1..=self.config.max_submit_attempts {
            order.attempts = attempt;
            match self.gateway.submit_order(order).await {
                Ok(venue_order_id) => return Ok(venue_order_id),
                Err(e) => {
                    warn!(
                        market = %self.market_id,
                        order = %order.id,
                        attempt,
                        error = %e,
                        "Order submission attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < self.config.max_submit_attempts {
                        let delay = self.config.retry_base_delay_ms * 2u64.pow(attempt - 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no submission attempts made")))
    }

    /// Handle a venue rejection of the in-flight order.
    pub fn on_order_rejected(&mut self, order_id: Uuid) -> Result<()> {
        let state = std::mem::replace(&mut self.state, LifecycleState::Idle);
        match state {
            LifecycleState::PendingEntry { order } if order.id == order_id => {
                warn!(market = %self.market_id, order = %order_id, "Entry rejected by venue");
                // Already Idle; no position was ever opened
                Ok(())
            }
            LifecycleState::PendingExit {
                position, order, reason,
            } if order.id == order_id => {
                warn!(
                    market = %self.market_id,
                    order = %order_id,
                    ?reason,
                    "Exit rejected by venue, will retry next snapshot"
                );
                self.state = LifecycleState::Open {
                    position,
                    exit_pending_retry: Some(reason),
                };
                Ok(())
            }
            other => {
                self.state = other;
                Err(Error::StateCorruption(format!(
                    "rejection for unknown order {order_id} in market {}",
                    self.market_id
                )))
            }
        }
    }

    /// Apply a fill report. A completed exit returns the closed trade.
    pub fn on_fill(&mut self, fill: &Fill) -> Result<Option<ClosedTrade>> {
        let state = std::mem::replace(&mut self.state, LifecycleState::Idle);
        match state {
            LifecycleState::PendingEntry { mut order } if order.id == fill.order_id => {
                order.record_fill(fill.price, fill.quantity);
                self.accrued_fees += fill.fee;

                if order.is_fully_filled() {
                    let entry_price = order.average_fill_price.unwrap_or(fill.price);
                    let position = self.open_from(&order, entry_price, fill.timestamp);
                    info!(
                        market = %self.market_id,
                        position = %position.id,
                        %entry_price,
                        quantity = %position.quantity,
                        stop = %position.stop_loss,
                        "Position opened"
                    );
                    self.notifier.publish(EngineEvent::EntryOpened {
                        position: position.clone(),
                    });
                    self.state = LifecycleState::Open {
                        position,
                        exit_pending_retry: None,
                    };
                } else {
                    self.state = LifecycleState::PendingEntry { order };
                }
                Ok(None)
            }
            LifecycleState::PendingExit {
                mut position,
                mut order,
                reason,
            } if order.id == fill.order_id => {
                order.record_fill(fill.price, fill.quantity);
                position.fees_paid += fill.fee;

                if order.is_fully_filled() {
                    let exit_price = order.average_fill_price.unwrap_or(fill.price);
                    let realized_pnl = position.unrealized_pnl(exit_price) - position.fees_paid;
                    info!(
                        market = %self.market_id,
                        position = %position.id,
                        %exit_price,
                        %realized_pnl,
                        ?reason,
                        "Position closed"
                    );
                    self.exit_escalated = false;
                    self.notifier.publish(EngineEvent::ExitClosed {
                        position: position.clone(),
                        realized_pnl,
                        reason,
                    });
                    self.state = LifecycleState::Idle;
                    Ok(Some(ClosedTrade {
                        position,
                        realized_pnl,
                        reason,
                    }))
                } else {
                    // Partially flat; stay in PendingExit until the rest fills
                    self.state = LifecycleState::PendingExit {
                        position,
                        order,
                        reason,
                    };
                    Ok(None)
                }
            }
            other => {
                self.state = other;
                Err(Error::StateCorruption(format!(
                    "fill for unknown order {} in market {}",
                    fill.order_id, self.market_id
                )))
            }
        }
    }

    /// Cross-check the in-flight order against the venue's live orders.
    /// An order the venue no longer knows is treated as rejected.
    pub fn reconcile(&mut self, live_venue_ids: &[String]) -> Result<()> {
        let stale = match &self.state {
            LifecycleState::PendingEntry { order }
            | LifecycleState::PendingExit { order, .. } => {
                let known = order
                    .venue_order_id
                    .as_ref()
                    .map(|v| live_venue_ids.contains(v))
                    .unwrap_or(false);
                if known {
                    None
                } else {
                    Some(order.id)
                }
            }
            _ => None,
        };

        if let Some(order_id) = stale {
            warn!(
                market = %self.market_id,
                order = %order_id,
                "In-flight order unknown to venue, treating as rejected"
            );
            self.on_order_rejected(order_id)?;
        }
        Ok(())
    }

    fn open_from(
        &self,
        order: &Order,
        entry_price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Position {
        let direction = match order.side {
            OrderSide::Sell => Direction::Short,
            OrderSide::Buy => Direction::Long,
        };
        let (stop_loss, take_profit) = match direction {
            Direction::Short => (
                entry_price * (Decimal::ONE + self.config.stop_loss_pct),
                entry_price * (Decimal::ONE - self.config.take_profit_pct),
            ),
            _ => (
                entry_price * (Decimal::ONE - self.config.stop_loss_pct),
                entry_price * (Decimal::ONE + self.config.take_profit_pct),
            ),
        };

        let mut position = Position::open(
            &self.market_id,
            direction,
            entry_price,
            order.quantity,
            timestamp,
            stop_loss,
            Some(take_profit),
            self.pending_origin.as_str(),
            self.config.max_holding_secs,
        )
        .with_trailing(
            self.config.trailing_activation_pct,
            self.config.trailing_offset_pct,
        );
        position.fees_paid = self.accrued_fees;
        position
    }
}
