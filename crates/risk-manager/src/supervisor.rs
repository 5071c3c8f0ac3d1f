//! Portfolio supervisor: single owner of portfolio state and the circuit
//! breaker.
//!
//! All realized and unrealized P&L flows through here. The breaker trips on
//! the daily loss limit or the drawdown threshold and then STAYS tripped:
//! there is no automatic intraday reset. Only an operator resume or the
//! session rollover clears it.

use chrono::{DateTime, NaiveDate, Utc};
use market_core::types::{PortfolioState, RiskLimits, TripReason};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    /// Force-exit all open positions when the breaker trips, instead of
    /// letting their normal exit rules run out.
    pub flatten_on_breach: bool,
}

pub struct PortfolioSupervisor {
    limits: RiskLimits,
    config: SupervisorConfig,
    state: RwLock<PortfolioState>,
    /// Mirror of `state.breaker_tripped` for lock-free gating on the hot
    /// path. The RwLock'd state is authoritative.
    is_tripped: AtomicBool,
}

impl PortfolioSupervisor {
    pub fn new(limits: RiskLimits, config: SupervisorConfig, initial: PortfolioState) -> Self {
        let tripped = initial.breaker_tripped;
        Self {
            limits,
            config,
            state: RwLock::new(initial),
            is_tripped: AtomicBool::new(tripped),
        }
    }

    /// Lock-free breaker check.
    pub fn is_tripped(&self) -> bool {
        self.is_tripped.load(Ordering::Relaxed)
    }

    pub fn flatten_on_breach(&self) -> bool {
        self.config.flatten_on_breach
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub async fn state(&self) -> PortfolioState {
        self.state.read().await.clone()
    }

    /// Apply a realized trade P&L. Returns the trip reason if this fill
    /// newly tripped the breaker.
    pub async fn record_fill(&self, pnl: Decimal) -> Option<TripReason> {
        let mut state = self.state.write().await;
        state.apply_realized(pnl);
        info!(
            %pnl,
            equity = %state.equity,
            daily_loss = %state.daily_realized_loss,
            "Realized P&L recorded"
        );
        self.check_and_trip(&mut state, Utc::now())
    }

    /// Refresh the unrealized P&L mark. Returns the trip reason if the
    /// mark newly tripped the breaker.
    pub async fn mark_to_market(&self, unrealized: Decimal) -> Option<TripReason> {
        let mut state = self.state.write().await;
        state.set_unrealized(unrealized);
        self.check_and_trip(&mut state, Utc::now())
    }

    /// Operator-forced halt.
    pub async fn halt(&self) {
        let mut state = self.state.write().await;
        if !state.breaker_tripped {
            state.trip(TripReason::Manual, Utc::now());
            self.is_tripped.store(true, Ordering::Relaxed);
            warn!("Trading halted by operator");
        }
    }

    /// Operator-forced resume. The only way the breaker clears mid-session.
    pub async fn resume(&self) {
        let mut state = self.state.write().await;
        state.clear_breaker();
        self.is_tripped.store(false, Ordering::Relaxed);
        info!("Trading resumed by operator");
    }

    /// Roll the session to a new date, clearing daily accumulators and the
    /// breaker.
    pub async fn roll_session(&self, date: NaiveDate) {
        let mut state = self.state.write().await;
        state.roll_session(date);
        self.is_tripped.store(false, Ordering::Relaxed);
        info!(session = %date, equity = %state.equity, "Session rolled");
    }

    fn check_and_trip(
        &self,
        state: &mut PortfolioState,
        now: DateTime<Utc>,
    ) -> Option<TripReason> {
        if state.breaker_tripped {
            // Already tripped; never re-announce
            return None;
        }
        let reason = self.breach(state)?;
        state.trip(reason, now);
        self.is_tripped.store(true, Ordering::Relaxed);
        error!(
            ?reason,
            daily_loss = %state.daily_realized_loss,
            drawdown = %state.drawdown(),
            "CIRCUIT BREAKER TRIPPED"
        );
        Some(reason)
    }

    fn breach(&self, state: &PortfolioState) -> Option<TripReason> {
        if state.daily_realized_loss >= self.limits.daily_loss_limit {
            return Some(TripReason::DailyLossLimit);
        }
        if state.drawdown() >= self.limits.max_drawdown_pct {
            return Some(TripReason::MaxDrawdown);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> PortfolioSupervisor {
        let state = PortfolioState::new(
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            Decimal::new(1000, 0),
        );
        PortfolioSupervisor::new(RiskLimits::default(), SupervisorConfig::default(), state)
    }

    #[tokio::test]
    async fn test_daily_loss_limit_trips_once() {
        let supervisor = supervisor();

        assert!(supervisor.record_fill(Decimal::new(-60, 0)).await.is_none());
        assert!(!supervisor.is_tripped());

        let reason = supervisor.record_fill(Decimal::new(-50, 0)).await;
        assert_eq!(reason, Some(TripReason::DailyLossLimit));
        assert!(supervisor.is_tripped());

        // Further losses do not re-announce the trip
        assert!(supervisor.record_fill(Decimal::new(-10, 0)).await.is_none());
    }

    #[tokio::test]
    async fn test_breaker_stays_tripped_despite_wins() {
        let supervisor = supervisor();
        supervisor.record_fill(Decimal::new(-120, 0)).await;
        assert!(supervisor.is_tripped());

        // A winning exit while halted must not silently re-arm trading
        supervisor.record_fill(Decimal::new(200, 0)).await;
        assert!(supervisor.is_tripped());

        let state = supervisor.state().await;
        assert_eq!(state.trip_reason, Some(TripReason::DailyLossLimit));
    }

    #[tokio::test]
    async fn test_drawdown_trips_on_mark_to_market() {
        let supervisor = supervisor();

        let reason = supervisor.mark_to_market(Decimal::new(-100, 0)).await;
        assert_eq!(reason, Some(TripReason::MaxDrawdown));
        assert!(supervisor.is_tripped());
    }

    #[tokio::test]
    async fn test_operator_resume_clears() {
        let supervisor = supervisor();
        supervisor.halt().await;
        assert!(supervisor.is_tripped());
        assert_eq!(supervisor.state().await.trip_reason, Some(TripReason::Manual));

        supervisor.resume().await;
        assert!(!supervisor.is_tripped());
    }

    #[tokio::test]
    async fn test_session_rollover_rearms() {
        let supervisor = supervisor();
        supervisor.record_fill(Decimal::new(-150, 0)).await;
        assert!(supervisor.is_tripped());

        supervisor
            .roll_session(NaiveDate::from_ymd_opt(2025, 3, 11).unwrap())
            .await;
        assert!(!supervisor.is_tripped());
        let state = supervisor.state().await;
        assert_eq!(state.daily_realized_loss, Decimal::ZERO);
        // Losses carry into the new session's equity
        assert_eq!(state.equity, Decimal::new(850, 0));
    }
}
