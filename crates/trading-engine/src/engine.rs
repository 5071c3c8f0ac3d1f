//! The orchestrating trading engine.
//!
//! Each tick, every tracked market is evaluated concurrently: fetch a
//! snapshot, run the open position's exit rules or try to form and size a
//! new entry. One market failing never takes the tick down; markets whose
//! lifecycle state is corrupt are quarantined until reconciled.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use market_core::config::EngineConfig;
use market_core::store::{SessionSnapshot, SessionStore};
use market_core::types::{
    Decision, Direction, Fill, MarketSnapshot, Position, SnapshotHistory, TripReason,
};
use market_core::{Error, Result};
use risk_manager::{PortfolioSupervisor, PositionSizer, SizerConfig, SizingContext};
use rust_decimal::Decimal;
use signal_engine::aggregator::AggregatorConfig;
use signal_engine::{SignalAggregator, SignalGenerator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::feed::SnapshotFeed;
use crate::gateway::ExecutionGateway;
use crate::lifecycle::{LifecycleConfig, MarketLifecycle};
use crate::notifier::{EngineEvent, Notifier};

#[derive(Debug, Clone)]
pub struct TradingEngineConfig {
    pub markets: Vec<String>,
    /// Budget for fetching one market's snapshot. Never applied once an
    /// order may be in flight.
    pub fetch_timeout: Duration,
    /// Snapshots older than this are treated as no data.
    pub max_snapshot_age_secs: i64,
    pub history_capacity: usize,
    pub lifecycle: LifecycleConfig,
    pub aggregator: AggregatorConfig,
    pub sizer: SizerConfig,
}

impl Default for TradingEngineConfig {
    fn default() -> Self {
        Self {
            markets: Vec::new(),
            fetch_timeout: Duration::from_secs(10),
            max_snapshot_age_secs: 120,
            history_capacity: 500,
            lifecycle: LifecycleConfig::default(),
            aggregator: AggregatorConfig::default(),
            sizer: SizerConfig::default(),
        }
    }
}

impl TradingEngineConfig {
    /// Derive the engine-loop knobs from the loaded environment config;
    /// component configs keep their defaults unless overridden afterwards.
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            markets: config.markets.clone(),
            max_snapshot_age_secs: config.max_snapshot_age_secs,
            ..Self::default()
        }
    }
}

/// Point-in-time engine health, for logging and the stats endpoint of
/// whatever runner embeds the engine.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub open_positions: usize,
    pub quarantined_markets: usize,
    pub equity: Decimal,
    pub breaker_tripped: bool,
}

/// Pre-tick exposure picture handed to each market task, so every sizing
/// decision within a tick sees the same portfolio.
#[derive(Debug, Clone, Default)]
struct ExposureSnapshot {
    open_exposure: Decimal,
    market_exposure: Decimal,
    open_direction: Option<Direction>,
}

pub struct TradingEngine {
    config: TradingEngineConfig,
    feed: Arc<dyn SnapshotFeed>,
    gateway: Arc<dyn ExecutionGateway>,
    generators: Vec<Arc<dyn SignalGenerator>>,
    aggregator: SignalAggregator,
    sizer: PositionSizer,
    supervisor: Arc<PortfolioSupervisor>,
    notifier: Arc<Notifier>,
    /// Shared history book; generators that look across markets read it too.
    histories: Arc<DashMap<String, SnapshotHistory>>,
    lifecycles: DashMap<String, Arc<Mutex<MarketLifecycle>>>,
    /// Markets sidelined by state corruption until reconciliation clears them.
    quarantined: DashSet<String>,
    store: Option<SessionStore>,
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TradingEngineConfig,
        feed: Arc<dyn SnapshotFeed>,
        gateway: Arc<dyn ExecutionGateway>,
        generators: Vec<Arc<dyn SignalGenerator>>,
        supervisor: Arc<PortfolioSupervisor>,
        notifier: Arc<Notifier>,
        histories: Arc<DashMap<String, SnapshotHistory>>,
        store: Option<SessionStore>,
    ) -> Self {
        let lifecycles = DashMap::new();
        for market in &config.markets {
            lifecycles.insert(
                market.clone(),
                Arc::new(Mutex::new(MarketLifecycle::new(
                    market.clone(),
                    config.lifecycle.clone(),
                    Arc::clone(&gateway),
                    Arc::clone(&notifier),
                ))),
            );
        }
        Self {
            aggregator: SignalAggregator::new(config.aggregator.clone()),
            sizer: PositionSizer::new(config.sizer.clone()),
            config,
            feed,
            gateway,
            generators,
            supervisor,
            notifier,
            histories,
            lifecycles,
            quarantined: DashSet::new(),
            store,
        }
    }

    /// Seed open positions recovered from a persisted session.
    pub async fn restore(&self, snapshot: SessionSnapshot) -> Result<()> {
        for position in snapshot.open_positions {
            let Some(lifecycle) = self.lifecycles.get(&position.market_id) else {
                warn!(
                    market = %position.market_id,
                    "Persisted position for an untracked market, dropping"
                );
                continue;
            };
            let lifecycle = Arc::clone(&lifecycle);
            lifecycle.lock().await.restore(position)?;
        }
        info!("Session restored from disk");
        Ok(())
    }

    /// Run one full evaluation tick over all tracked markets. Returns the
    /// decisions that made it all the way to a submitted entry.
    pub async fn evaluate_markets(self: &Arc<Self>, now: DateTime<Utc>) -> Vec<Decision> {
        let mut tasks = JoinSet::new();
        for market in &self.config.markets {
            if self.quarantined.contains(market) {
                debug!(market = %market, "Skipping quarantined market");
                continue;
            }
            let engine = Arc::clone(self);
            let market = market.clone();
            tasks.spawn(async move {
                let outcome = engine.tick_market(&market, now).await;
                (market, outcome)
            });
        }

        let mut entered = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (market, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "Market tick task panicked");
                    continue;
                }
            };
            match outcome {
                Ok(Some(decision)) => entered.push(decision),
                Ok(None) => {}
                Err(Error::DataUnavailable(msg)) => {
                    debug!(market = %market, %msg, "No usable data this tick");
                }
                Err(Error::InsufficientSignal(msg)) => {
                    debug!(market = %market, %msg, "No actionable signal");
                }
                Err(Error::RiskRejected(msg)) => {
                    warn!(market = %market, %msg, "Entry rejected by risk checks");
                }
                Err(Error::StateCorruption(msg)) => {
                    error!(market = %market, %msg, "State corruption, quarantining market");
                    self.quarantined.insert(market.clone());
                    if let Err(e) = self.reconcile_market(&market).await {
                        error!(market = %market, error = %e, "Reconciliation failed");
                    }
                }
                Err(e) => {
                    warn!(market = %market, error = %e, "Market tick failed");
                }
            }
        }

        if let Some(reason) = self.mark_to_market().await {
            self.handle_trip(reason).await;
        }
        if let Err(e) = self.persist().await {
            error!(error = %e, "Session persistence failed");
        }
        entered
    }

    async fn tick_market(&self, market_id: &str, now: DateTime<Utc>) -> Result<Option<Decision>> {
        let snapshot = tokio::time::timeout(self.config.fetch_timeout, self.feed.latest(market_id))
            .await
            .map_err(|_| Error::DataUnavailable(format!("snapshot fetch timed out for {market_id}")))?
            .map_err(|e| Error::DataUnavailable(e.to_string()))?;

        if snapshot.is_stale(now, self.config.max_snapshot_age_secs) {
            return Err(Error::DataUnavailable(format!(
                "snapshot for {market_id} is stale"
            )));
        }

        // Clone the history out so no map shard lock is held while
        // generators run; the pair generator reads other markets' entries
        let history = {
            let mut entry = self
                .histories
                .entry(market_id.to_string())
                .or_insert_with(|| SnapshotHistory::new(self.config.history_capacity));
            entry.push(snapshot.clone());
            entry.clone()
        };

        // Taken before the lifecycle lock: exposure_snapshot locks every
        // lifecycle in turn, and no task may hold one lifecycle lock while
        // acquiring another
        let exposures = self.exposure_snapshot(market_id).await;

        let lifecycle = self
            .lifecycles
            .get(market_id)
            .map(|l| Arc::clone(&l))
            .ok_or_else(|| Error::StateCorruption(format!("no lifecycle for {market_id}")))?;
        let mut lifecycle = lifecycle.lock().await;
        let recent_volatility = history.realized_volatility(10);

        if !lifecycle.is_idle() {
            // Manage the existing position or in-flight order
            lifecycle.on_snapshot(&snapshot, recent_volatility, now).await?;
            return Ok(None);
        }

        if self.supervisor.is_tripped() {
            return Err(Error::RiskRejected("circuit breaker tripped".to_string()));
        }

        let signals: Vec<_> = self
            .generators
            .iter()
            .filter_map(|g| g.evaluate(market_id, &history))
            .collect();
        let Some(decision) = self.aggregator.aggregate(market_id, &signals, now) else {
            return Err(Error::InsufficientSignal(format!(
                "{} of {} generators fired for {market_id}, no consensus",
                signals.len(),
                self.generators.len()
            )));
        };

        let price = snapshot.mark_price();
        let portfolio = self.supervisor.state().await;
        let quantity = self
            .sizer
            .size(
                &decision,
                price,
                &SizingContext {
                    portfolio: &portfolio,
                    limits: self.supervisor.limits(),
                    open_exposure: exposures.open_exposure,
                    market_exposure: exposures.market_exposure,
                    open_direction: exposures.open_direction,
                    recent_volatility,
                },
            )
            .map_err(|reason| Error::RiskRejected(reason.to_string()))?;

        lifecycle.submit_entry(&decision, quantity, price).await?;
        Ok(Some(decision))
    }

    /// Route a fill report to the lifecycle that owns its order.
    pub async fn on_fill(&self, fill: &Fill) -> Result<()> {
        let mut owner = None;
        for entry in self.lifecycles.iter() {
            let lifecycle = Arc::clone(entry.value());
            if lifecycle.lock().await.matches_order(fill.order_id) {
                owner = Some((entry.key().clone(), lifecycle));
                break;
            }
        }

        let Some((market, lifecycle)) = owner else {
            warn!(order = %fill.order_id, "Fill for unknown order, reconciling all markets");
            self.reconcile_all().await;
            return Err(Error::StateCorruption(format!(
                "fill for unknown order {}",
                fill.order_id
            )));
        };

        let closed = lifecycle.lock().await.on_fill(fill)?;
        if let Some(trade) = closed {
            info!(
                market = %market,
                pnl = %trade.realized_pnl,
                reason = ?trade.reason,
                "Round trip completed"
            );
            if let Some(reason) = self.supervisor.record_fill(trade.realized_pnl).await {
                self.handle_trip(reason).await;
            }
            // The closed position no longer contributes to the mark
            if let Some(reason) = self.mark_to_market().await {
                self.handle_trip(reason).await;
            }
            if let Err(e) = self.persist().await {
                error!(error = %e, "Session persistence failed");
            }
        }
        Ok(())
    }

    /// Operator halt: trips the breaker manually.
    pub async fn halt(&self) {
        self.supervisor.halt().await;
    }

    /// Operator resume: clears the breaker.
    pub async fn resume(&self) {
        self.supervisor.resume().await;
    }

    /// Roll to a new trading session at the day boundary.
    pub async fn roll_session(&self, date: chrono::NaiveDate) {
        self.supervisor.roll_session(date).await;
        if let Err(e) = self.persist().await {
            error!(error = %e, "Session persistence failed");
        }
    }

    pub async fn stats(&self) -> EngineStats {
        let mut open_positions = 0;
        for entry in self.lifecycles.iter() {
            if entry.value().lock().await.open_position().is_some() {
                open_positions += 1;
            }
        }
        let state = self.supervisor.state().await;
        EngineStats {
            open_positions,
            quarantined_markets: self.quarantined.len(),
            equity: state.marked_equity(),
            breaker_tripped: state.breaker_tripped,
        }
    }

    /// Pending entry orders count too: a concurrent tick must see the
    /// notional another market just committed, not only settled positions.
    async fn exposure_snapshot(&self, market_id: &str) -> ExposureSnapshot {
        let mut snapshot = ExposureSnapshot::default();
        for entry in self.lifecycles.iter() {
            let lifecycle = entry.value().lock().await;
            if let Some((notional, direction)) = lifecycle.committed_exposure() {
                snapshot.open_exposure += notional;
                if entry.key() == market_id {
                    snapshot.market_exposure += notional;
                    snapshot.open_direction = Some(direction);
                }
            }
        }
        snapshot
    }

    /// Mark all open positions to the latest prices and feed the total
    /// unrealized P&L to the supervisor. Returns a newly raised trip.
    async fn mark_to_market(&self) -> Option<TripReason> {
        let mut unrealized = Decimal::ZERO;
        for entry in self.lifecycles.iter() {
            let lifecycle = entry.value().lock().await;
            if let Some(position) = lifecycle.open_position() {
                if let Some(price) = self.latest_price(entry.key()) {
                    unrealized += position.unrealized_pnl(price);
                }
            }
        }
        self.supervisor.mark_to_market(unrealized).await
    }

    async fn handle_trip(&self, reason: TripReason) {
        let state = self.supervisor.state().await;
        error!(?reason, equity = %state.marked_equity(), "Circuit breaker engaged");
        self.notifier
            .publish(EngineEvent::CircuitBreakerTripped { reason, state });

        if self.supervisor.flatten_on_breach() {
            for entry in self.lifecycles.iter() {
                let Some(price) = self.latest_price(entry.key()) else {
                    continue;
                };
                let mut lifecycle = entry.value().lock().await;
                if let Err(e) = lifecycle.force_exit(price).await {
                    error!(market = %entry.key(), error = %e, "Breach flatten failed");
                }
            }
        }
    }

    async fn reconcile_market(&self, market_id: &str) -> Result<()> {
        let live = match self.gateway.open_orders().await {
            Ok(ids) => ids,
            Err(e) => {
                // Cannot see the venue's truth; halting is the only safe move
                error!(error = %e, "Venue unreachable during reconciliation, halting");
                self.supervisor.halt().await;
                return Err(Error::ExecutionFailure(e.to_string()));
            }
        };
        if let Some(lifecycle) = self.lifecycles.get(market_id) {
            let lifecycle = Arc::clone(&lifecycle);
            lifecycle.lock().await.reconcile(&live)?;
        }
        self.quarantined.remove(market_id);
        info!(market = %market_id, "Market reconciled and released");
        Ok(())
    }

    async fn reconcile_all(&self) {
        let markets: Vec<String> = self.lifecycles.iter().map(|e| e.key().clone()).collect();
        for market in markets {
            if let Err(e) = self.reconcile_market(&market).await {
                error!(market = %market, error = %e, "Reconciliation failed");
            }
        }
    }

    async fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let state = self.supervisor.state().await;
        let mut open_positions: Vec<Position> = Vec::new();
        for entry in self.lifecycles.iter() {
            if let Some(position) = entry.value().lock().await.open_position() {
                open_positions.push(position.clone());
            }
        }
        store.save(&state, &open_positions)
    }

    fn latest_price(&self, market_id: &str) -> Option<Decimal> {
        self.histories
            .get(market_id)
            .and_then(|h| h.latest().map(|s: &MarketSnapshot| s.mark_price()))
    }
}
