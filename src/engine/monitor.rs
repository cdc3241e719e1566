//! Per-chain monitor loop
//!
//! One `ChainMonitor` runs per chain. Each tick sweeps the chain's open
//! positions (price → trailing update → exit decision → close) and then
//! refreshes the capacity gate used by the token intake. Ticks on one chain
//! never overlap; a slow tick delays the next one instead of stacking.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::Chain;
use crate::config::{ChainConfig, TradingPolicy};
use crate::engine::events::{EngineEvent, EventBus};
use crate::error::{Error, Result};
use crate::market::PriceOracle;
use crate::position::{exit, ExitDecision, Position, PositionStore};
use crate::trading::{ExecutionParams, TradeExecutor};

/// Lifecycle of a monitor loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Stopped,
    Running,
    Stopping,
}

impl MonitorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MonitorState::Running,
            2 => MonitorState::Stopping,
            _ => MonitorState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MonitorState::Stopped => 0,
            MonitorState::Running => 1,
            MonitorState::Stopping => 2,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Positions that got a valid price and went through the exit policy
    pub evaluated: usize,
    pub closed: usize,
    pub exit_failures: usize,
    pub price_failures: usize,
    /// Free position slots on the chain after the sweep
    pub open_slots: usize,
}

/// Scheduling unit for one chain
pub struct ChainMonitor {
    chain: Chain,
    config: ChainConfig,
    policy: TradingPolicy,
    store: Arc<PositionStore>,
    prices: Arc<dyn PriceOracle>,
    executor: Arc<dyn TradeExecutor>,
    events: EventBus,
    state: AtomicU8,
    /// Serializes ticks; held for the whole sweep
    tick_lock: tokio::sync::Mutex<()>,
    ticks: AtomicU64,
    open_slots: AtomicUsize,
}

impl ChainMonitor {
    /// Build a monitor. Invalid configuration is fatal for this chain.
    pub fn new(
        chain: Chain,
        config: ChainConfig,
        policy: TradingPolicy,
        store: Arc<PositionStore>,
        prices: Arc<dyn PriceOracle>,
        executor: Arc<dyn TradeExecutor>,
        events: EventBus,
    ) -> Result<Self> {
        config.validate(chain)?;
        policy.validate()?;

        let open_slots = config
            .max_positions_per_chain
            .saturating_sub(store.count(chain));

        Ok(Self {
            chain,
            config,
            policy,
            store,
            prices,
            executor,
            events,
            state: AtomicU8::new(MonitorState::Stopped.as_u8()),
            tick_lock: tokio::sync::Mutex::new(()),
            ticks: AtomicU64::new(0),
            open_slots: AtomicUsize::new(open_slots),
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn policy(&self) -> &TradingPolicy {
        &self.policy
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Free slots as of the last completed tick
    pub fn open_slots(&self) -> usize {
        self.open_slots.load(Ordering::SeqCst)
    }

    /// Live capacity check against the store
    pub fn has_capacity(&self) -> bool {
        self.store.count(self.chain) < self.config.max_positions_per_chain
    }

    pub fn execution_params(&self) -> ExecutionParams {
        ExecutionParams {
            slippage_percent: self.config.slippage_percent,
            gas_boost_multiplier: self.policy.gas_boost_multiplier,
        }
    }

    /// Mark the loop as winding down; `run` finishes the transition
    pub fn begin_stop(&self) {
        let _ = self.state.compare_exchange(
            MonitorState::Running.as_u8(),
            MonitorState::Stopping.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Force the final state, for loops that had to be aborted
    pub fn mark_stopped(&self) {
        self.set_state(MonitorState::Stopped);
    }

    fn set_state(&self, state: MonitorState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Tick until cancelled. Cancellation is honoured between positions and
    /// while waiting on a price; an exit order already submitted runs to
    /// completion so its position is removed and reported.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.set_state(MonitorState::Running);
        info!(
            "{} monitor running: interval={}ms, TP={}%, SL={}%, max_positions={}",
            self.chain,
            self.config.check_interval_ms,
            self.config.min_profit_percent,
            self.config.max_loss_percent,
            self.config.max_positions_per_chain
        );

        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.check_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let report = self.tick_until(&cancel).await;
            if report.closed > 0 || report.exit_failures > 0 || report.price_failures > 0 {
                info!("{} tick: {:?}", self.chain, report);
            } else {
                debug!("{} tick: {:?}", self.chain, report);
            }
        }

        self.set_state(MonitorState::Stopped);
        info!("{} monitor stopped after {} ticks", self.chain, self.ticks_completed());
    }

    /// Run one tick: position sweep, then opportunity gate
    pub async fn tick(&self) -> TickReport {
        self.tick_until(&CancellationToken::new()).await
    }

    /// Run one tick, cutting the sweep short once `cancel` fires
    pub async fn tick_until(&self, cancel: &CancellationToken) -> TickReport {
        let _guard = self.tick_lock.lock().await;

        let mut report = TickReport::default();
        self.sweep_positions(&mut report, cancel).await;
        report.open_slots = self.scan_opportunities();

        self.ticks.fetch_add(1, Ordering::SeqCst);
        report
    }

    async fn sweep_positions(&self, report: &mut TickReport, cancel: &CancellationToken) {
        for mut position in self.store.list_by_chain(self.chain) {
            if cancel.is_cancelled() {
                self.begin_stop();
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                price = self.fetch_price(&position) => Some(price),
            };
            let price = match fetched {
                None => {
                    debug!("{} sweep cancelled while pricing {}", self.chain, position.id);
                    self.begin_stop();
                    break;
                }
                Some(Ok(price)) => price,
                Some(Err(e)) => {
                    report.price_failures += 1;
                    warn!(
                        "{} price fetch failed for {} ({}): {}",
                        self.chain, position.token_address, position.id, e
                    );
                    self.events.emit(EngineEvent::PriceFetchFailed {
                        chain: self.chain,
                        position_id: position.id.clone(),
                        token_address: position.token_address.clone(),
                        error: e,
                    });
                    continue;
                }
            };
            report.evaluated += 1;

            if self.policy.trailing_stop_enabled
                && exit::trail(&mut position, price, self.policy.trailing_stop_percent)
            {
                if let Err(e) = self.store.apply_trailing(
                    &position.id,
                    position.highest_price_seen,
                    position.stop_price,
                ) {
                    self.report_inconsistency(e);
                    continue;
                }
                debug!(
                    "{} {} new high {}, stop raised to {}",
                    self.chain, position.token_address, position.highest_price_seen,
                    position.stop_price
                );
            }

            let decision = exit::evaluate(&position, price, &self.config, &self.policy);
            if !decision.is_exit() {
                continue;
            }
            if cancel.is_cancelled() {
                self.begin_stop();
                break;
            }

            info!(
                "{} exit triggered for {}: {} at {:.2}% P&L",
                self.chain,
                position.token_address,
                decision,
                position.pnl_percent(price)
            );

            // Not raced against cancel: a submitted exit must be recorded
            if self.close_position(position, decision).await {
                report.closed += 1;
            } else {
                report.exit_failures += 1;
            }
        }
    }

    async fn fetch_price(&self, position: &Position) -> Result<f64> {
        let price = self
            .prices
            .get_price(self.chain, &position.token_address)
            .await?;

        if price.is_finite() && price > 0.0 {
            Ok(price)
        } else {
            Err(Error::Unavailable(format!(
                "oracle returned invalid price {}",
                price
            )))
        }
    }

    /// Submit the exit order; the position leaves the store only once the
    /// executor has accepted it. Returns whether the position was closed.
    async fn close_position(&self, position: Position, decision: ExitDecision) -> bool {
        let fill = match self
            .executor
            .close(&position, &self.execution_params())
            .await
        {
            Ok(fill) => fill,
            Err(e) => {
                warn!(
                    "{} exit failed for {} ({}), will retry next tick: {}",
                    self.chain, position.token_address, decision, e
                );
                self.events.emit(EngineEvent::ExitFailed {
                    position,
                    decision,
                    error: e,
                });
                return false;
            }
        };

        match self.store.remove(&position.id) {
            Ok(removed) => {
                let realized_pnl_percent = removed.pnl_percent(fill.fill_price);
                info!(
                    "{} closed {} ({}) at {} with {:.2}% P&L, tx {}",
                    self.chain,
                    removed.token_address,
                    decision,
                    fill.fill_price,
                    realized_pnl_percent,
                    fill.tx_ref
                );
                self.events.emit(EngineEvent::PositionClosed {
                    position: removed,
                    fill_price: fill.fill_price,
                    realized_pnl_percent,
                    decision,
                    tx_ref: fill.tx_ref,
                });
                true
            }
            Err(e) => {
                self.report_inconsistency(e);
                false
            }
        }
    }

    /// Recompute the capacity gate, returning the free slots
    fn scan_opportunities(&self) -> usize {
        let count = self.store.count(self.chain);
        let slots = self.config.max_positions_per_chain.saturating_sub(count);
        let previous = self.open_slots.swap(slots, Ordering::SeqCst);

        if previous == 0 && slots > 0 {
            info!("{} accepting new tokens ({} slots free)", self.chain, slots);
        } else if previous > 0 && slots == 0 {
            info!(
                "{} at capacity ({} positions), ignoring new tokens",
                self.chain, count
            );
        }
        slots
    }

    fn report_inconsistency(&self, e: Error) {
        error!("{} position store inconsistency: {}", self.chain, e);
        self.events.emit(EngineEvent::Error {
            chain: Some(self.chain),
            cause: e,
        });
    }
}
