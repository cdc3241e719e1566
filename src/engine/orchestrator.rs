//! Trading orchestrator
//!
//! Starts one monitor loop and one feed worker per enabled chain, and
//! tears them all down on `stop()`. The position store outlives sessions,
//! so positions left open by one session are picked up by the next.

use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chain::Chain;
use crate::config::Config;
use crate::engine::events::{EngineEvent, EventBus};
use crate::engine::intake::{FeedWorker, SubscriptionSlot};
use crate::engine::monitor::{ChainMonitor, MonitorState};
use crate::error::{Error, Result};
use crate::market::{PriceOracle, SecurityOracle};
use crate::position::{Position, PositionStore};
use crate::stream::ChainFeed;
use crate::trading::TradeExecutor;

/// External capabilities the engine drives
#[derive(Clone)]
pub struct Collaborators {
    pub prices: Arc<dyn PriceOracle>,
    pub security: Arc<dyn SecurityOracle>,
    pub executor: Arc<dyn TradeExecutor>,
    pub feed: Arc<dyn ChainFeed>,
}

/// Snapshot of one chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStatus {
    pub chain: Chain,
    pub state: MonitorState,
    pub open_positions: usize,
    pub max_positions: usize,
    pub ticks: u64,
    pub feed_connected: bool,
}

struct ChainRuntime {
    monitor: Arc<ChainMonitor>,
    monitor_task: JoinHandle<()>,
    feed_task: JoinHandle<()>,
    slot: SubscriptionSlot,
    connected: Arc<AtomicBool>,
}

struct Session {
    cancel: CancellationToken,
    chains: Vec<ChainRuntime>,
}

pub struct TradingOrchestrator {
    config: Config,
    collaborators: Collaborators,
    store: Arc<PositionStore>,
    events: EventBus,
    session: Mutex<Option<Session>>,
}

impl TradingOrchestrator {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let events = EventBus::new(config.engine.event_channel_capacity);
        Self {
            config,
            collaborators,
            store: Arc::new(PositionStore::new()),
            events,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<PositionStore> {
        self.store.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Snapshot of every open position across chains
    pub fn positions(&self) -> Vec<Position> {
        self.store.all()
    }

    /// Start every enabled chain. Calling it while running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            info!("Orchestrator already running");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let mut chains = Vec::new();

        for chain in Chain::ALL {
            let chain_config = self.config.chain(chain);
            if !chain_config.enabled {
                info!("{} disabled, not starting", chain);
                continue;
            }

            let monitor = match ChainMonitor::new(
                chain,
                chain_config.clone(),
                self.config.trading.clone(),
                self.store.clone(),
                self.collaborators.prices.clone(),
                self.collaborators.executor.clone(),
                self.events.clone(),
            ) {
                Ok(monitor) => Arc::new(monitor),
                Err(e) => {
                    error!("{} not started: {}", chain, e);
                    self.events.emit(EngineEvent::Error {
                        chain: Some(chain),
                        cause: e,
                    });
                    continue;
                }
            };

            let worker = FeedWorker::new(
                chain,
                self.collaborators.feed.clone(),
                self.collaborators.security.clone(),
                self.collaborators.executor.clone(),
                monitor.clone(),
                self.store.clone(),
                self.events.clone(),
                Duration::from_millis(self.config.feed.reconnect_delay_ms),
            );
            let slot = worker.slot();
            let connected = worker.connected();

            let monitor_task = tokio::spawn(monitor.clone().run(cancel.child_token()));
            let feed_task = tokio::spawn(worker.run(cancel.child_token()));

            chains.push(ChainRuntime {
                monitor,
                monitor_task,
                feed_task,
                slot,
                connected,
            });
        }

        if chains.is_empty() {
            return Err(Error::Config("no chain could be started".into()));
        }

        let started: Vec<Chain> = chains.iter().map(|c| c.monitor.chain()).collect();
        info!("Orchestrator started on {} chain(s): {:?}", started.len(), started);
        self.events.emit(EngineEvent::Started { chains: started });

        *session = Some(Session { cancel, chains });
        Ok(())
    }

    /// Cancel every loop and worker, wait for them within the stop timeout,
    /// and release all feed subscriptions. A buy or exit order already sent
    /// is allowed to finish and be recorded within that timeout. No
    /// collaborator is called after this returns.
    pub async fn stop(&self) {
        // Held until teardown completes so a concurrent start() waits for it
        let mut guard = self.session.lock().await;
        let Some(mut session) = guard.take() else {
            return;
        };
        info!("Stopping orchestrator...");

        for runtime in &session.chains {
            runtime.monitor.begin_stop();
        }
        session.cancel.cancel();

        let timeout = Duration::from_millis(self.config.engine.stop_timeout_ms);
        join_all(session.chains.iter_mut().map(|runtime| async move {
            let chain = runtime.monitor.chain();
            if tokio::time::timeout(timeout, &mut runtime.monitor_task)
                .await
                .is_err()
            {
                warn!("{} monitor did not stop within {:?}, aborting", chain, timeout);
                runtime.monitor_task.abort();
                runtime.monitor.mark_stopped();
            }
            if tokio::time::timeout(timeout, &mut runtime.feed_task)
                .await
                .is_err()
            {
                warn!("{} feed worker did not stop within {:?}, aborting", chain, timeout);
                runtime.feed_task.abort();
            }
        }))
        .await;

        for runtime in &session.chains {
            if let Some(handle) = runtime.slot.lock().await.take() {
                self.collaborators.feed.unsubscribe(handle);
            }
            runtime.connected.store(false, Ordering::SeqCst);
        }

        info!(
            "Orchestrator stopped ({} positions still open)",
            self.store.total_count()
        );
        self.events.emit(EngineEvent::Stopped);
    }

    /// Per-chain status of the running session; empty when stopped
    pub async fn status(&self) -> Vec<ChainStatus> {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Vec::new();
        };

        session
            .chains
            .iter()
            .map(|runtime| {
                let chain = runtime.monitor.chain();
                ChainStatus {
                    chain,
                    state: runtime.monitor.state(),
                    open_positions: self.store.count(chain),
                    max_positions: runtime.monitor.config().max_positions_per_chain,
                    ticks: runtime.monitor.ticks_completed(),
                    feed_connected: runtime.connected.load(Ordering::SeqCst),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::stream::FeedEvent;

    struct Harness {
        orchestrator: TradingOrchestrator,
        prices: Arc<MockPriceOracle>,
        security: Arc<MockSecurityOracle>,
        executor: Arc<MockExecutor>,
        feed: Arc<MockFeed>,
    }

    fn solana_only() -> Config {
        let mut config = Config::default();
        config.ethereum.enabled = false;
        config.bsc.enabled = false;
        config.solana.check_interval_ms = 100;
        config.solana.max_positions_per_chain = 1;
        config.feed.reconnect_delay_ms = 100;
        config.engine.stop_timeout_ms = 200;
        config
    }

    fn harness(config: Config) -> Harness {
        let prices = MockPriceOracle::new();
        let security = MockSecurityOracle::new();
        let executor = MockExecutor::new(prices.clone());
        let feed = MockFeed::new();
        let orchestrator = TradingOrchestrator::new(
            config,
            Collaborators {
                prices: prices.clone(),
                security: security.clone(),
                executor: executor.clone(),
                feed: feed.clone(),
            },
        );
        Harness {
            orchestrator,
            prices,
            security,
            executor,
            feed,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let h = harness(Config::default());
        let mut events = h.orchestrator.subscribe_events();

        h.orchestrator.start().await.unwrap();
        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        for chain in Chain::ALL {
            assert_eq!(h.feed.active(chain), 1);
        }
        assert_eq!(h.feed.subscribe_calls(), 3);
        match wait_for(&mut events, |e| matches!(e, EngineEvent::Started { .. })).await {
            EngineEvent::Started { chains } => assert_eq!(chains.len(), 3),
            _ => unreachable!(),
        }
        assert!(h.orchestrator.is_running().await);

        h.orchestrator.stop().await;
        assert_eq!(h.feed.total_active(), 0);
        assert!(!h.orchestrator.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_has_one_subscription_per_chain() {
        let h = harness(solana_only());

        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        h.orchestrator.stop().await;
        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(h.feed.active(Chain::Solana), 1);
        assert_eq!(h.feed.subscribe_calls(), 2);

        h.orchestrator.stop().await;
        assert_eq!(h.feed.total_active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_token_to_exit() {
        let h = harness(solana_only());
        let mut events = h.orchestrator.subscribe_events();
        h.prices.set_price(SOL_TOKEN, 100.0);

        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        h.feed.new_token(Chain::Solana, SOL_TOKEN).await;

        wait_for(&mut events, |e| matches!(e, EngineEvent::PositionOpened { .. })).await;
        assert_eq!(h.orchestrator.positions().len(), 1);

        h.prices.set_price(SOL_TOKEN, 103.0);
        match wait_for(&mut events, |e| matches!(e, EngineEvent::PositionClosed { .. })).await {
            EngineEvent::PositionClosed { realized_pnl_percent, .. } => {
                assert!((realized_pnl_percent - 3.0).abs() < 1e-9)
            }
            _ => unreachable!(),
        }
        assert!(h.orchestrator.positions().is_empty());

        h.orchestrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_capacity_makes_no_oracle_calls() {
        let h = harness(solana_only());
        let mut events = h.orchestrator.subscribe_events();
        h.prices.set_price(SOL_TOKEN, 100.0);
        h.prices.set_price(SOL_TOKEN_2, 100.0);

        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        h.feed.new_token(Chain::Solana, SOL_TOKEN).await;
        wait_for(&mut events, |e| matches!(e, EngineEvent::PositionOpened { .. })).await;

        h.feed.new_token(Chain::Solana, SOL_TOKEN_2).await;
        wait_for(&mut events, |e| matches!(e, EngineEvent::CandidateSkipped { .. })).await;

        assert_eq!(h.security.calls(), 1);
        assert_eq!(h.executor.opens(), 1);

        let status = h.orchestrator.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].open_positions, 1);
        assert_eq!(status[0].max_positions, 1);

        h.orchestrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_collaborator_calls_after_stop() {
        let h = harness(solana_only());
        let mut events = h.orchestrator.subscribe_events();
        h.prices.set_price(SOL_TOKEN, 100.0);

        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        h.feed.new_token(Chain::Solana, SOL_TOKEN).await;
        wait_for(&mut events, |e| matches!(e, EngineEvent::PositionOpened { .. })).await;

        // Leave a price fetch hanging across stop()
        h.prices.set_delay(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.orchestrator.stop().await;
        wait_for(&mut events, |e| matches!(e, EngineEvent::Stopped)).await;

        let price_calls = h.prices.calls();
        let security_calls = h.security.calls();
        let opens = h.executor.opens();
        let closes = h.executor.closes();

        h.feed.new_token(Chain::Solana, SOL_TOKEN_2).await;
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(h.prices.calls(), price_calls);
        assert_eq!(h.security.calls(), security_calls);
        assert_eq!(h.executor.opens(), opens);
        assert_eq!(h.executor.closes(), closes);
        // Positions outlive the session
        assert_eq!(h.orchestrator.positions().len(), 1);
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_submitted_exit() {
        let h = harness(solana_only());
        let mut events = h.orchestrator.subscribe_events();
        h.prices.set_price(SOL_TOKEN, 100.0);

        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        h.feed.new_token(Chain::Solana, SOL_TOKEN).await;
        wait_for(&mut events, |e| matches!(e, EngineEvent::PositionOpened { .. })).await;

        // Shorter than the 200ms stop timeout
        h.executor.set_close_delay(Duration::from_millis(100));
        h.prices.set_price(SOL_TOKEN, 90.0);
        wait_until(|| h.executor.closes() == 1).await;

        h.orchestrator.stop().await;

        assert!(h.orchestrator.positions().is_empty());
        wait_for(&mut events, |e| matches!(e, EngineEvent::PositionClosed { .. })).await;

        // Nothing left to sell on the next session
        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.executor.closes(), 1);
        h.orchestrator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_submitted_buy() {
        let h = harness(solana_only());
        let mut events = h.orchestrator.subscribe_events();
        h.prices.set_price(SOL_TOKEN, 100.0);
        h.executor.set_open_delay(Duration::from_millis(100));

        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        h.feed.new_token(Chain::Solana, SOL_TOKEN).await;
        wait_until(|| h.executor.opens() == 1).await;

        h.orchestrator.stop().await;

        assert_eq!(h.orchestrator.positions().len(), 1);
        wait_for(&mut events, |e| matches!(e, EngineEvent::PositionOpened { .. })).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_reconnect_pause() {
        let h = harness(solana_only());
        let mut events = h.orchestrator.subscribe_events();

        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(h.feed.subscribe_calls(), 1);

        h.feed.send(Chain::Solana, FeedEvent::Disconnected).await;
        wait_for(&mut events, |e| matches!(e, EngineEvent::FeedDisconnected { .. })).await;

        h.orchestrator.stop().await;
        // Well past the 100ms reconnect delay
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(h.feed.subscribe_calls(), 1);
        assert_eq!(h.feed.total_active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_feed_connection() {
        let h = harness(solana_only());
        h.orchestrator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        h.feed.send(Chain::Solana, FeedEvent::Connected).await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        let status = h.orchestrator.status().await;
        assert_eq!(status[0].state, MonitorState::Running);
        assert!(status[0].feed_connected);
        assert!(status[0].ticks >= 2);

        h.orchestrator.stop().await;
        assert!(h.orchestrator.status().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_chain_is_skipped() {
        let mut config = Config::default();
        config.ethereum.check_interval_ms = 0;
        let h = harness(config);
        let mut events = h.orchestrator.subscribe_events();

        h.orchestrator.start().await.unwrap();

        let event = wait_for(&mut events, |e| matches!(e, EngineEvent::Error { .. })).await;
        assert_eq!(event.chain(), Some(Chain::Ethereum));
        let status = h.orchestrator.status().await;
        assert_eq!(status.len(), 2);
        assert!(status.iter().all(|s| s.chain != Chain::Ethereum));

        h.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_start_fails_without_any_chain() {
        let mut config = Config::default();
        for chain in Chain::ALL {
            config.chain_mut(chain).enabled = false;
        }
        let h = harness(config);

        let result = h.orchestrator.start().await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(!h.orchestrator.is_running().await);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let h = harness(solana_only());
        h.orchestrator.stop().await;
        assert!(!h.orchestrator.is_running().await);
    }
}
