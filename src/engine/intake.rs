//! Per-chain token intake
//!
//! Consumes a chain feed subscription and turns new tokens into positions:
//! capacity gate → address / duplicate checks → security check → buy →
//! store. Owns reconnection with a fixed delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::Chain;
use crate::engine::events::{EngineEvent, EventBus, SkipReason};
use crate::engine::monitor::ChainMonitor;
use crate::error::Error;
use crate::market::SecurityOracle;
use crate::position::{Position, PositionStore, WalletRef};
use crate::stream::{ChainFeed, FeedEvent, NewTokenEvent, Subscription, SubscriptionHandle};
use crate::trading::{OpenOrder, TradeExecutor};

/// The live subscription of one chain, shared with the orchestrator so
/// `stop()` can release it.
pub type SubscriptionSlot = Arc<Mutex<Option<SubscriptionHandle>>>;

/// How a subscription ended
enum Ended {
    Cancelled,
    Disconnected,
}

pub struct FeedWorker {
    chain: Chain,
    feed: Arc<dyn ChainFeed>,
    security: Arc<dyn SecurityOracle>,
    executor: Arc<dyn TradeExecutor>,
    monitor: Arc<ChainMonitor>,
    store: Arc<PositionStore>,
    events: EventBus,
    reconnect_delay: Duration,
    slot: SubscriptionSlot,
    connected: Arc<AtomicBool>,
}

impl FeedWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Chain,
        feed: Arc<dyn ChainFeed>,
        security: Arc<dyn SecurityOracle>,
        executor: Arc<dyn TradeExecutor>,
        monitor: Arc<ChainMonitor>,
        store: Arc<PositionStore>,
        events: EventBus,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            chain,
            feed,
            security,
            executor,
            monitor,
            store,
            events,
            reconnect_delay,
            slot: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn slot(&self) -> SubscriptionSlot {
        self.slot.clone()
    }

    /// Connection flag, true between `Connected` and the end of a subscription
    pub fn connected(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    /// Subscribe, consume, and resubscribe until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        info!("{} feed worker starting", self.chain);

        loop {
            let subscription = match self.subscribe(&cancel).await {
                None => break,
                Some(Ok(subscription)) => subscription,
                Some(Err(e)) => {
                    warn!("{} feed subscribe failed: {}", self.chain, e);
                    self.events.emit(EngineEvent::Error {
                        chain: Some(self.chain),
                        cause: e,
                    });
                    if !self.pause(&cancel).await {
                        break;
                    }
                    continue;
                }
            };
            info!("{} feed subscribed ({})", self.chain, subscription.handle);

            match self.consume(subscription, &cancel).await {
                Ended::Cancelled => break,
                Ended::Disconnected => {
                    self.connected.store(false, Ordering::SeqCst);
                    self.release().await;
                    self.events.emit(EngineEvent::FeedDisconnected { chain: self.chain });
                    warn!(
                        "{} feed disconnected, reconnecting in {:?}",
                        self.chain, self.reconnect_delay
                    );
                    if !self.pause(&cancel).await {
                        break;
                    }
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("{} feed worker stopped", self.chain);
    }

    /// Subscribe and record the handle. Runs under the slot lock after a
    /// cancellation check, so a subscription made here is always visible
    /// to `stop()`. Returns `None` once cancelled.
    async fn subscribe(&self, cancel: &CancellationToken) -> Option<crate::Result<Subscription>> {
        let mut slot = self.slot.lock().await;
        if cancel.is_cancelled() {
            return None;
        }
        let result = self.feed.subscribe(self.chain);
        if let Ok(subscription) = &result {
            *slot = Some(subscription.handle);
        }
        Some(result)
    }

    async fn release(&self) {
        if let Some(handle) = self.slot.lock().await.take() {
            debug!("{} releasing {}", self.chain, handle);
            self.feed.unsubscribe(handle);
        }
    }

    /// Fixed reconnect delay; false if cancelled while waiting
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }

    async fn consume(&self, mut subscription: Subscription, cancel: &CancellationToken) -> Ended {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ended::Cancelled,
                event = subscription.events.recv() => event,
            };

            match event {
                Some(FeedEvent::NewToken(token)) => {
                    self.handle_new_token_until(token, cancel).await;
                }
                Some(FeedEvent::Connected) => {
                    self.connected.store(true, Ordering::SeqCst);
                    info!("{} feed connected", self.chain);
                    self.events.emit(EngineEvent::FeedConnected { chain: self.chain });
                }
                Some(FeedEvent::Error(msg)) => {
                    warn!("{} feed error: {}", self.chain, msg);
                    self.events.emit(EngineEvent::Error {
                        chain: Some(self.chain),
                        cause: Error::FeedSubscription(msg),
                    });
                }
                Some(FeedEvent::Disconnected) | None => return Ended::Disconnected,
            }
        }
    }

    fn skip(&self, token_address: String, reason: SkipReason) {
        debug!("{} skipping {}: {:?}", self.chain, token_address, reason);
        self.events.emit(EngineEvent::CandidateSkipped {
            chain: self.chain,
            token_address,
            reason,
        });
    }

    /// Evaluate one candidate token and buy it if it passes
    pub async fn handle_new_token(&self, token: NewTokenEvent) {
        self.handle_new_token_until(token, &CancellationToken::new())
            .await
    }

    /// As [`handle_new_token`](Self::handle_new_token), giving up before the
    /// buy once `cancel` fires. A buy already sent is always recorded.
    pub async fn handle_new_token_until(&self, token: NewTokenEvent, cancel: &CancellationToken) {
        if token.chain != self.chain {
            debug!(
                "{} feed delivered a {} token, ignoring {}",
                self.chain, token.chain, token.token_address
            );
            return;
        }
        let token_address = token.token_address;

        // Cheap gates first; none of them touch a collaborator
        if !self.monitor.has_capacity() {
            return self.skip(token_address, SkipReason::CapacityReached);
        }
        if !self.chain.is_valid_token_address(&token_address) {
            return self.skip(token_address, SkipReason::InvalidAddress);
        }
        if self.store.holds_token(self.chain, &token_address) {
            return self.skip(token_address, SkipReason::AlreadyHeld);
        }

        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} dropping {} during shutdown", self.chain, token_address);
                return;
            }
            verdict = self.security.evaluate(self.chain, &token_address) => verdict,
        };
        match verdict {
            Ok(verdict) if verdict.safe => {}
            Ok(verdict) => {
                warn!(
                    "{} security check flagged {}: {}",
                    self.chain,
                    token_address,
                    verdict.reasons.join(", ")
                );
                self.events.emit(EngineEvent::SecurityWarning {
                    chain: self.chain,
                    token_address,
                    reasons: verdict.reasons,
                });
                return;
            }
            Err(e) => {
                warn!("{} security check failed for {}: {}", self.chain, token_address, e);
                self.events.emit(EngineEvent::Error {
                    chain: Some(self.chain),
                    cause: e,
                });
                return;
            }
        }

        if cancel.is_cancelled() {
            debug!("{} dropping {} during shutdown", self.chain, token_address);
            return;
        }

        let config = self.monitor.config();
        let order = OpenOrder {
            chain: self.chain,
            token_address: token_address.clone(),
            quote_amount: config.quote_amount,
            params: self.monitor.execution_params(),
            wallet: WalletRef::new(config.wallet.clone()),
        };

        info!(
            "{} buying {} for {} {} ({:?})",
            self.chain,
            token_address,
            order.quote_amount,
            self.chain.native_symbol(),
            token.source
        );

        let fill = match self.executor.open(&order).await {
            Ok(fill) => fill,
            Err(e) => return self.open_failed(token_address, e),
        };

        let policy = self.monitor.policy();
        let trailing = policy
            .trailing_stop_enabled
            .then_some(policy.trailing_stop_percent);
        let position = match Position::open(
            self.chain,
            token_address.clone(),
            fill.quantity,
            fill.fill_price,
            order.wallet,
            fill.tx_ref,
            trailing,
        ) {
            Ok(position) => position,
            Err(e) => return self.open_failed(token_address, e),
        };

        if let Err(e) = self.store.add(position.clone()) {
            error!("{} could not record position {}: {}", self.chain, position.id, e);
            self.events.emit(EngineEvent::Error {
                chain: Some(self.chain),
                cause: e,
            });
            return;
        }

        info!(
            "{} opened {} @ {} (qty {}, tx {})",
            self.chain,
            position.token_address,
            position.entry_price,
            position.quantity,
            self.chain.tx_url(&position.open_tx_ref)
        );
        self.events.emit(EngineEvent::PositionOpened { position });
    }

    fn open_failed(&self, token_address: String, error: Error) {
        warn!("{} buy failed for {}: {}", self.chain, token_address, error);
        self.events.emit(EngineEvent::OpenFailed {
            chain: self.chain,
            token_address,
            error,
        });
    }
}
