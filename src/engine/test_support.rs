//! Scriptable collaborators for engine tests

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::chain::Chain;
use crate::engine::events::EngineEvent;
use crate::error::{Error, Result};
use crate::market::{PriceOracle, SecurityOracle, SecurityVerdict};
use crate::position::Position;
use crate::stream::{ChainFeed, FeedEvent, NewTokenEvent, Subscription, SubscriptionHandle, TokenSource};
use crate::trading::{CloseFill, ExecutionParams, OpenFill, OpenOrder, TradeExecutor};

pub const SOL_TOKEN: &str = "So11111111111111111111111111111111111111112";
pub const SOL_TOKEN_2: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const EVM_TOKEN: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";

#[derive(Default)]
pub struct MockPriceOracle {
    prices: DashMap<String, f64>,
    failing: DashMap<String, ()>,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
}

impl MockPriceOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_price(&self, token: &str, price: f64) {
        self.prices.insert(token.to_string(), price);
    }

    pub fn price(&self, token: &str) -> Option<f64> {
        self.prices.get(token).map(|p| *p)
    }

    pub fn fail(&self, token: &str) {
        self.failing.insert(token.to_string(), ());
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for MockPriceOracle {
    async fn get_price(&self, _chain: Chain, token_address: &str) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.contains_key(token_address) {
            return Err(Error::Unavailable(format!("no quote for {}", token_address)));
        }
        self.price(token_address)
            .ok_or_else(|| Error::Unavailable(format!("unknown token {}", token_address)))
    }
}

pub struct MockSecurityOracle {
    verdict: Mutex<SecurityVerdict>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockSecurityOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            verdict: Mutex::new(SecurityVerdict::safe()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_verdict(&self, verdict: SecurityVerdict) {
        *self.verdict.lock().unwrap() = verdict;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecurityOracle for MockSecurityOracle {
    async fn evaluate(&self, _chain: Chain, _token_address: &str) -> Result<SecurityVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("security api down".into()));
        }
        Ok(self.verdict.lock().unwrap().clone())
    }
}

/// Fills at whatever the paired price oracle currently quotes
pub struct MockExecutor {
    prices: Arc<MockPriceOracle>,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    open_delay_ms: AtomicU64,
    close_delay_ms: AtomicU64,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl MockExecutor {
    pub fn new(prices: Arc<MockPriceOracle>) -> Arc<Self> {
        Arc::new(Self {
            prices,
            fail_open: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            open_delay_ms: AtomicU64::new(0),
            close_delay_ms: AtomicU64::new(0),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_close_delay(&self, delay: Duration) {
        self.close_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeExecutor for MockExecutor {
    async fn open(&self, order: &OpenOrder) -> Result<OpenFill> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let delay = self.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::ExecutionFailed("router reverted".into()));
        }
        let price = self.prices.price(&order.token_address).unwrap_or(1.0);
        Ok(OpenFill {
            fill_price: price,
            quantity: order.quote_amount / price,
            tx_ref: format!("buy-{}", self.opens()),
        })
    }

    async fn close(&self, position: &Position, _params: &ExecutionParams) -> Result<CloseFill> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let delay = self.close_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(Error::ExecutionFailed("sell reverted".into()));
        }
        let price = self
            .prices
            .price(&position.token_address)
            .unwrap_or(position.entry_price);
        Ok(CloseFill {
            fill_price: price,
            tx_ref: format!("sell-{}", self.closes()),
        })
    }
}

/// In-memory feed; tests push events into live subscriptions
#[derive(Default)]
pub struct MockFeed {
    next_handle: AtomicU64,
    senders: DashMap<SubscriptionHandle, (Chain, mpsc::Sender<FeedEvent>)>,
    subscribe_calls: AtomicUsize,
    fail_subscribe: AtomicBool,
}

impl MockFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn active(&self, chain: Chain) -> usize {
        self.senders.iter().filter(|e| e.value().0 == chain).count()
    }

    pub fn total_active(&self) -> usize {
        self.senders.len()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Deliver an event to every live subscription on `chain`
    pub async fn send(&self, chain: Chain, event: FeedEvent) {
        let senders: Vec<_> = self
            .senders
            .iter()
            .filter(|e| e.value().0 == chain)
            .map(|e| e.value().1.clone())
            .collect();
        for tx in senders {
            let _ = tx.send(event.clone()).await;
        }
    }

    pub async fn new_token(&self, chain: Chain, token: &str) {
        self.send(
            chain,
            FeedEvent::NewToken(NewTokenEvent::new(chain, token, TokenSource::NewPair)),
        )
        .await;
    }
}

impl ChainFeed for MockFeed {
    fn subscribe(&self, chain: Chain) -> Result<Subscription> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::FeedSubscription("endpoint refused".into()));
        }
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(64);
        self.senders.insert(handle, (chain, tx));
        Ok(Subscription { handle, events: rx })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.senders.remove(&handle);
    }
}

/// Wait for the first event matching `pred`, failing the test after 5s
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<EngineEvent>, mut pred: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
