//! Simulated chain feed
//!
//! Each subscription gets its own generator task that reports `Connected`,
//! then emits a random token every `new_token_interval_ms` and occasionally
//! drops the connection.

use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::random_token_address;
use crate::chain::Chain;
use crate::config::PaperConfig;
use crate::error::{Error, Result};
use crate::stream::{
    ChainFeed, FeedEvent, NewTokenEvent, Subscription, SubscriptionHandle, TokenSource,
};

pub struct PaperFeed {
    interval: Duration,
    disconnect_probability: f64,
    channel_capacity: usize,
    next_handle: AtomicU64,
    live: DashMap<SubscriptionHandle, CancellationToken>,
}

impl PaperFeed {
    pub fn new(config: &PaperConfig, channel_capacity: usize) -> Self {
        Self {
            interval: Duration::from_millis(config.new_token_interval_ms.max(1)),
            disconnect_probability: if config.disconnect_probability.is_finite() {
                config.disconnect_probability.clamp(0.0, 1.0)
            } else {
                0.0
            },
            channel_capacity: channel_capacity.max(1),
            next_handle: AtomicU64::new(1),
            live: DashMap::new(),
        }
    }

    pub fn live_subscriptions(&self) -> usize {
        self.live.len()
    }
}

/// Next simulated event; `None` means the connection drops
fn next_token(chain: Chain, disconnect_probability: f64) -> Option<NewTokenEvent> {
    let mut rng = rand::thread_rng();
    if rng.gen_bool(disconnect_probability) {
        return None;
    }
    let source = if rng.gen_bool(0.5) {
        TokenSource::Mempool
    } else {
        TokenSource::NewPair
    };
    Some(NewTokenEvent::new(chain, random_token_address(chain), source))
}

async fn generate(
    chain: Chain,
    handle: SubscriptionHandle,
    tx: mpsc::Sender<FeedEvent>,
    interval: Duration,
    disconnect_probability: f64,
    cancel: CancellationToken,
) {
    if tx.send(FeedEvent::Connected).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let event = match next_token(chain, disconnect_probability) {
            Some(token) => FeedEvent::NewToken(token),
            None => {
                info!("[PAPER] {} feed {} dropping connection", chain, handle);
                let _ = tx.send(FeedEvent::Disconnected).await;
                break;
            }
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!("[PAPER] {} feed {} generator finished", chain, handle);
}

impl ChainFeed for PaperFeed {
    fn subscribe(&self, chain: Chain) -> Result<Subscription> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::FeedSubscription(format!("no runtime: {}", e)))?;

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let cancel = CancellationToken::new();
        self.live.insert(handle, cancel.clone());

        runtime.spawn(generate(
            chain,
            handle,
            tx,
            self.interval,
            self.disconnect_probability,
            cancel,
        ));
        debug!("[PAPER] {} feed subscribed {}", chain, handle);

        Ok(Subscription { handle, events: rx })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some((_, cancel)) = self.live.remove(&handle) {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(disconnect_probability: f64) -> PaperFeed {
        PaperFeed::new(
            &PaperConfig {
                new_token_interval_ms: 100,
                disconnect_probability,
                ..PaperConfig::default()
            },
            16,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_connected_then_tokens() {
        let feed = feed(0.0);
        let mut sub = feed.subscribe(Chain::Bsc).unwrap();

        assert_eq!(sub.events.recv().await, Some(FeedEvent::Connected));
        for _ in 0..3 {
            match sub.events.recv().await {
                Some(FeedEvent::NewToken(token)) => {
                    assert_eq!(token.chain, Chain::Bsc);
                    assert!(Chain::Bsc.is_valid_token_address(&token.token_address));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        feed.unsubscribe(sub.handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_ends_stream() {
        let feed = feed(0.0);
        let mut sub = feed.subscribe(Chain::Solana).unwrap();
        assert_eq!(feed.live_subscriptions(), 1);

        feed.unsubscribe(sub.handle);
        assert_eq!(feed.live_subscriptions(), 0);

        // Drain whatever was buffered; the channel must then close
        while sub.events.recv().await.is_some() {}

        // Unknown handles are ignored
        feed.unsubscribe(sub.handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_disconnect() {
        let feed = feed(1.0);
        let mut sub = feed.subscribe(Chain::Ethereum).unwrap();

        assert_eq!(sub.events.recv().await, Some(FeedEvent::Connected));
        assert_eq!(sub.events.recv().await, Some(FeedEvent::Disconnected));
        assert_eq!(sub.events.recv().await, None);
    }

    #[test]
    fn test_subscribe_outside_runtime_fails() {
        let feed = feed(0.0);
        assert!(matches!(
            feed.subscribe(Chain::Solana),
            Err(Error::FeedSubscription(_))
        ));
    }
}
