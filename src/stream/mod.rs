//! Chain feed capability - newly observed tokens per chain
//!
//! A feed delivers mempool / new-pair discoveries plus its own connection
//! lifecycle as a stream of [`FeedEvent`]s on a bounded channel. The
//! engine owns reconnection: when a subscription reports `Disconnected`
//! or its channel closes, the engine unsubscribes and subscribes again
//! after a fixed delay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::chain::Chain;
use crate::error::Result;

/// Where a token was first seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Pending transaction in the mempool
    Mempool,
    /// Pair / pool creation event on a DEX
    NewPair,
}

/// A tradable token that just appeared on a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTokenEvent {
    pub chain: Chain,
    pub token_address: String,
    pub source: TokenSource,
    pub observed_at: DateTime<Utc>,
}

impl NewTokenEvent {
    pub fn new(chain: Chain, token_address: impl Into<String>, source: TokenSource) -> Self {
        Self {
            chain,
            token_address: token_address.into(),
            source,
            observed_at: Utc::now(),
        }
    }
}

/// Event from a chain feed subscription
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// New token observed
    NewToken(NewTokenEvent),
    /// Connected to the upstream source
    Connected,
    /// Lost the upstream source; the subscription is finished
    Disconnected,
    /// Non-fatal error reported by the feed
    Error(String),
}

/// Opaque id of one live subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// A live subscription: its handle and the receiving end of its events
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::Receiver<FeedEvent>,
}

/// Per-chain source of newly observed tokens.
///
/// `subscribe` must not block: connecting happens in the background and is
/// reported through `FeedEvent::Connected`.
pub trait ChainFeed: Send + Sync {
    fn subscribe(&self, chain: Chain) -> Result<Subscription>;

    /// Release a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
