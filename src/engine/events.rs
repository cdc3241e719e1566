//! Engine notifications
//!
//! Everything the reporting layer sees goes through [`EngineEvent`]; raw
//! collaborator errors never escape the engine any other way.

use serde::{Serialize, Serializer};
use std::fmt::Display;
use tokio::sync::broadcast;
use tracing::trace;

use crate::chain::Chain;
use crate::error::Error;
use crate::position::{ExitDecision, Position};

/// Why a candidate token was passed over without contacting any oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The chain already holds `max_positions_per_chain` positions
    CapacityReached,
    /// Address is not well-formed for the chain
    InvalidAddress,
    /// A position in this token is already open on the chain
    AlreadyHeld,
}

/// In-process notification emitted by the engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Started {
        chains: Vec<Chain>,
    },
    Stopped,
    PositionOpened {
        position: Position,
    },
    PositionClosed {
        position: Position,
        fill_price: f64,
        realized_pnl_percent: f64,
        decision: ExitDecision,
        tx_ref: String,
    },
    OpenFailed {
        chain: Chain,
        token_address: String,
        #[serde(serialize_with = "as_display")]
        error: Error,
    },
    ExitFailed {
        position: Position,
        decision: ExitDecision,
        #[serde(serialize_with = "as_display")]
        error: Error,
    },
    SecurityWarning {
        chain: Chain,
        token_address: String,
        reasons: Vec<String>,
    },
    PriceFetchFailed {
        chain: Chain,
        position_id: String,
        token_address: String,
        #[serde(serialize_with = "as_display")]
        error: Error,
    },
    CandidateSkipped {
        chain: Chain,
        token_address: String,
        reason: SkipReason,
    },
    FeedConnected {
        chain: Chain,
    },
    FeedDisconnected {
        chain: Chain,
    },
    Error {
        chain: Option<Chain>,
        #[serde(serialize_with = "as_display")]
        cause: Error,
    },
}

impl EngineEvent {
    /// Chain the event concerns, if any
    pub fn chain(&self) -> Option<Chain> {
        match self {
            EngineEvent::Started { .. } | EngineEvent::Stopped => None,
            EngineEvent::PositionOpened { position }
            | EngineEvent::PositionClosed { position, .. }
            | EngineEvent::ExitFailed { position, .. } => Some(position.chain),
            EngineEvent::OpenFailed { chain, .. }
            | EngineEvent::SecurityWarning { chain, .. }
            | EngineEvent::PriceFetchFailed { chain, .. }
            | EngineEvent::CandidateSkipped { chain, .. }
            | EngineEvent::FeedConnected { chain }
            | EngineEvent::FeedDisconnected { chain } => Some(*chain),
            EngineEvent::Error { chain, .. } => *chain,
        }
    }

    /// Short event name, as used in the JSON `event` tag
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Started { .. } => "started",
            EngineEvent::Stopped => "stopped",
            EngineEvent::PositionOpened { .. } => "position_opened",
            EngineEvent::PositionClosed { .. } => "position_closed",
            EngineEvent::OpenFailed { .. } => "open_failed",
            EngineEvent::ExitFailed { .. } => "exit_failed",
            EngineEvent::SecurityWarning { .. } => "security_warning",
            EngineEvent::PriceFetchFailed { .. } => "price_fetch_failed",
            EngineEvent::CandidateSkipped { .. } => "candidate_skipped",
            EngineEvent::FeedConnected { .. } => "feed_connected",
            EngineEvent::FeedDisconnected { .. } => "feed_disconnected",
            EngineEvent::Error { .. } => "error",
        }
    }
}

fn as_display<S: Serializer, T: Display>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Fan-out of engine events to any number of subscribers.
///
/// Emitting never blocks and never fails; slow subscribers see
/// `RecvError::Lagged` instead of stalling a chain loop.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        trace!("event: {}", event.name());
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}
