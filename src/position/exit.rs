//! Exit policy: trailing stop, take-profit and stop-loss
//!
//! WARNING: exits are best-effort. A price that gaps through the stop
//! between two ticks is only seen on the next tick, and the fill happens
//! wherever the market is by then.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ChainConfig, TradingPolicy};
use crate::position::types::{pnl_percent, trailing_stop_price, Position};

/// Outcome of one exit evaluation. Produced fresh on every tick, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitDecision {
    Hold,
    ExitTakeProfit,
    ExitStopLoss,
    ExitTrailingStop,
}

impl ExitDecision {
    pub fn is_exit(&self) -> bool {
        !matches!(self, ExitDecision::Hold)
    }
}

impl fmt::Display for ExitDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitDecision::Hold => "hold",
            ExitDecision::ExitTakeProfit => "take-profit",
            ExitDecision::ExitStopLoss => "stop-loss",
            ExitDecision::ExitTrailingStop => "trailing-stop",
        };
        f.write_str(s)
    }
}

/// Raise the trailing stop when `price` makes a new high.
///
/// This is the caller-side half of the trailing stop: run it before
/// [`evaluate`] on every fresh price. Returns whether the position changed.
pub fn trail(position: &mut Position, price: f64, trailing_stop_percent: f64) -> bool {
    if price > position.highest_price_seen {
        position.highest_price_seen = price;
        position.stop_price = trailing_stop_price(price, trailing_stop_percent);
        true
    } else {
        false
    }
}

/// Decide whether a position should be closed at `current_price`.
///
/// Pure: no I/O and no mutation. Rules are checked in order and the first
/// match wins; the trailing stop outranks the fixed thresholds.
pub fn evaluate(
    position: &Position,
    current_price: f64,
    chain_config: &ChainConfig,
    policy: &TradingPolicy,
) -> ExitDecision {
    if policy.trailing_stop_enabled && current_price <= position.stop_price {
        return ExitDecision::ExitTrailingStop;
    }

    if policy.auto_sell_enabled {
        let pnl = pnl_percent(position.entry_price, current_price);

        if pnl >= chain_config.min_profit_percent {
            return ExitDecision::ExitTakeProfit;
        }

        if pnl <= -chain_config.max_loss_percent {
            return ExitDecision::ExitStopLoss;
        }
    }

    ExitDecision::Hold
}
