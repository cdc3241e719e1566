//! Session trading statistics

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::chain::Chain;
use crate::position::exit::ExitDecision;

/// Realized results for the current session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub started: String,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Sum of realized P&L percentages across closed trades
    pub cumulative_pnl_percent: f64,
    pub best_trade_percent: Option<f64>,
    pub worst_trade_percent: Option<f64>,
    pub exits_by_reason: HashMap<ExitDecision, u32>,
    pub trades_by_chain: HashMap<Chain, u32>,
}

impl TradeStats {
    pub fn new() -> Self {
        Self {
            started: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ..Default::default()
        }
    }

    pub fn record_trade(&mut self, chain: Chain, decision: ExitDecision, pnl_percent: f64) {
        self.total_trades += 1;
        if pnl_percent >= 0.0 {
            self.winning_trades += 1;
        } else {
            self.losing_trades += 1;
        }
        self.cumulative_pnl_percent += pnl_percent;
        self.best_trade_percent = Some(
            self.best_trade_percent
                .map_or(pnl_percent, |best| best.max(pnl_percent)),
        );
        self.worst_trade_percent = Some(
            self.worst_trade_percent
                .map_or(pnl_percent, |worst| worst.min(pnl_percent)),
        );
        *self.exits_by_reason.entry(decision).or_default() += 1;
        *self.trades_by_chain.entry(chain).or_default() += 1;
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        (self.winning_trades as f64 / self.total_trades as f64) * 100.0
    }

    pub fn average_pnl_percent(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.cumulative_pnl_percent / self.total_trades as f64
    }
}
