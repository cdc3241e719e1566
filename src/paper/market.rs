//! Simulated market and executor
//!
//! Prices follow a bounded random walk, stepped on every oracle read.
//! Fills land at the current price moved against the trader by a random
//! fraction of the allowed slippage.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::random_tx_ref;
use crate::chain::Chain;
use crate::config::PaperConfig;
use crate::error::{Error, Result};
use crate::market::PriceOracle;
use crate::position::Position;
use crate::trading::{CloseFill, ExecutionParams, OpenFill, OpenOrder, TradeExecutor};

/// Smallest price the random walk can reach
const PRICE_FLOOR: f64 = 1e-12;

pub struct PaperMarket {
    prices: DashMap<(Chain, String), f64>,
    initial_price: f64,
    volatility_percent: f64,
}

impl PaperMarket {
    pub fn new(config: &PaperConfig) -> Self {
        Self {
            prices: DashMap::new(),
            initial_price: config.initial_price,
            volatility_percent: config.volatility_percent,
        }
    }

    pub fn set_price(&self, chain: Chain, token_address: &str, price: f64) {
        self.prices.insert((chain, token_address.to_string()), price);
    }

    /// Current price without moving it; unseen tokens list at the initial price
    pub fn quote(&self, chain: Chain, token_address: &str) -> f64 {
        *self
            .prices
            .entry((chain, token_address.to_string()))
            .or_insert(self.initial_price)
    }

    /// Advance the token's price by one random step and return it
    pub fn step(&self, chain: Chain, token_address: &str) -> f64 {
        let mut entry = self
            .prices
            .entry((chain, token_address.to_string()))
            .or_insert(self.initial_price);

        if self.volatility_percent > 0.0 {
            let change = rand::thread_rng()
                .gen_range(-self.volatility_percent..=self.volatility_percent);
            *entry = (*entry * (1.0 + change / 100.0)).max(PRICE_FLOOR);
        }
        *entry
    }

    pub fn tracked_tokens(&self) -> usize {
        self.prices.len()
    }
}

#[async_trait]
impl PriceOracle for PaperMarket {
    async fn get_price(&self, chain: Chain, token_address: &str) -> Result<f64> {
        Ok(self.step(chain, token_address))
    }
}

/// Executor filling against [`PaperMarket`] with per-chain quote balances
pub struct PaperExecutor {
    market: Arc<PaperMarket>,
    balances: DashMap<Chain, f64>,
    fill_latency: Duration,
}

impl PaperExecutor {
    pub fn new(market: Arc<PaperMarket>, config: &PaperConfig) -> Self {
        let balances = DashMap::new();
        for chain in Chain::ALL {
            balances.insert(chain, config.starting_balance);
        }
        Self {
            market,
            balances,
            fill_latency: Duration::from_millis(config.fill_latency_ms),
        }
    }

    pub fn balance(&self, chain: Chain) -> f64 {
        self.balances.get(&chain).map(|b| *b).unwrap_or(0.0)
    }

    fn slippage_factor(slippage_percent: f64) -> f64 {
        if slippage_percent <= 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(0.0..=slippage_percent) / 100.0
    }
}

#[async_trait]
impl TradeExecutor for PaperExecutor {
    async fn open(&self, order: &OpenOrder) -> Result<OpenFill> {
        tokio::time::sleep(self.fill_latency).await;

        let fill_price = self.market.quote(order.chain, &order.token_address)
            * (1.0 + Self::slippage_factor(order.params.slippage_percent));

        {
            let mut balance = self.balances.entry(order.chain).or_insert(0.0);
            if *balance < order.quote_amount {
                return Err(Error::InsufficientFunds {
                    available: *balance,
                    required: order.quote_amount,
                });
            }
            *balance -= order.quote_amount;
        }

        debug!(
            "[PAPER] {} buy {} for {} at {}",
            order.chain, order.token_address, order.quote_amount, fill_price
        );

        Ok(OpenFill {
            fill_price,
            quantity: order.quote_amount / fill_price,
            tx_ref: random_tx_ref(order.chain),
        })
    }

    async fn close(&self, position: &Position, params: &ExecutionParams) -> Result<CloseFill> {
        tokio::time::sleep(self.fill_latency).await;

        let fill_price = self.market.quote(position.chain, &position.token_address)
            * (1.0 - Self::slippage_factor(params.slippage_percent));

        *self.balances.entry(position.chain).or_insert(0.0) += position.value_at(fill_price);

        debug!(
            "[PAPER] {} sell {} x{} at {}",
            position.chain, position.token_address, position.quantity, fill_price
        );

        Ok(CloseFill {
            fill_price,
            tx_ref: random_tx_ref(position.chain),
        })
    }
}
