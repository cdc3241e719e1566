//! Trade execution capability
//!
//! The engine only decides *when* to buy or sell. Quoting, routing and
//! signing live behind [`TradeExecutor`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::error::Result;
use crate::position::{Position, WalletRef};

/// Execution knobs shared by buys and sells
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Max tolerated slippage, in percent
    pub slippage_percent: f64,
    /// Gas price multiplier (ignored by chains without a gas market)
    pub gas_boost_multiplier: f64,
}

/// Buy order for a newly discovered token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub chain: Chain,
    pub token_address: String,
    /// Amount of the chain's quote asset to spend
    pub quote_amount: f64,
    pub params: ExecutionParams,
    pub wallet: WalletRef,
}

/// Fill of a buy order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenFill {
    pub fill_price: f64,
    pub quantity: f64,
    pub tx_ref: String,
}

/// Fill of a sell order closing a whole position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseFill {
    pub fill_price: f64,
    pub tx_ref: String,
}

/// Submits buy and sell orders.
///
/// Errors: `ExecutionFailed` or `InsufficientFunds` for `open`,
/// `ExecutionFailed` for `close`. All are retryable from the engine's view.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn open(&self, order: &OpenOrder) -> Result<OpenFill>;

    async fn close(&self, position: &Position, params: &ExecutionParams) -> Result<CloseFill>;
}
