//! Position model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::Chain;
use crate::error::{Error, Result};

/// Opaque reference to the wallet that signed the opening order.
/// Key material never passes through the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletRef(String);

impl WalletRef {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One open trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Unique id, generated at open time
    pub id: String,
    pub chain: Chain,
    pub token_address: String,
    /// Tokens held, always positive while open
    pub quantity: f64,
    /// Price paid per token
    pub entry_price: f64,
    /// Highest price observed since entry, never decreases
    pub highest_price_seen: f64,
    /// Trailing stop level; only meaningful while trailing stop is enabled
    pub stop_price: f64,
    pub wallet: WalletRef,
    pub opened_at: DateTime<Utc>,
    /// Transaction reference of the opening fill
    pub open_tx_ref: String,
}

impl Position {
    /// Build a position from a buy fill.
    ///
    /// `trailing_stop_percent` seeds the stop below the entry price; pass
    /// `None` when trailing stop is disabled.
    pub fn open(
        chain: Chain,
        token_address: impl Into<String>,
        quantity: f64,
        entry_price: f64,
        wallet: WalletRef,
        open_tx_ref: impl Into<String>,
        trailing_stop_percent: Option<f64>,
    ) -> Result<Self> {
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(Error::InvalidEntryPrice(entry_price));
        }
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(Error::InvalidQuantity(quantity));
        }

        let stop_price = trailing_stop_percent
            .map(|pct| trailing_stop_price(entry_price, pct))
            .unwrap_or(0.0);

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            chain,
            token_address: token_address.into(),
            quantity,
            entry_price,
            highest_price_seen: entry_price,
            stop_price,
            wallet,
            opened_at: Utc::now(),
            open_tx_ref: open_tx_ref.into(),
        })
    }

    /// P&L percentage at a given price
    pub fn pnl_percent(&self, price: f64) -> f64 {
        pnl_percent(self.entry_price, price)
    }

    /// Position value in the quote asset at a given price
    pub fn value_at(&self, price: f64) -> f64 {
        self.quantity * price
    }

    /// Cost basis in the quote asset
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.entry_price
    }

    pub fn held_for(&self) -> chrono::Duration {
        Utc::now() - self.opened_at
    }
}

/// Percentage move from entry to price
pub fn pnl_percent(entry_price: f64, price: f64) -> f64 {
    (price - entry_price) / entry_price * 100.0
}

/// Stop level `pct` percent below `price`
pub fn trailing_stop_price(price: f64, pct: f64) -> f64 {
    price * (1.0 - pct / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> WalletRef {
        WalletRef::new("hot-trading")
    }

    #[test]
    fn test_open_seeds_trailing_fields() {
        let position =
            Position::open(Chain::Solana, "mint", 10.0, 100.0, wallet(), "sig", Some(1.5)).unwrap();

        assert_eq!(position.highest_price_seen, 100.0);
        assert!((position.stop_price - 98.5).abs() < 1e-9);
        assert_eq!(position.cost_basis(), 1000.0);
        assert!(uuid::Uuid::parse_str(&position.id).is_ok());
    }

    #[test]
    fn test_open_without_trailing() {
        let position =
            Position::open(Chain::Bsc, "token", 1.0, 2.0, wallet(), "0xabc", None).unwrap();
        assert_eq!(position.stop_price, 0.0);
    }

    #[test]
    fn test_rejects_zero_entry_price() {
        let err = Position::open(Chain::Bsc, "token", 1.0, 0.0, wallet(), "tx", None).unwrap_err();
        assert_eq!(err, Error::InvalidEntryPrice(0.0));

        let err =
            Position::open(Chain::Bsc, "token", 1.0, f64::NAN, wallet(), "tx", None).unwrap_err();
        assert!(matches!(err, Error::InvalidEntryPrice(_)));
    }

    #[test]
    fn test_rejects_non_positive_quantity() {
        let err = Position::open(Chain::Ethereum, "t", 0.0, 1.0, wallet(), "tx", None).unwrap_err();
        assert_eq!(err, Error::InvalidQuantity(0.0));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Position::open(Chain::Solana, "m", 1.0, 1.0, wallet(), "s", None).unwrap();
        let b = Position::open(Chain::Solana, "m", 1.0, 1.0, wallet(), "s", None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_pnl_percent() {
        assert!((pnl_percent(100.0, 103.0) - 3.0).abs() < 1e-9);
        assert!((pnl_percent(100.0, 99.0) + 1.0).abs() < 1e-9);
    }
}
