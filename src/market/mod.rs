//! Market data capabilities: prices and token safety verdicts
//!
//! Both are implemented outside the engine. Failures are reported as
//! `Error::Unavailable` and treated as retryable by the callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chain::Chain;
use crate::error::Result;

/// Source of current token prices
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current price of `token_address` on `chain`, in the chain's quote asset
    async fn get_price(&self, chain: Chain, token_address: &str) -> Result<f64>;
}

/// Token safety analysis (honeypot, verification, mint authority, ...)
#[async_trait]
pub trait SecurityOracle: Send + Sync {
    async fn evaluate(&self, chain: Chain, token_address: &str) -> Result<SecurityVerdict>;
}

/// Result of a safety check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub safe: bool,
    /// Why the token was flagged; empty for safe tokens
    pub reasons: Vec<String>,
}

impl SecurityVerdict {
    pub fn safe() -> Self {
        Self {
            safe: true,
            reasons: vec![],
        }
    }

    pub fn unsafe_because<I, S>(reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            safe: false,
            reasons: reasons.into_iter().map(Into::into).collect(),
        }
    }
}
