//! Supported chains and their static metadata

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

lazy_static! {
    static ref EVM_ADDRESS: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex");
    static ref SOLANA_ADDRESS: Regex =
        Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("valid regex");
}

/// An independently operated blockchain network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Bsc,
    Solana,
}

impl Chain {
    /// Every supported chain, in start order
    pub const ALL: [Chain; 3] = [Chain::Solana, Chain::Ethereum, Chain::Bsc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bsc => "bsc",
            Chain::Solana => "solana",
        }
    }

    /// Native currency symbol, used as the quote asset for buys
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Bsc => "BNB",
            Chain::Solana => "SOL",
        }
    }

    pub fn explorer_url(&self) -> &'static str {
        match self {
            Chain::Ethereum => "https://etherscan.io",
            Chain::Bsc => "https://bscscan.com",
            Chain::Solana => "https://solscan.io",
        }
    }

    /// Link to a transaction on the chain's block explorer
    pub fn tx_url(&self, tx_ref: &str) -> String {
        format!("{}/tx/{}", self.explorer_url(), tx_ref)
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, Chain::Ethereum | Chain::Bsc)
    }

    /// Check that a token address is well-formed for this chain
    pub fn is_valid_token_address(&self, address: &str) -> bool {
        if self.is_evm() {
            EVM_ADDRESS.is_match(address)
        } else {
            SOLANA_ADDRESS.is_match(address)
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "bsc" | "bnb" => Ok(Chain::Bsc),
            "solana" | "sol" => Ok(Chain::Solana),
            other => Err(Error::UnsupportedChain(other.to_string())),
        }
    }
}
