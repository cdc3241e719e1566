//! Paper trading collaborators
//!
//! Simulated market, executor, security check and chain feed. `trader start`
//! runs the engine against these so the whole pipeline can be exercised
//! without touching a real chain.

pub mod feed;
pub mod market;
pub mod security;

pub use feed::PaperFeed;
pub use market::{PaperExecutor, PaperMarket};
pub use security::PaperSecurityOracle;

use rand::Rng;
use std::sync::Arc;

use crate::chain::Chain;
use crate::config::Config;
use crate::engine::Collaborators;
use crate::error::Result;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const HEX_ALPHABET: &[u8] = b"0123456789abcdef";

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Random token address in the chain's format
pub fn random_token_address(chain: Chain) -> String {
    if chain.is_evm() {
        format!("0x{}", random_string(HEX_ALPHABET, 40))
    } else {
        random_string(BASE58_ALPHABET, 44)
    }
}

/// Random transaction reference in the chain's format
pub fn random_tx_ref(chain: Chain) -> String {
    if chain.is_evm() {
        format!("0x{}", random_string(HEX_ALPHABET, 64))
    } else {
        random_string(BASE58_ALPHABET, 88)
    }
}

/// Build the full paper collaborator set from configuration
pub fn collaborators(config: &Config) -> Result<Collaborators> {
    let market = Arc::new(PaperMarket::new(&config.paper));
    let executor = Arc::new(PaperExecutor::new(market.clone(), &config.paper));
    let security = Arc::new(PaperSecurityOracle::new(&config.security, &config.paper)?);
    let feed = Arc::new(PaperFeed::new(&config.paper, config.feed.channel_capacity));

    Ok(Collaborators {
        prices: market,
        security,
        executor,
        feed,
    })
}
