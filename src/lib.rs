//! Multi-chain Trading Agent Library
//!
//! Watches Solana, Ethereum and BSC for newly listed tokens, buys the ones
//! that pass a security check, and sells them on take-profit, stop-loss or
//! trailing-stop signals.

pub mod chain;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod paper;
pub mod position;
pub mod stream;
pub mod trading;

// Re-export commonly used types
pub use chain::Chain;
pub use config::Config;
pub use engine::{Collaborators, EngineEvent, TradingOrchestrator};
pub use error::{Error, Result};
