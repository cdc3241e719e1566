//! Position management module

pub mod exit;
pub mod stats;
pub mod store;
pub mod types;

pub use exit::{evaluate, trail, ExitDecision};
pub use stats::TradeStats;
pub use store::PositionStore;
pub use types::{Position, WalletRef};
