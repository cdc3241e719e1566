//! Trading engine: per-chain monitor loops, token intake and the
//! orchestrator that owns them

pub mod events;
pub mod intake;
pub mod monitor;
pub mod orchestrator;

#[cfg(test)]
pub mod test_support;

pub use events::{EngineEvent, EventBus, SkipReason};
pub use monitor::{ChainMonitor, MonitorState, TickReport};
pub use orchestrator::{ChainStatus, Collaborators, TradingOrchestrator};
