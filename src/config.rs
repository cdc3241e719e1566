//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use crate::chain::Chain;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub solana: ChainConfig,
    pub ethereum: ChainConfig,
    pub bsc: ChainConfig,
    #[serde(default)]
    pub trading: TradingPolicy,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

/// Per-chain trading parameters. Immutable once the orchestrator starts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ChainConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Take profit once unrealized P&L reaches this percentage
    pub min_profit_percent: f64,
    /// Stop out once unrealized P&L falls to minus this percentage
    pub max_loss_percent: f64,
    /// Monitor tick interval
    pub check_interval_ms: u64,
    #[serde(default = "default_max_positions_per_chain")]
    pub max_positions_per_chain: usize,
    /// Amount of the chain's quote asset spent per buy
    pub quote_amount: f64,
    #[serde(default = "default_slippage_percent")]
    pub slippage_percent: f64,
    /// Label of the signing wallet handed to the executor
    #[serde(default = "default_wallet")]
    pub wallet: String,
}

impl ChainConfig {
    /// Defaults for a chain, matching the thresholds the bot has always shipped with
    pub fn defaults_for(chain: Chain) -> Self {
        let (min_profit_percent, max_loss_percent, check_interval_ms, quote_amount) = match chain {
            Chain::Solana => (2.5, 1.0, 5000, 0.1),
            Chain::Ethereum => (1.5, 0.8, 3000, 0.01),
            Chain::Bsc => (2.0, 1.2, 4000, 0.05),
        };

        Self {
            enabled: true,
            min_profit_percent,
            max_loss_percent,
            check_interval_ms,
            max_positions_per_chain: default_max_positions_per_chain(),
            quote_amount,
            slippage_percent: default_slippage_percent(),
            wallet: default_wallet(),
        }
    }

    /// Validate values; failures are fatal for this chain's monitor
    pub fn validate(&self, chain: Chain) -> std::result::Result<(), Error> {
        let fail = |msg: String| Err(Error::Config(format!("{}: {}", chain, msg)));

        if self.check_interval_ms == 0 {
            return fail("check_interval_ms must be positive".into());
        }
        if !(self.min_profit_percent > 0.0) {
            return fail(format!(
                "min_profit_percent must be positive, got {}",
                self.min_profit_percent
            ));
        }
        if !(self.max_loss_percent > 0.0 && self.max_loss_percent < 100.0) {
            return fail(format!(
                "max_loss_percent must be between 0 and 100, got {}",
                self.max_loss_percent
            ));
        }
        if !(self.quote_amount > 0.0) {
            return fail(format!("quote_amount must be positive, got {}", self.quote_amount));
        }
        if !(0.0..=100.0).contains(&self.slippage_percent) {
            return fail(format!(
                "slippage_percent must be between 0 and 100, got {}",
                self.slippage_percent
            ));
        }
        if self.wallet.trim().is_empty() {
            return fail("wallet label must not be empty".into());
        }
        Ok(())
    }
}

/// Global exit and execution policy shared read-only by every chain loop
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TradingPolicy {
    #[serde(default = "default_true")]
    pub auto_sell_enabled: bool,
    #[serde(default = "default_true")]
    pub trailing_stop_enabled: bool,
    /// Distance of the stop below the highest price seen
    #[serde(default = "default_trailing_stop_percent")]
    pub trailing_stop_percent: f64,
    /// Gas price multiplier passed through to the executor
    #[serde(default = "default_gas_boost_multiplier")]
    pub gas_boost_multiplier: f64,
}

impl Default for TradingPolicy {
    fn default() -> Self {
        Self {
            auto_sell_enabled: true,
            trailing_stop_enabled: true,
            trailing_stop_percent: default_trailing_stop_percent(),
            gas_boost_multiplier: default_gas_boost_multiplier(),
        }
    }
}

impl TradingPolicy {
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.trailing_stop_enabled
            && !(self.trailing_stop_percent > 0.0 && self.trailing_stop_percent < 100.0)
        {
            return Err(Error::Config(format!(
                "trailing_stop_percent must be between 0 and 100, got {}",
                self.trailing_stop_percent
            )));
        }
        if !(self.gas_boost_multiplier >= 1.0) {
            return Err(Error::Config(format!(
                "gas_boost_multiplier must be at least 1.0, got {}",
                self.gas_boost_multiplier
            )));
        }
        Ok(())
    }
}

/// Safety and liquidity rules a candidate token must pass before it is bought
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SecurityConfig {
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    /// Largest share of supply the creator may hold
    #[serde(default = "default_max_creator_tokens_percent")]
    pub max_creator_tokens_percent: f64,
    #[serde(default = "default_min_holders")]
    pub min_holders: u32,
    #[serde(default = "default_true")]
    pub check_contract_verification: bool,
    #[serde(default = "default_true")]
    pub check_honeypot: bool,
    #[serde(default = "default_true")]
    pub check_mint_function: bool,
    #[serde(default = "default_true")]
    pub check_blacklist: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            min_liquidity_usd: default_min_liquidity_usd(),
            max_creator_tokens_percent: default_max_creator_tokens_percent(),
            min_holders: default_min_holders(),
            check_contract_verification: true,
            check_honeypot: true,
            check_mint_function: true,
            check_blacklist: true,
        }
    }
}

impl SecurityConfig {
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if !(self.min_liquidity_usd >= 0.0) {
            return Err(Error::Config(format!(
                "min_liquidity_usd must not be negative, got {}",
                self.min_liquidity_usd
            )));
        }
        if !(self.max_creator_tokens_percent >= 0.0 && self.max_creator_tokens_percent <= 100.0) {
            return Err(Error::Config(format!(
                "max_creator_tokens_percent must be between 0 and 100, got {}",
                self.max_creator_tokens_percent
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FeedConfig {
    /// Fixed delay before resubscribing after a disconnect
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EngineConfig {
    /// Upper bound on how long stop() waits for in-flight work before aborting it
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout_ms(),
            event_channel_capacity: default_channel_capacity(),
        }
    }
}

/// Paper-trading simulation parameters (used by `trader start`)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PaperConfig {
    /// Starting quote balance per chain
    #[serde(default = "default_starting_balance")]
    pub starting_balance: f64,
    /// Price listed for a token the first time it is seen
    #[serde(default = "default_initial_price")]
    pub initial_price: f64,
    /// Max per-read random walk step
    #[serde(default = "default_volatility_percent")]
    pub volatility_percent: f64,
    #[serde(default = "default_fill_latency_ms")]
    pub fill_latency_ms: u64,
    #[serde(default = "default_new_token_interval_ms")]
    pub new_token_interval_ms: u64,
    /// Chance per emitted token that the simulated connection drops
    #[serde(default = "default_disconnect_probability")]
    pub disconnect_probability: f64,
    /// Chance that the security check flags a token
    #[serde(default = "default_reject_probability")]
    pub reject_probability: f64,
    /// Regex patterns; matching token addresses are always flagged
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            initial_price: default_initial_price(),
            volatility_percent: default_volatility_percent(),
            fill_latency_ms: default_fill_latency_ms(),
            new_token_interval_ms: default_new_token_interval_ms(),
            disconnect_probability: default_disconnect_probability(),
            reject_probability: default_reject_probability(),
            blocked_patterns: vec![],
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_positions_per_chain() -> usize {
    5
}

fn default_slippage_percent() -> f64 {
    1.0
}

fn default_wallet() -> String {
    "hot-trading".to_string()
}

fn default_trailing_stop_percent() -> f64 {
    1.5
}

fn default_gas_boost_multiplier() -> f64 {
    1.2
}

fn default_min_liquidity_usd() -> f64 {
    10_000.0
}

fn default_max_creator_tokens_percent() -> f64 {
    20.0
}

fn default_min_holders() -> u32 {
    50
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

fn default_starting_balance() -> f64 {
    10.0
}

fn default_initial_price() -> f64 {
    1.0
}

fn default_volatility_percent() -> f64 {
    2.0
}

fn default_fill_latency_ms() -> u64 {
    50
}

fn default_new_token_interval_ms() -> u64 {
    4000
}

fn default_disconnect_probability() -> f64 {
    0.02
}

fn default_reject_probability() -> f64 {
    0.3
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut builder = config::Config::builder();
        // Chain sections default per chain, so they are seeded key by key
        for chain in Chain::ALL {
            let defaults = ChainConfig::defaults_for(chain);
            let key = |field: &str| format!("{}.{}", chain, field);
            builder = builder
                .set_default(key("enabled"), defaults.enabled)?
                .set_default(key("min_profit_percent"), defaults.min_profit_percent)?
                .set_default(key("max_loss_percent"), defaults.max_loss_percent)?
                .set_default(key("check_interval_ms"), defaults.check_interval_ms as i64)?
                .set_default(
                    key("max_positions_per_chain"),
                    defaults.max_positions_per_chain as i64,
                )?
                .set_default(key("quote_amount"), defaults.quote_amount)?
                .set_default(key("slippage_percent"), defaults.slippage_percent)?
                .set_default(key("wallet"), defaults.wallet)?;
        }

        let settings = builder
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix TRADER_)
            .add_source(
                config::Environment::with_prefix("TRADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate global values. Per-chain values are validated when each
    /// chain's monitor is built so one bad chain does not block the rest.
    pub fn validate(&self) -> Result<()> {
        self.trading.validate()?;
        self.security.validate()?;

        if self.engine.stop_timeout_ms == 0 {
            anyhow::bail!("engine.stop_timeout_ms must be positive");
        }
        if self.engine.event_channel_capacity == 0 || self.feed.channel_capacity == 0 {
            anyhow::bail!("channel capacities must be positive");
        }

        for pattern in &self.paper.blocked_patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("Invalid blocked_pattern regex: {}", pattern))?;
        }

        for chain in Chain::ALL {
            let chain_config = self.chain(chain);
            if chain_config.enabled {
                if let Err(e) = chain_config.validate(chain) {
                    tracing::warn!("{} - this chain will not start", e);
                }
            }
        }

        if !Chain::ALL.iter().any(|c| self.chain(*c).enabled) {
            tracing::warn!("All chains are disabled - the engine will have nothing to do");
        }

        Ok(())
    }

    /// Configuration for one chain
    pub fn chain(&self, chain: Chain) -> &ChainConfig {
        match chain {
            Chain::Solana => &self.solana,
            Chain::Ethereum => &self.ethereum,
            Chain::Bsc => &self.bsc,
        }
    }

    pub fn chain_mut(&mut self, chain: Chain) -> &mut ChainConfig {
        match chain {
            Chain::Solana => &mut self.solana,
            Chain::Ethereum => &mut self.ethereum,
            Chain::Bsc => &mut self.bsc,
        }
    }

    /// Human-readable configuration summary
    pub fn summary(&self) -> String {
        let mut out = String::from("Configuration:\n");
        for chain in Chain::ALL {
            let c = self.chain(chain);
            let _ = writeln!(
                out,
                "  {}:\n    enabled: {}\n    take_profit: {}%\n    stop_loss: {}%\n    check_interval: {}ms\n    max_positions: {}\n    buy_amount: {} {}\n    slippage: {}%\n    wallet: {}",
                chain,
                c.enabled,
                c.min_profit_percent,
                c.max_loss_percent,
                c.check_interval_ms,
                c.max_positions_per_chain,
                c.quote_amount,
                chain.native_symbol(),
                c.slippage_percent,
                c.wallet,
            );
        }
        let _ = write!(
            out,
            "  Trading:\n    auto_sell: {}\n    trailing_stop: {} ({}%)\n    gas_boost: {}x\n  Security:\n    min_liquidity: ${}\n    min_holders: {}\n    max_creator_share: {}%\n    checks: verification={} honeypot={} mint={} blacklist={}\n  Feed:\n    reconnect_delay: {}ms\n  Engine:\n    stop_timeout: {}ms\n",
            self.trading.auto_sell_enabled,
            self.trading.trailing_stop_enabled,
            self.trading.trailing_stop_percent,
            self.trading.gas_boost_multiplier,
            self.security.min_liquidity_usd,
            self.security.min_holders,
            self.security.max_creator_tokens_percent,
            self.security.check_contract_verification,
            self.security.check_honeypot,
            self.security.check_mint_function,
            self.security.check_blacklist,
            self.feed.reconnect_delay_ms,
            self.engine.stop_timeout_ms,
        );
        out
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solana: ChainConfig::defaults_for(Chain::Solana),
            ethereum: ChainConfig::defaults_for(Chain::Ethereum),
            bsc: ChainConfig::defaults_for(Chain::Bsc),
            trading: TradingPolicy::default(),
            security: SecurityConfig::default(),
            feed: FeedConfig::default(),
            engine: EngineConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}
