//! Simulated token security check
//!
//! Each evaluated token gets a random on-chain profile. Healthy profiles sit
//! comfortably inside the configured limits; with `reject_probability` one
//! flaw is injected. The profile is then judged against [`SecurityConfig`],
//! so a disabled check never reports its finding.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use tracing::debug;

use crate::chain::Chain;
use crate::config::{PaperConfig, SecurityConfig};
use crate::error::{Error, Result};
use crate::market::{SecurityOracle, SecurityVerdict};

/// What a contract scanner and holder index would report for a token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenProfile {
    pub liquidity_usd: f64,
    pub holders: u32,
    pub creator_percent: f64,
    pub verified: bool,
    pub honeypot: bool,
    pub mintable: bool,
    pub blacklist: bool,
}

#[derive(Debug, Clone, Copy)]
enum Flaw {
    ThinLiquidity,
    FewHolders,
    CreatorHeavy,
    Unverified,
    Honeypot,
    Mintable,
    Blacklist,
}

const FLAWS: &[Flaw] = &[
    Flaw::ThinLiquidity,
    Flaw::FewHolders,
    Flaw::CreatorHeavy,
    Flaw::Unverified,
    Flaw::Honeypot,
    Flaw::Mintable,
    Flaw::Blacklist,
];

pub struct PaperSecurityOracle {
    rules: SecurityConfig,
    blocked: Vec<Regex>,
    reject_probability: f64,
}

impl PaperSecurityOracle {
    pub fn new(rules: &SecurityConfig, paper: &PaperConfig) -> Result<Self> {
        let blocked = paper
            .blocked_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| Error::Config(format!("blocked pattern {}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules: rules.clone(),
            blocked,
            reject_probability: if paper.reject_probability.is_finite() {
                paper.reject_probability.clamp(0.0, 1.0)
            } else {
                0.0
            },
        })
    }

    fn random_profile(&self) -> TokenProfile {
        let mut rng = rand::thread_rng();
        let mut profile = TokenProfile {
            liquidity_usd: self.rules.min_liquidity_usd.max(1.0) * rng.gen_range(1.0..10.0),
            holders: self.rules.min_holders.max(1).saturating_mul(rng.gen_range(1..=10)),
            creator_percent: self.rules.max_creator_tokens_percent * rng.gen_range(0.0..1.0),
            verified: true,
            honeypot: false,
            mintable: false,
            blacklist: false,
        };

        if rng.gen_bool(self.reject_probability) {
            match FLAWS.choose(&mut rng) {
                Some(Flaw::ThinLiquidity) => profile.liquidity_usd = self.rules.min_liquidity_usd * 0.1,
                Some(Flaw::FewHolders) => profile.holders = self.rules.min_holders / 2,
                Some(Flaw::CreatorHeavy) => {
                    profile.creator_percent = (self.rules.max_creator_tokens_percent + 10.0).min(100.0)
                }
                Some(Flaw::Unverified) => profile.verified = false,
                Some(Flaw::Honeypot) => profile.honeypot = true,
                Some(Flaw::Mintable) => profile.mintable = true,
                Some(Flaw::Blacklist) => profile.blacklist = true,
                None => {}
            }
        }
        profile
    }

    /// Judge a profile against the configured rules and the address blocklist
    pub fn assess(&self, token_address: &str, profile: &TokenProfile) -> SecurityVerdict {
        let rules = &self.rules;
        let mut reasons: Vec<String> = self
            .blocked
            .iter()
            .filter(|re| re.is_match(token_address))
            .map(|re| format!("address matches blocklist pattern {}", re.as_str()))
            .collect();

        if profile.liquidity_usd < rules.min_liquidity_usd {
            reasons.push(format!(
                "liquidity ${:.0} below minimum ${:.0}",
                profile.liquidity_usd, rules.min_liquidity_usd
            ));
        }
        if profile.holders < rules.min_holders {
            reasons.push(format!(
                "{} holders, need at least {}",
                profile.holders, rules.min_holders
            ));
        }
        if profile.creator_percent > rules.max_creator_tokens_percent {
            reasons.push(format!(
                "creator holds {:.1}% of supply, limit {:.1}%",
                profile.creator_percent, rules.max_creator_tokens_percent
            ));
        }
        if rules.check_contract_verification && !profile.verified {
            reasons.push("contract source not verified".to_string());
        }
        if rules.check_honeypot && profile.honeypot {
            reasons.push("honeypot: sells revert".to_string());
        }
        if rules.check_mint_function && profile.mintable {
            reasons.push("owner can mint new supply".to_string());
        }
        if rules.check_blacklist && profile.blacklist {
            reasons.push("transfer blacklist function present".to_string());
        }

        if reasons.is_empty() {
            SecurityVerdict::safe()
        } else {
            SecurityVerdict::unsafe_because(reasons)
        }
    }
}

#[async_trait]
impl SecurityOracle for PaperSecurityOracle {
    async fn evaluate(&self, chain: Chain, token_address: &str) -> Result<SecurityVerdict> {
        let profile = self.random_profile();
        let verdict = self.assess(token_address, &profile);
        debug!(
            "[PAPER] {} security {}: safe={} {:?}",
            chain, token_address, verdict.safe, profile
        );
        Ok(verdict)
    }
}
