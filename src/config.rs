//! Runtime configuration read from the environment (after `.env` is loaded).

use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::chains::{self, SupportedChain};
use crate::reconcile::ReconcilePolicy;

const DEFAULT_CHAIN_ID: u64 = 100;
const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_GAS_MARGIN_BPS: u64 = 2000; // +20%
const DEFAULT_ASSET_REFRESH_SECS: u64 = 30;
/// At most double the estimate.
pub const MAX_GAS_MARGIN_BPS: u64 = 10_000;

/// A sell to run once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct OneShotTrade {
    pub currency: Address,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chain: SupportedChain,
    pub rpc_url: String,
    pub private_key: Option<String>,
    pub oracle_urls: Vec<url::Url>,
    pub oracle_timeout: Duration,
    pub policy: ReconcilePolicy,
    pub gas_margin_bps: u64,
    pub asset_refresh: Duration,
    pub trade: Option<OneShotTrade>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chain_id = parse_or(&lookup, "CHAIN_ID", DEFAULT_CHAIN_ID)?;
        let chain = SupportedChain::from_chain_id(chain_id)
            .ok_or_else(|| anyhow!("CHAIN_ID {} is not a Synchronizer chain", chain_id))?;

        let rpc_url = lookup("RPC_URL").unwrap_or_else(|| chain.rpc_url().to_string());

        let oracle_urls = match lookup("ORACLE_URLS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| url::Url::parse(s).with_context(|| format!("bad oracle url {}", s)))
                .collect::<Result<Vec<_>>>()?,
            None => chains::oracle_urls(),
        };
        if oracle_urls.is_empty() {
            return Err(anyhow!("ORACLE_URLS must name at least one oracle"));
        }

        let quorum = parse_or(&lookup, "ORACLE_QUORUM", oracle_urls.len())?;
        if quorum == 0 || quorum > oracle_urls.len() {
            return Err(anyhow!(
                "ORACLE_QUORUM must be between 1 and {}",
                oracle_urls.len()
            ));
        }

        let price_tolerance = parse_or(&lookup, "PRICE_TOLERANCE", Decimal::ZERO)?;
        if price_tolerance.is_sign_negative() {
            return Err(anyhow!("PRICE_TOLERANCE must not be negative"));
        }
        let policy = ReconcilePolicy {
            quorum,
            price_tolerance,
            max_block_drift: parse_or(&lookup, "MAX_BLOCK_DRIFT", 0u64)?,
        };

        let gas_margin_bps = parse_or(&lookup, "GAS_MARGIN_BPS", DEFAULT_GAS_MARGIN_BPS)?;
        if gas_margin_bps > MAX_GAS_MARGIN_BPS {
            return Err(anyhow!("GAS_MARGIN_BPS must be at most {}", MAX_GAS_MARGIN_BPS));
        }

        let trade = match (lookup("TRADE_CURRENCY"), lookup("TRADE_AMOUNT")) {
            (Some(currency), Some(amount)) => Some(OneShotTrade {
                currency: Address::from_str(currency.trim())
                    .with_context(|| format!("bad TRADE_CURRENCY {}", currency))?,
                amount: Decimal::from_str(amount.trim())
                    .with_context(|| format!("bad TRADE_AMOUNT {}", amount))?,
            }),
            _ => None,
        };

        Ok(Self {
            chain,
            rpc_url,
            private_key: lookup("PRIVATE_KEY"),
            oracle_urls,
            oracle_timeout: Duration::from_millis(parse_or(
                &lookup,
                "ORACLE_TIMEOUT_MS",
                DEFAULT_ORACLE_TIMEOUT_MS,
            )?),
            policy,
            gas_margin_bps,
            asset_refresh: Duration::from_secs(parse_or(
                &lookup,
                "ASSET_REFRESH_SECS",
                DEFAULT_ASSET_REFRESH_SECS,
            )?),
            trade,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{} = {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}
