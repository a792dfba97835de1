// Shared types for the synth trader

use ethers::types::{Address, H256, U256};
use ethers::utils::{format_units, parse_units};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TradeError;

/// Synthetic position side of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// OPEN buys a synth with collateral, CLOSE sells it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeType {
    Open,
    Close,
}

impl TradeType {
    /// The oracle signature set a trade of this type has to be authorized with.
    pub fn operation(&self) -> Operation {
        match self {
            TradeType::Open => Operation::Buy,
            TradeType::Close => Operation::Sell,
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeType::Open => write!(f, "OPEN"),
            TradeType::Close => write!(f, "CLOSE"),
        }
    }
}

/// Key of the per-operation signature in an oracle quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Buy,
    Sell,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Buy => "buy",
            Operation::Sell => "sell",
        }
    }
}

/// An ERC-20 style token the user can trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Currency {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Currency {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// Raw on-chain quantity of a currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyAmount {
    pub currency: Currency,
    pub raw: U256,
}

impl CurrencyAmount {
    pub fn from_raw(currency: Currency, raw: U256) -> Self {
        Self { currency, raw }
    }

    /// Parse a human amount such as "1.5"; digits past the currency's decimals are dropped.
    pub fn from_decimal(currency: Currency, value: Decimal) -> Result<Self, TradeError> {
        if value.is_sign_negative() {
            return Err(TradeError::InvalidInput(format!("negative amount {}", value)));
        }
        let truncated =
            value.round_dp_with_strategy(currency.decimals as u32, RoundingStrategy::ToZero);
        let raw: U256 = parse_units(truncated.normalize().to_string(), currency.decimals as u32)
            .map_err(|e| TradeError::InvalidInput(e.to_string()))?
            .into();
        Ok(Self { currency, raw })
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    pub fn to_decimal(&self) -> Decimal {
        format_units(self.raw, self.currency.decimals as u32)
            .ok()
            .and_then(|s| Decimal::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Human amount rounded to `digits` significant digits.
    pub fn to_significant(&self, digits: u32) -> String {
        let value = self.to_decimal();
        value
            .round_sf(digits)
            .unwrap_or(value)
            .normalize()
            .to_string()
    }
}

/// One tradable synth as published by the info oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub direction: Direction,
    pub sibling: Address,
    pub price: Decimal,
    pub fee: Decimal, // percent, e.g. 0.3 = 0.3%
    pub open: bool,
    pub contract: Address,
}

impl Asset {
    pub fn currency(&self) -> Currency {
        let suffix = match self.direction {
            Direction::Long => "L",
            Direction::Short => "S",
        };
        Currency::new(self.contract, format!("{}-{}", self.symbol, suffix), 18)
    }
}

/// ECDSA signature parts as the Synchronizer expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureTriple {
    pub v: u8,
    pub r: H256,
    pub s: H256,
}

/// One oracle node's signed quote for one asset and operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleSignature {
    pub node: usize,
    pub block_no: u64,
    pub multiplier: U256,
    pub fee: U256,
    pub price: String,
    pub sign: SignatureTriple,
}

impl OracleSignature {
    pub fn price_decimal(&self) -> Option<Decimal> {
        Decimal::from_str(&self.price).ok()
    }
}
