//! Signature reconciliation: turns the oracle fan-out into one bundle the Synchronizer accepts.
//!
//! Failed nodes only count against quorum. Surviving records must agree on fee and multiplier,
//! on block number within `max_block_drift`, and on price within `price_tolerance` (relative to
//! the lowest price). Mismatched signatures are refused here so they never reach the contract.

use ethers::types::{H256, U256};
use ethers::utils::parse_units;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::TradeError;
use crate::oracle::NodeResult;
use crate::types::{OracleSignature, Operation};

/// Decimals of the fixed-point prices the contract verifies.
pub const PRICE_DECIMALS: u32 = 18;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePolicy {
    pub quorum: usize,
    pub price_tolerance: Decimal,
    pub max_block_drift: u64,
}

impl ReconcilePolicy {
    /// Every node has to answer and agree exactly.
    pub fn unanimous(nodes: usize) -> Self {
        Self {
            quorum: nodes.max(1),
            price_tolerance: Decimal::ZERO,
            max_block_drift: 0,
        }
    }
}

/// Ordered, mutually consistent signatures plus the price they attest to.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureBundle {
    pub operation: Operation,
    pub price: String,
    pub multiplier: U256,
    pub fee: U256,
    pub records: Vec<OracleSignature>,
}

impl SignatureBundle {
    pub fn block_nos(&self) -> Vec<U256> {
        self.records.iter().map(|r| U256::from(r.block_no)).collect()
    }

    /// Per-node prices as 18-decimal fixed point.
    pub fn prices(&self) -> Result<Vec<U256>, TradeError> {
        self.records.iter().map(|r| to_fixed(&r.price)).collect()
    }

    pub fn v(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.sign.v).collect()
    }

    pub fn r(&self) -> Vec<H256> {
        self.records.iter().map(|r| r.sign.r).collect()
    }

    pub fn s(&self) -> Vec<H256> {
        self.records.iter().map(|r| r.sign.s).collect()
    }

    pub fn price_fixed(&self) -> Result<U256, TradeError> {
        to_fixed(&self.price)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn to_fixed(price: &str) -> Result<U256, TradeError> {
    if price.trim_start().starts_with('-') {
        return Err(TradeError::InvalidInput(format!("price {} is negative", price)));
    }
    parse_units(price, PRICE_DECIMALS)
        .map(Into::into)
        .map_err(|e| TradeError::InvalidInput(format!("price {}: {}", price, e)))
}

pub fn reconcile(
    results: Vec<NodeResult>,
    operation: Operation,
    policy: &ReconcilePolicy,
) -> Result<SignatureBundle, TradeError> {
    let total = results.len();
    let mut records: Vec<(OracleSignature, Decimal)> = results
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|r| r.price_decimal().map(|p| (r, p)))
        .collect();

    let required = policy.quorum.max(1);
    if records.len() < required {
        warn!(received = records.len(), required, total, "oracle quorum not met");
        return Err(TradeError::InsufficientSignatures {
            required,
            received: records.len(),
        });
    }

    records.sort_by(|(a, _), (b, _)| a.block_no.cmp(&b.block_no).then(a.node.cmp(&b.node)));

    let (first, _) = &records[0];
    let (multiplier, fee) = (first.multiplier, first.fee);
    if let Some((r, _)) = records
        .iter()
        .find(|(r, _)| r.multiplier != multiplier || r.fee != fee)
    {
        return Err(TradeError::SignatureMismatch(format!(
            "node {} quotes multiplier {} fee {}, node {} quotes multiplier {} fee {}",
            first.node, multiplier, fee, r.node, r.multiplier, r.fee
        )));
    }

    let lowest_block = records[0].0.block_no;
    let highest_block = records[records.len() - 1].0.block_no;
    if highest_block - lowest_block > policy.max_block_drift {
        return Err(TradeError::SignatureMismatch(format!(
            "block numbers span {}..={}",
            lowest_block, highest_block
        )));
    }

    let lowest = records.iter().map(|(_, p)| *p).min().unwrap_or_default();
    let highest = records.iter().map(|(_, p)| *p).max().unwrap_or_default();
    if lowest <= Decimal::ZERO {
        return Err(TradeError::SignatureMismatch(format!(
            "non-positive price {} attested",
            lowest
        )));
    }
    let within = (highest - lowest)
        .checked_div(lowest)
        .map_or(false, |spread| spread <= policy.price_tolerance);
    if !within {
        return Err(TradeError::SignatureMismatch(format!(
            "prices range from {} to {}",
            lowest, highest
        )));
    }

    // Sellers get the lowest attested price, buyers pay the highest.
    let agreed = match operation {
        Operation::Sell => lowest,
        Operation::Buy => highest,
    };
    let price = records
        .iter()
        .find(|(_, p)| *p == agreed)
        .map(|(r, _)| r.price.clone())
        .unwrap_or_else(|| agreed.to_string());

    debug!(nodes = records.len(), %price, block = lowest_block, "signatures reconciled");

    Ok(SignatureBundle {
        operation,
        price,
        multiplier,
        fee,
        records: records.into_iter().map(|(r, _)| r).collect(),
    })
}
