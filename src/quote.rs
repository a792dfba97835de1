//! Trade page logic: which currencies are traded, the amount on the other side of the typed
//! one, and whether the trade can go ahead.

use ethers::types::Address;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::chains::SupportedChain;
use crate::error::TradeError;
use crate::state::TypedField;
use crate::types::{Asset, Currency, CurrencyAmount, TradeType};

/// Input currency first. Closing sells the synth, opening buys it.
pub fn trade_currencies(trade_type: TradeType, synth: &Currency, collateral: &Currency) -> [Currency; 2] {
    match trade_type {
        TradeType::Open => [collateral.clone(), synth.clone()],
        TradeType::Close => [synth.clone(), collateral.clone()],
    }
}

/// Output per unit of input after the trading fee. `None` when the asset cannot be priced.
fn rate(asset: &Asset, trade_type: TradeType) -> Option<Decimal> {
    let hundred = Decimal::ONE_HUNDRED;
    let after_fee = (hundred - asset.fee).checked_div(hundred)?;
    match trade_type {
        TradeType::Close => asset.price.checked_mul(after_fee),
        TradeType::Open if asset.price.is_zero() => None,
        TradeType::Open => after_fee.checked_div(asset.price),
    }
}

/// Resolve `[input, output]` from whichever side the user typed.
pub fn quote(
    asset: &Asset,
    trade_type: TradeType,
    currencies: &[Currency; 2],
    typed_value: &str,
    typed_field: TypedField,
) -> Result<[CurrencyAmount; 2], TradeError> {
    let typed = if typed_value.trim().is_empty() {
        Decimal::ZERO
    } else {
        Decimal::from_str(typed_value.trim())
            .map_err(|e| TradeError::InvalidInput(format!("{}: {}", typed_value, e)))?
    };
    let rate = rate(asset, trade_type)
        .ok_or_else(|| TradeError::InvalidInput(format!("{} has no price", asset.id)))?;

    let derived = match typed_field {
        TypedField::A => typed.checked_mul(rate),
        TypedField::B if rate.is_zero() => Some(Decimal::ZERO),
        TypedField::B => typed.checked_div(rate),
    }
    .ok_or_else(|| TradeError::InvalidInput(format!("amount {} is out of range", typed_value.trim())))?;
    let (amount_in, amount_out) = match typed_field {
        TypedField::A => (typed, derived),
        TypedField::B => (derived, typed),
    };

    Ok([
        CurrencyAmount::from_decimal(currencies[0].clone(), amount_in)?,
        CurrencyAmount::from_decimal(currencies[1].clone(), amount_out)?,
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryError {
    Account,
    Balance,
    Valid,
}

pub fn primary_error(account: Option<Address>, amount_in: &CurrencyAmount, balance_in: Decimal) -> PrimaryError {
    if account.is_none() {
        PrimaryError::Account
    } else if amount_in.to_decimal() > balance_in {
        PrimaryError::Balance
    } else {
        PrimaryError::Valid
    }
}

/// Whether the trade callback may run, and the message to show if not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackState {
    Invalid(String),
    Valid,
}

pub fn callback_state(
    account: Option<Address>,
    chain_id: Option<u64>,
    currencies: Option<&[Currency; 2]>,
    amount_in: Option<&CurrencyAmount>,
) -> CallbackState {
    if account.is_none() || chain_id.is_none() || currencies.is_none() {
        return CallbackState::Invalid("Missing dependencies".into());
    }
    match amount_in {
        Some(amount) if amount.is_zero() => CallbackState::Invalid("No amount provided".into()),
        _ => CallbackState::Valid,
    }
}

/// Reason the action button is disabled, if any.
pub fn gate(chain_id: Option<u64>, asset: Option<&Asset>) -> Option<&'static str> {
    if chain_id.and_then(SupportedChain::from_chain_id).is_none() {
        return Some("Switch to a supported chain");
    }
    match asset {
        None => Some("Select an asset"),
        Some(asset) if !asset.open => Some("Market is closed"),
        Some(_) => None,
    }
}

pub fn fee_label(asset: &Asset) -> String {
    format!("Fee: {:.2}%", asset.fee)
}
