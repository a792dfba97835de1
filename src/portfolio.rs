//! Portfolio view: wallet balances of each synth, priced by the oracle.

use ethers::abi::{parse_abi, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionRequest, U256};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{TradeError, TradeResult};
use crate::types::{Asset, CurrencyAmount};
use crate::wallet::WalletProvider;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Balance {
    pub balance: Decimal,
    pub price: Decimal,
    pub equity: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    balances: HashMap<Address, Balance>,
    show_equity: bool,
}

impl Portfolio {
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
            show_equity: true,
        }
    }

    pub fn balances(&self) -> &HashMap<Address, Balance> {
        &self.balances
    }

    pub fn get(&self, contract: Address) -> Option<&Balance> {
        self.balances.get(&contract)
    }

    pub fn update_balance(&mut self, contract: Address, balance: Decimal) {
        let entry = self.balances.entry(contract).or_default();
        entry.balance = balance;
        entry.equity = entry.balance.saturating_mul(entry.price);
    }

    pub fn update_price(&mut self, contract: Address, price: Decimal) {
        if let Some(entry) = self.balances.get_mut(&contract) {
            entry.price = price;
            entry.equity = entry.balance.saturating_mul(entry.price);
        }
    }

    pub fn update_equity(&mut self, contract: Address, equity: Decimal) {
        if let Some(entry) = self.balances.get_mut(&contract) {
            entry.equity = equity;
        }
    }

    pub fn remove(&mut self, contract: Address) {
        self.balances.remove(&contract);
    }

    /// Re-price every held synth from the current asset list.
    pub fn apply_prices<'a>(&mut self, assets: impl IntoIterator<Item = &'a Asset>) {
        for asset in assets {
            self.update_price(asset.contract, asset.price);
        }
    }

    /// Contracts ordered by equity, largest first.
    pub fn sorted_contracts(&self) -> Vec<Address> {
        let mut entries: Vec<_> = self.balances.iter().collect();
        entries.sort_by(|(a_addr, a), (b_addr, b)| b.equity.cmp(&a.equity).then(a_addr.cmp(b_addr)));
        entries.into_iter().map(|(addr, _)| *addr).collect()
    }

    pub fn total_equity(&self) -> Decimal {
        self.balances
            .values()
            .fold(Decimal::ZERO, |total, b| total.saturating_add(b.equity))
    }

    pub fn show_equity(&self) -> bool {
        self.show_equity
    }

    pub fn toggle_equity(&mut self) {
        self.show_equity = !self.show_equity;
    }

    /// Read `balanceOf(account)` for every asset; zero balances are dropped from the view.
    pub async fn refresh_balances(
        &mut self,
        provider: &dyn WalletProvider,
        account: Address,
        assets: &[Asset],
    ) -> TradeResult<usize> {
        let erc20 = parse_abi(&["function balanceOf(address owner) view returns (uint256)"])
            .map_err(|e| TradeError::Abi(e.to_string()))?;
        let balance_of = erc20.function("balanceOf")?;
        let data = balance_of.encode_input(&[Token::Address(account)])?;

        for asset in assets {
            let tx: TypedTransaction = TransactionRequest::new()
                .to(asset.contract)
                .data(data.clone())
                .into();
            let output = match provider.call(&tx).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(contract = ?asset.contract, error = %e, "balanceOf failed");
                    continue;
                }
            };
            let raw = match balance_of.decode_output(&output).map(|t| t.into_iter().next()) {
                Ok(Some(Token::Uint(raw))) => raw,
                Ok(_) => U256::zero(),
                Err(e) => {
                    warn!(contract = ?asset.contract, error = %e, "balanceOf returned garbage");
                    continue;
                }
            };

            if raw.is_zero() {
                self.remove(asset.contract);
                continue;
            }
            let amount = CurrencyAmount::from_raw(asset.currency(), raw);
            self.update_balance(asset.contract, amount.to_decimal());
            self.update_price(asset.contract, asset.price);
        }
        debug!(positions = self.balances.len(), "balances refreshed");
        Ok(self.balances.len())
    }
}

/// Nine significant digits, rounded down.
pub fn format_balance(balance: Decimal) -> String {
    if balance.is_zero() {
        return "0".to_string();
    }
    let digits_before_point = balance.trunc().abs().to_string().trim_start_matches('0').len() as i64;
    let scale = if digits_before_point > 0 {
        (9 - digits_before_point).max(0)
    } else {
        // leading zeros after the point do not count as significant
        let mut zeros = 0i64;
        let mut probe = balance.abs();
        while probe < Decimal::ONE / Decimal::TEN && zeros < 28 {
            probe *= Decimal::TEN;
            zeros += 1;
        }
        (9 + zeros).min(28)
    };
    balance
        .round_dp_with_strategy(scale as u32, RoundingStrategy::ToZero)
        .normalize()
        .to_string()
}
