//! Wallet/provider seam. The trade flow only needs an account, a chain id and a handful of
//! JSON-RPC calls, so everything else about the wallet stays behind `WalletProvider`.

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, MiddlewareError, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use serde_json::Value;
use std::fmt;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;
/// Geth's code for `execution reverted`.
pub const EXECUTION_REVERTED_CODE: i64 = 3;
/// Selector of `Error(string)`.
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// A failed provider call, normalised so callers can classify it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderFailure {
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    Transport(String),
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderFailure::Rpc { code, message, .. } => write!(f, "{} (code {})", message, code),
            ProviderFailure::Transport(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ProviderFailure {}

impl ProviderFailure {
    pub fn from_middleware<E: MiddlewareError>(err: E) -> Self {
        match err.as_error_response() {
            Some(resp) => ProviderFailure::Rpc {
                code: resp.code,
                message: resp.message.clone(),
                data: resp.data.clone(),
            },
            None => ProviderFailure::Transport(err.to_string()),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        match self {
            ProviderFailure::Rpc { code, message, .. } => {
                *code == USER_REJECTED_CODE || mentions_rejection(message)
            }
            ProviderFailure::Transport(message) => mentions_rejection(message),
        }
    }

    /// The node executed the call and it reverted.
    pub fn is_revert(&self) -> bool {
        match self {
            ProviderFailure::Rpc { code, message, data } => {
                *code == EXECUTION_REVERTED_CODE
                    || revert_data(data.as_ref()).is_some()
                    || message.to_lowercase().contains("revert")
            }
            ProviderFailure::Transport(_) => false,
        }
    }

    /// Best human-readable reason for a revert.
    pub fn revert_reason(&self) -> String {
        match self {
            ProviderFailure::Rpc { message, data, .. } => revert_data(data.as_ref())
                .and_then(|bytes| decode_error_string(&bytes))
                .unwrap_or_else(|| strip_revert_prefix(message)),
            ProviderFailure::Transport(message) => message.clone(),
        }
    }
}

fn mentions_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("user denied") || lower.contains("user rejected")
}

fn revert_data(data: Option<&Value>) -> Option<Vec<u8>> {
    let hex_str = match data? {
        Value::String(s) => s.clone(),
        Value::Object(map) => map.get("data")?.as_str()?.to_string(),
        _ => return None,
    };
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).ok()?;
    (!bytes.is_empty()).then_some(bytes)
}

fn decode_error_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 4 || bytes[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    match abi::decode(&[ParamType::String], &bytes[4..]).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}

fn strip_revert_prefix(message: &str) -> String {
    let trimmed = message.trim();
    match trimmed.find("execution reverted") {
        Some(idx) => trimmed[idx + "execution reverted".len()..]
            .trim_start_matches(':')
            .trim()
            .to_string(),
        None => trimmed.to_string(),
    }
}

/// Account, chain and the JSON-RPC calls the trade flow depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn account(&self) -> Option<Address>;

    fn chain_id(&self) -> u64;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ProviderFailure>;

    /// Read-only `eth_call`.
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, ProviderFailure>;

    /// Sign and broadcast, returning the transaction hash.
    async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256, ProviderFailure>;

    /// `Some(success)` once mined, `None` while pending.
    async fn transaction_status(&self, hash: H256) -> Result<Option<bool>, ProviderFailure>;
}

/// Local private-key wallet over an HTTP JSON-RPC endpoint.
pub struct EthersWallet {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
    chain_id: u64,
}

impl EthersWallet {
    pub fn connect(rpc_url: &str, private_key: &str, chain_id: u64) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)?;
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()?
            .with_chain_id(chain_id);
        Ok(Self {
            client: SignerMiddleware::new(provider, wallet),
            chain_id,
        })
    }
}

#[async_trait]
impl WalletProvider for EthersWallet {
    fn account(&self) -> Option<Address> {
        Some(self.client.address())
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ProviderFailure> {
        self.client
            .estimate_gas(tx, None)
            .await
            .map_err(ProviderFailure::from_middleware)
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, ProviderFailure> {
        self.client
            .call(tx, None)
            .await
            .map_err(ProviderFailure::from_middleware)
    }

    async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256, ProviderFailure> {
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(ProviderFailure::from_middleware)?;
        Ok(pending.tx_hash())
    }

    async fn transaction_status(&self, hash: H256) -> Result<Option<bool>, ProviderFailure> {
        let receipt = self
            .client
            .get_transaction_receipt(hash)
            .await
            .map_err(ProviderFailure::from_middleware)?;
        Ok(receipt.map(|r| r.status.map(|s| s.as_u64() == 1).unwrap_or(false)))
    }
}
