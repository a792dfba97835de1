//! Asset list: which synths exist on a chain, their display details and oracle price.
//! Rebuilt from the info oracle on every poll and swapped into the cache whole.

use ethers::types::Address;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

use crate::chains::SupportedChain;
use crate::error::FetchError;
use crate::oracle::OracleClient;
use crate::types::{Asset, Direction};

/// Assets keyed by contract address.
pub type AssetCache = Arc<RwLock<HashMap<Address, Asset>>>;

pub fn new_asset_cache() -> AssetCache {
    Arc::new(RwLock::new(HashMap::new()))
}

pub fn asset_by_contract(cache: &AssetCache, contract: Address) -> Option<Asset> {
    cache.read().ok()?.get(&contract).cloned()
}

#[derive(Debug, Deserialize)]
struct Conducted {
    tokens: Vec<ConductedToken>,
}

#[derive(Debug, Deserialize)]
struct ConductedToken {
    id: String,
    long: String,
    short: String,
}

#[derive(Debug, Deserialize)]
struct Details {
    name: String,
    symbol: String,
    #[serde(default)]
    fee: Value,
    #[serde(default)]
    open: bool,
}

fn decimal_field(v: &Value) -> Decimal {
    match v {
        Value::String(s) => Decimal::from_str(s.trim()).unwrap_or_default(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// Join the three info documents into the asset list.
///
/// Tokens without details are skipped; contracts without a quote get a zero price and are
/// treated as closed.
pub fn build_assets(conducted: &str, details: &str, signatures: &str) -> Result<Vec<Asset>, FetchError> {
    let conducted: Conducted =
        serde_json::from_str(conducted).map_err(|e| FetchError::Malformed(format!("conducted: {}", e)))?;
    let details: HashMap<String, Details> =
        serde_json::from_str(details).map_err(|e| FetchError::Malformed(format!("details: {}", e)))?;
    let quotes: HashMap<String, Value> =
        serde_json::from_str(signatures).map_err(|e| FetchError::Malformed(format!("signatures: {}", e)))?;
    let quotes: HashMap<String, Value> = quotes
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    let mut assets = Vec::with_capacity(conducted.tokens.len() * 2);
    for token in &conducted.tokens {
        let Some(detail) = details.get(&token.id) else {
            continue;
        };
        let (Ok(long), Ok(short)) = (Address::from_str(&token.long), Address::from_str(&token.short)) else {
            warn!(id = %token.id, "conducted token has a bad contract address");
            continue;
        };

        for (direction, contract, sibling) in [(Direction::Long, long, short), (Direction::Short, short, long)] {
            let price = quotes
                .get(&format!("{:?}", contract))
                .and_then(|q| q.get("price"))
                .map(decimal_field);
            assets.push(Asset {
                id: token.id.clone(),
                symbol: detail.symbol.clone(),
                name: detail.name.clone(),
                direction,
                sibling,
                price: price.unwrap_or_default(),
                fee: decimal_field(&detail.fee),
                open: detail.open && price.is_some(),
                contract,
            });
        }
    }
    Ok(assets)
}

pub async fn fetch_assets(
    oracle: &OracleClient,
    info: &url::Url,
    chain: SupportedChain,
) -> Result<Vec<Asset>, FetchError> {
    let network = chain.oracle_network();
    let join = |path: String| info.join(&path).map_err(|e| FetchError::Transport(e.to_string()));

    let conducted_url = join(format!("{}/conducted.json", network))?;
    let details_url = join("details.json".to_string())?;
    let signatures_url = OracleClient::signatures_url(info, chain)?;

    let (conducted, details, signatures) = tokio::join!(
        oracle.get_text(&conducted_url),
        oracle.get_text(&details_url),
        oracle.get_text(&signatures_url)
    );
    build_assets(&conducted?, &details?, &signatures?)
}

/// Poll the info oracle forever, replacing the cache after every successful fetch.
pub async fn run_asset_updater(
    oracle: OracleClient,
    info: url::Url,
    chain: SupportedChain,
    cache: AssetCache,
    every: Duration,
    on_refresh: impl Fn(usize) + Send,
) {
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        match fetch_assets(&oracle, &info, chain).await {
            Ok(assets) => {
                let count = assets.len();
                let fresh: HashMap<Address, Asset> = assets.into_iter().map(|a| (a.contract, a)).collect();
                if let Ok(mut guard) = cache.write() {
                    *guard = fresh;
                    info!(count, network = chain.oracle_network(), "asset list updated");
                } else {
                    warn!("asset cache lock poisoned");
                    continue;
                }
                on_refresh(count);
            }
            Err(e) => warn!(error = %e, "asset list refresh failed"),
        }
    }
}
