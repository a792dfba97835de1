use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use synth_trader::assets::{self, AssetCache};
use synth_trader::chains::{self, SupportedChain};
use synth_trader::config::{Config, OneShotTrade};
use synth_trader::oracle::OracleClient;
use synth_trader::portfolio::{format_balance, Portfolio};
use synth_trader::quote::{self, CallbackState, PrimaryError};
use synth_trader::state::TypedField;
use synth_trader::synchronizer::TradeRequest;
use synth_trader::tracker::TransactionTracker;
use synth_trader::types::TradeType;
use synth_trader::wallet::{EthersWallet, WalletProvider};
use synth_trader::TradeExecutor;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,synth_trader=debug")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        chain = config.chain.name(),
        oracles = config.oracle_urls.len(),
        quorum = config.policy.quorum,
        "Starting Synchronizer trade client..."
    );

    let private_key = config
        .private_key
        .as_deref()
        .ok_or_else(|| anyhow!("PRIVATE_KEY must be set"))?;
    let wallet = EthersWallet::connect(&config.rpc_url, private_key, config.chain.chain_id())
        .context("connecting wallet")?;
    let account = wallet
        .account()
        .ok_or_else(|| anyhow!("wallet has no account"))?;
    info!(account = ?account, explorer = config.chain.explorer_url(), "wallet connected");
    let provider: Arc<dyn WalletProvider> = Arc::new(wallet);

    let oracle = OracleClient::new(config.oracle_urls.clone(), config.oracle_timeout)?;
    let tracker = TransactionTracker::new();
    let executor = TradeExecutor::new(
        Arc::clone(&provider),
        oracle.clone(),
        config.policy.clone(),
        tracker.clone(),
        config.gas_margin_bps,
    )?;

    // Asset list poller
    let cache = assets::new_asset_cache();
    let (refreshed_tx, mut refreshed_rx) = watch::channel(0usize);
    let info_url = url::Url::parse(chains::INFO_BASE_URL)?;
    let updater_cache = cache.clone();
    let (chain, every) = (config.chain, config.asset_refresh);
    tokio::spawn(async move {
        assets::run_asset_updater(oracle, info_url, chain, updater_cache, every, move |count| {
            let _ = refreshed_tx.send(count);
        })
        .await;
    });

    // Receipt poller
    let tracker_provider = Arc::clone(&provider);
    let poll_tracker = tracker.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tokio::time::Duration::from_secs(15));
        loop {
            ticker.tick().await;
            poll_tracker.refresh(tracker_provider.as_ref()).await;
        }
    });

    let mut portfolio = Portfolio::new();
    let mut pending_trade = config.trade.clone();

    while refreshed_rx.changed().await.is_ok() {
        let listed: Vec<_> = match cache.read() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(_) => continue,
        };
        if let Err(e) = portfolio
            .refresh_balances(provider.as_ref(), account, &listed)
            .await
        {
            warn!(error = %e, "portfolio refresh failed");
        }
        log_portfolio(&portfolio, &cache);

        if let Some(trade) = pending_trade.take() {
            if let Err(e) = run_one_shot(&executor, &config, &cache, &portfolio, account, &trade).await {
                error!(error = %e, "one-shot trade aborted");
            }
        }
    }
    Ok(())
}

fn log_portfolio(portfolio: &Portfolio, cache: &AssetCache) {
    let contracts = portfolio.sorted_contracts();
    info!(
        positions = contracts.len(),
        equity = %portfolio.total_equity().round_dp(2),
        "portfolio"
    );
    for contract in contracts {
        let Some(balance) = portfolio.get(contract) else { continue };
        let label = assets::asset_by_contract(cache, contract)
            .map(|a| a.currency().symbol)
            .unwrap_or_else(|| format!("{:?}", contract));
        info!(
            asset = %label,
            balance = %format_balance(balance.balance),
            equity = %balance.equity.round_dp(2),
            "  position"
        );
    }
}

async fn run_one_shot(
    executor: &TradeExecutor,
    config: &Config,
    cache: &AssetCache,
    portfolio: &Portfolio,
    account: ethers::types::Address,
    trade: &OneShotTrade,
) -> Result<()> {
    let chain: SupportedChain = config.chain;
    let asset = assets::asset_by_contract(cache, trade.currency);
    if let Some(reason) = quote::gate(Some(chain.chain_id()), asset.as_ref()) {
        return Err(anyhow!(reason));
    }
    let asset = asset.ok_or_else(|| anyhow!("Select an asset"))?;

    let currencies = quote::trade_currencies(TradeType::Close, &asset.currency(), &chain.collateral());
    let [amount_in, amount_out] = quote::quote(
        &asset,
        TradeType::Close,
        &currencies,
        &trade.amount.to_string(),
        TypedField::A,
    )?;

    let held = portfolio
        .get(asset.contract)
        .map(|b| b.balance)
        .unwrap_or_default();
    match quote::primary_error(Some(account), &amount_in, held) {
        PrimaryError::Valid => {}
        PrimaryError::Balance => {
            return Err(anyhow!("Insufficient {} Balance", currencies[0].symbol))
        }
        PrimaryError::Account => return Err(anyhow!("Connect Wallet")),
    }
    if let CallbackState::Invalid(reason) =
        quote::callback_state(Some(account), Some(chain.chain_id()), Some(&currencies), Some(&amount_in))
    {
        return Err(anyhow!(reason));
    }

    let request = TradeRequest {
        account: Some(account),
        registrar: Some(asset.contract),
        amount_in: Some(amount_in),
        amount_out: Some(amount_out),
        trade_type: TradeType::Close,
        direction: asset.direction,
    };
    info!(summary = %request.summary(), fee = %quote::fee_label(&asset), "reviewing trade");
    if !executor.review(&request) {
        return Err(anyhow!("No amount provided"));
    }

    let (state, result) = executor.confirm(&request).await;
    match result {
        Ok(hash) => info!(hash = ?hash, "✅ trade sent"),
        Err(e) if e.is_user_rejection() => info!("trade rejected in wallet"),
        Err(e) => warn!(error = ?state.error, cause = %e, "❌ trade failed"),
    }
    executor.dismiss();
    Ok(())
}
