//! Query every oracle node for one synth and show whether their signatures reconcile.
//!
//! Usage: fetch_signatures <contract> [sell|buy] [user]

use anyhow::{anyhow, Result};
use ethers::types::{Address, U256};
use std::str::FromStr;

use synth_trader::config::Config;
use synth_trader::oracle::OracleClient;
use synth_trader::reconcile::reconcile;
use synth_trader::synchronizer::TradeCallBuilder;
use synth_trader::types::Operation;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    let mut args = std::env::args().skip(1);
    let contract = args
        .next()
        .ok_or_else(|| anyhow!("usage: fetch_signatures <contract> [sell|buy] [user]"))?;
    let contract = Address::from_str(&contract)?;
    let operation = match args.next().as_deref() {
        None | Some("sell") => Operation::Sell,
        Some("buy") => Operation::Buy,
        Some(other) => return Err(anyhow!("unknown operation {}", other)),
    };
    let user = match args.next() {
        Some(user) => Address::from_str(&user)?,
        None => Address::zero(),
    };

    let oracle = OracleClient::new(config.oracle_urls.clone(), config.oracle_timeout)?;
    println!(
        "Fetching {} signatures for {:?} on {} from {} nodes",
        operation.as_str(),
        contract,
        config.chain.name(),
        oracle.nodes().len()
    );

    let results = oracle.fetch_signatures(contract, config.chain, operation).await;
    for (node, result) in oracle.nodes().iter().zip(&results) {
        match result {
            Ok(sig) => println!(
                "✅ {} block={} price={} fee={} multiplier={}",
                node, sig.block_no, sig.price, sig.fee, sig.multiplier
            ),
            Err(e) => println!("❌ {} {}", node, e),
        }
    }

    match reconcile(results, operation, &config.policy) {
        Ok(bundle) => {
            println!("Agreed price {} from {} nodes", bundle.price, bundle.len());
            println!("  blockNos: {:?}", bundle.block_nos());
            println!("  prices:   {:?}", bundle.prices()?);
            println!("  v:        {:?}", bundle.v());
            println!("  r:        {:?}", bundle.r());
            println!("  s:        {:?}", bundle.s());

            // one whole synth, just to show the encoding
            let builder = TradeCallBuilder::new(config.chain)?;
            let data = builder.encode_input(user, contract, U256::exp10(18), &bundle)?;
            println!("Calldata for {:?}:", builder.synchronizer());
            println!("0x{}", hex::encode(&data));
        }
        Err(e) => println!("❌ {}", e.user_message()),
    }
    Ok(())
}
