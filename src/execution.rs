//! Trade execution flow.
//!
//! review -> confirm: fetch oracle signatures, reconcile, encode the Synchronizer call, estimate
//! and submit. Each confirm runs under a store generation; if the user dismisses meanwhile, the
//! late result is dropped instead of overwriting the newer state.

use ethers::types::H256;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::chains::SupportedChain;
use crate::error::{TradeError, TradeResult};
use crate::oracle::OracleClient;
use crate::reconcile::{reconcile, ReconcilePolicy};
use crate::state::{TradeAction, TradeState, TradeStore};
use crate::submit::{Submission, TradeSubmitter};
use crate::synchronizer::{TradeCall, TradeCallBuilder, TradeRequest};
use crate::tracker::TransactionTracker;
use crate::wallet::WalletProvider;

pub struct TradeExecutor {
    provider: Arc<dyn WalletProvider>,
    oracle: OracleClient,
    policy: ReconcilePolicy,
    builder: TradeCallBuilder,
    tracker: TransactionTracker,
    store: Arc<TradeStore>,
    chain: SupportedChain,
    gas_margin_bps: u64,
}

impl TradeExecutor {
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        oracle: OracleClient,
        policy: ReconcilePolicy,
        tracker: TransactionTracker,
        gas_margin_bps: u64,
    ) -> TradeResult<Self> {
        let chain = SupportedChain::from_chain_id(provider.chain_id()).ok_or_else(|| {
            TradeError::MissingDependencies(format!(
                "chain {} has no Synchronizer",
                provider.chain_id()
            ))
        })?;
        Ok(Self::with_builder(
            provider,
            oracle,
            policy,
            TradeCallBuilder::new(chain)?,
            tracker,
            chain,
            gas_margin_bps,
        ))
    }

    pub fn with_builder(
        provider: Arc<dyn WalletProvider>,
        oracle: OracleClient,
        policy: ReconcilePolicy,
        builder: TradeCallBuilder,
        tracker: TransactionTracker,
        chain: SupportedChain,
        gas_margin_bps: u64,
    ) -> Self {
        Self {
            provider,
            oracle,
            policy,
            builder,
            tracker,
            store: Arc::new(TradeStore::new()),
            chain,
            gas_margin_bps,
        }
    }

    pub fn store(&self) -> Arc<TradeStore> {
        Arc::clone(&self.store)
    }

    pub fn tracker(&self) -> &TransactionTracker {
        &self.tracker
    }

    /// Open the review if both amounts are positive.
    pub fn review(&self, request: &TradeRequest) -> bool {
        let positive = |a: &Option<crate::types::CurrencyAmount>| a.as_ref().map_or(false, |a| !a.is_zero());
        if positive(&request.amount_in) && positive(&request.amount_out) {
            self.store.dispatch(TradeAction::ShowReview);
            true
        } else {
            false
        }
    }

    pub fn dismiss(&self) {
        self.store.dismiss();
    }

    /// Run one attempt end to end and fold the outcome into the store.
    pub async fn confirm(&self, request: &TradeRequest) -> (TradeState, TradeResult<H256>) {
        let generation = self.store.begin_attempt();
        let result = self.attempt(request).await;

        let action = match &result {
            Ok(hash) => TradeAction::Completed { tx_hash: *hash },
            Err(e) => TradeAction::Failed {
                error: e.user_message(),
            },
        };
        if !self.store.apply_if_current(generation, action) {
            warn!(generation, "trade attempt finished after dismissal, result dropped");
        }
        (self.store.snapshot(), result)
    }

    async fn attempt(&self, request: &TradeRequest) -> TradeResult<H256> {
        let call = self.construct_call(request).await?;
        let summary = request.summary();
        let submitter = TradeSubmitter::new(self.provider.as_ref(), &self.tracker, self.gas_margin_bps);
        let mut submission = Submission::new();

        match submitter.execute(&mut submission, &call, &summary).await {
            Ok(hash) => {
                info!(hash = ?hash, %summary, "trade submitted");
                Ok(hash)
            }
            Err(e) if e.is_user_rejection() => Err(e),
            Err(e) => {
                error!(error = %e, state = ?submission.state(), "trade failed");
                Err(e)
            }
        }
    }

    /// Fetch, reconcile and encode. Stops before any network I/O if the request is invalid.
    pub async fn construct_call(&self, request: &TradeRequest) -> TradeResult<TradeCall> {
        self.builder.check(request)?;
        let registrar = request
            .registrar
            .ok_or_else(|| TradeError::MissingDependencies("asset".into()))?;
        let operation = request.trade_type.operation();

        let results = self
            .oracle
            .fetch_signatures(registrar, self.chain, operation)
            .await;
        let bundle = reconcile(results, operation, &self.policy)?;
        info!(price = %bundle.price, nodes = bundle.len(), "oracle price agreed");

        self.builder
            .build(self.provider.as_ref(), request, &bundle)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::tests::{contract, quote_body};
    use crate::synchronizer::tests::request;
    use crate::synchronizer::CallPath;
    use crate::types::TradeType;
    use crate::wallet::{MockWalletProvider, ProviderFailure};
    use ethers::types::{Address, U256};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn oracle_node(body: String) -> url::Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        url::Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    async fn executor(prices: [&str; 2], provider: MockWalletProvider) -> TradeExecutor {
        let nodes = vec![
            oracle_node(quote_body(100, prices[0])).await,
            oracle_node(quote_body(100, prices[1])).await,
        ];
        let oracle = OracleClient::new(nodes, Duration::from_secs(2)).unwrap();
        let builder = TradeCallBuilder::with_path(Address::repeat_byte(0x99), CallPath::Direct).unwrap();
        TradeExecutor::with_builder(
            Arc::new(provider),
            oracle,
            ReconcilePolicy::unanimous(2),
            builder,
            TransactionTracker::new(),
            SupportedChain::Bsc,
            2000,
        )
    }

    fn sell_request() -> TradeRequest {
        let mut req = request(TradeType::Close);
        req.registrar = Some(contract());
        req
    }

    #[tokio::test]
    async fn test_happy_path() {
        let mut provider = MockWalletProvider::new();
        provider.expect_estimate_gas().returning(|_| Ok(U256::from(300_000)));
        provider.expect_chain_id().return_const(56u64);
        provider
            .expect_send_transaction()
            .times(1)
            .returning(|_| Ok(H256::repeat_byte(0xab)));

        let exec = executor(["1.2345", "1.2345"], provider).await;
        assert!(exec.review(&sell_request()));
        let (state, result) = exec.confirm(&sell_request()).await;

        assert_eq!(result, Ok(H256::repeat_byte(0xab)));
        assert_eq!(state.tx_hash, Some(H256::repeat_byte(0xab)));
        assert!(state.show_review);
        assert!(!state.attempting_txn);
        assert_eq!(exec.tracker().pending()[0].summary, "Trade 1 TSLA-L for 1.23 DEI");
    }

    #[tokio::test]
    async fn test_mismatched_oracles_never_reach_wallet() {
        let mut provider = MockWalletProvider::new();
        provider.expect_estimate_gas().never();
        provider.expect_send_transaction().never();

        let exec = executor(["1.2345", "1.9999"], provider).await;
        let (state, result) = exec.confirm(&sell_request()).await;

        assert!(matches!(result, Err(TradeError::SignatureMismatch(_))));
        assert!(!state.attempting_txn);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_revert_resets_attempt() {
        let mut provider = MockWalletProvider::new();
        provider
            .expect_estimate_gas()
            .returning(|_| Err(ProviderFailure::Transport("cannot estimate".into())));
        provider.expect_call().returning(|_| {
            Err(ProviderFailure::Rpc {
                code: 3,
                message: "execution reverted: market closed".into(),
                data: None,
            })
        });
        provider.expect_send_transaction().never();

        let exec = executor(["1.2345", "1.2345"], provider).await;
        let (state, result) = exec.confirm(&sell_request()).await;

        assert_eq!(result, Err(TradeError::ContractWouldRevert("market closed".into())));
        assert!(!state.attempting_txn);
        assert_eq!(state.tx_hash, None);
        assert_eq!(state.error.as_deref(), Some("Transaction would revert: market closed"));
    }

    #[tokio::test]
    async fn test_user_rejection() {
        let mut provider = MockWalletProvider::new();
        provider.expect_estimate_gas().returning(|_| Ok(U256::from(300_000)));
        provider.expect_send_transaction().returning(|_| {
            Err(ProviderFailure::Rpc {
                code: 4001,
                message: "User denied transaction signature.".into(),
                data: None,
            })
        });

        let exec = executor(["1.2345", "1.2345"], provider).await;
        let (state, result) = exec.confirm(&sell_request()).await;
        assert_eq!(result, Err(TradeError::UserRejected));
        assert_eq!(state.error.as_deref(), Some("Transaction rejected."));
    }

    #[tokio::test]
    async fn test_open_fails_before_fetching() {
        let provider = MockWalletProvider::new();
        let exec = executor(["1", "1"], provider).await;
        let mut req = sell_request();
        req.trade_type = TradeType::Open;
        let (_, result) = exec.confirm(&req).await;
        assert!(matches!(result, Err(TradeError::UnsupportedOperation(_))));
    }

    #[tokio::test]
    async fn test_dismissed_attempt_is_ignored() {
        let exec = executor(["1", "1"], MockWalletProvider::new()).await;
        let store = exec.store();
        let stale = store.begin_attempt();
        exec.dismiss();
        assert!(!store.apply_if_current(stale, TradeAction::Failed { error: "late".into() }));
        assert_eq!(store.snapshot().error, None);
    }
}
