//! Gas estimation and submission.
//!
//! `Idle -> Estimating -> (EstimateFailed | Estimated) -> Submitting -> (Submitted | SubmitFailed)`
//!
//! Nothing here retries. Oracle quotes are block-bound, so a failed attempt needs a new one.

use ethers::types::{H256, U256};
use tracing::{debug, info, warn};

use crate::error::{TradeError, TradeResult};
use crate::synchronizer::TradeCall;
use crate::tracker::TransactionTracker;
use crate::wallet::WalletProvider;

const BPS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitState {
    Idle,
    Estimating,
    EstimateFailed(TradeError),
    Estimated { gas: U256 },
    Submitting { gas_limit: U256 },
    Submitted { hash: H256 },
    SubmitFailed(TradeError),
}

impl SubmitState {
    fn can_move_to(&self, next: &SubmitState) -> bool {
        use SubmitState::*;
        matches!(
            (self, next),
            (Idle, Estimating)
                | (Estimating, EstimateFailed(_))
                | (Estimating, Estimated { .. })
                | (Estimated { .. }, Submitting { .. })
                | (Submitting { .. }, Submitted { .. })
                | (Submitting { .. }, SubmitFailed(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmitState::EstimateFailed(_) | SubmitState::Submitted { .. } | SubmitState::SubmitFailed(_)
        )
    }
}

/// One submission and every state it went through.
#[derive(Debug, Clone)]
pub struct Submission {
    history: Vec<SubmitState>,
}

impl Default for Submission {
    fn default() -> Self {
        Self {
            history: vec![SubmitState::Idle],
        }
    }
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SubmitState {
        // history always starts with Idle
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self) -> &[SubmitState] {
        &self.history
    }

    fn advance(&mut self, next: SubmitState) {
        debug_assert!(
            self.state().can_move_to(&next),
            "illegal submit transition {:?} -> {:?}",
            self.state(),
            next
        );
        debug!(from = ?self.state(), to = ?next, "submit state");
        self.history.push(next);
    }
}

/// `estimate * (10000 + margin_bps) / 10000`
pub fn gas_with_margin(estimate: U256, margin_bps: u64) -> U256 {
    estimate.saturating_mul(U256::from(BPS.saturating_add(margin_bps))) / U256::from(BPS)
}

pub struct TradeSubmitter<'a> {
    provider: &'a dyn WalletProvider,
    tracker: &'a TransactionTracker,
    margin_bps: u64,
}

impl<'a> TradeSubmitter<'a> {
    pub fn new(provider: &'a dyn WalletProvider, tracker: &'a TransactionTracker, margin_bps: u64) -> Self {
        Self {
            provider,
            tracker,
            margin_bps,
        }
    }

    /// Estimate, then sign and broadcast. The submission records every transition.
    pub async fn execute(
        &self,
        submission: &mut Submission,
        call: &TradeCall,
        summary: &str,
    ) -> TradeResult<H256> {
        submission.advance(SubmitState::Estimating);
        let gas = match self.estimate(call).await {
            Ok(gas) => gas,
            Err(e) => {
                submission.advance(SubmitState::EstimateFailed(e.clone()));
                return Err(e);
            }
        };
        submission.advance(SubmitState::Estimated { gas });

        let gas_limit = gas_with_margin(gas, self.margin_bps);
        submission.advance(SubmitState::Submitting { gas_limit });

        let mut tx = call.to_transaction();
        tx.set_gas(gas_limit);

        match self.provider.send_transaction(tx).await {
            Ok(hash) => {
                self.tracker
                    .add(hash, summary, self.provider.chain_id(), call.from);
                submission.advance(SubmitState::Submitted { hash });
                Ok(hash)
            }
            Err(failure) if failure.is_user_rejection() => {
                info!("wallet declined to sign the trade");
                submission.advance(SubmitState::SubmitFailed(TradeError::UserRejected));
                Err(TradeError::UserRejected)
            }
            Err(failure) => {
                warn!(error = %failure, to = ?call.to, value = %call.value, "broadcast failed");
                let err = TradeError::BroadcastFailed(failure.to_string());
                submission.advance(SubmitState::SubmitFailed(err.clone()));
                Err(err)
            }
        }
    }

    /// On a failed estimate, simulate the call to tell a revert from a flaky estimator.
    pub async fn estimate(&self, call: &TradeCall) -> TradeResult<U256> {
        let tx = call.to_transaction();
        let gas_error = match self.provider.estimate_gas(&tx).await {
            Ok(gas) => return Ok(gas),
            Err(e) => e,
        };
        debug!(error = %gas_error, "gas estimate failed, trying eth_call to extract error");

        match self.provider.call(&tx).await {
            Ok(_) => {
                warn!(error = %gas_error, "unexpected successful call after failed estimate gas");
                Err(TradeError::EstimationFailed(
                    "Unexpected issue with estimating the gas. Please try again.".into(),
                ))
            }
            Err(call_error) if call_error.is_revert() => {
                Err(TradeError::ContractWouldRevert(call_error.revert_reason()))
            }
            Err(call_error) => Err(TradeError::EstimationFailed(call_error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{MockWalletProvider, ProviderFailure};
    use ethers::types::{Address, Bytes};

    fn call() -> TradeCall {
        TradeCall {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            data: Bytes::from(vec![1, 2, 3, 4]),
            value: U256::zero(),
        }
    }

    #[test]
    fn test_gas_margin() {
        assert_eq!(gas_with_margin(U256::from(100_000), 2000), U256::from(120_000));
        assert_eq!(gas_with_margin(U256::from(100_000), 0), U256::from(100_000));
        assert_eq!(gas_with_margin(U256::from(100_000), u64::MAX), U256::from(u64::MAX) * 10);
    }

    #[tokio::test]
    async fn test_submits_with_margin() {
        let mut provider = MockWalletProvider::new();
        provider.expect_estimate_gas().returning(|_| Ok(U256::from(200_000)));
        provider.expect_chain_id().return_const(100u64);
        provider
            .expect_send_transaction()
            .withf(|tx| tx.gas() == Some(&U256::from(240_000)))
            .times(1)
            .returning(|_| Ok(H256::repeat_byte(7)));

        let tracker = TransactionTracker::new();
        let submitter = TradeSubmitter::new(&provider, &tracker, 2000);
        let mut submission = Submission::new();

        let hash = submitter.execute(&mut submission, &call(), "Trade").await.unwrap();
        assert_eq!(hash, H256::repeat_byte(7));
        assert_eq!(submission.state(), &SubmitState::Submitted { hash });
        assert_eq!(submission.history().len(), 5);
        assert_eq!(tracker.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_revert_is_classified_and_nothing_sent() {
        let mut provider = MockWalletProvider::new();
        provider
            .expect_estimate_gas()
            .returning(|_| Err(ProviderFailure::Transport("gas required exceeds allowance".into())));
        provider.expect_call().returning(|_| {
            Err(ProviderFailure::Rpc {
                code: 3,
                message: "execution reverted: market closed".into(),
                data: None,
            })
        });
        provider.expect_send_transaction().never();

        let tracker = TransactionTracker::new();
        let submitter = TradeSubmitter::new(&provider, &tracker, 2000);
        let mut submission = Submission::new();

        let err = submitter.execute(&mut submission, &call(), "Trade").await.unwrap_err();
        assert_eq!(err, TradeError::ContractWouldRevert("market closed".into()));
        assert!(submission.state().is_terminal());
        assert!(tracker.pending().is_empty());
    }

    #[tokio::test]
    async fn test_estimate_infrastructure_error() {
        let mut provider = MockWalletProvider::new();
        provider
            .expect_estimate_gas()
            .returning(|_| Err(ProviderFailure::Transport("503".into())));
        provider
            .expect_call()
            .returning(|_| Err(ProviderFailure::Transport("connection reset".into())));

        let tracker = TransactionTracker::new();
        let submitter = TradeSubmitter::new(&provider, &tracker, 2000);
        assert!(matches!(
            submitter.estimate(&call()).await,
            Err(TradeError::EstimationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_estimate_fails_but_call_succeeds() {
        let mut provider = MockWalletProvider::new();
        provider
            .expect_estimate_gas()
            .returning(|_| Err(ProviderFailure::Transport("flaky".into())));
        provider.expect_call().returning(|_| Ok(Bytes::default()));

        let tracker = TransactionTracker::new();
        let submitter = TradeSubmitter::new(&provider, &tracker, 2000);
        assert_eq!(
            submitter.estimate(&call()).await,
            Err(TradeError::EstimationFailed(
                "Unexpected issue with estimating the gas. Please try again.".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_rejection_differs_from_broadcast_failure() {
        let run = |failure: ProviderFailure| async move {
            let mut provider = MockWalletProvider::new();
            provider.expect_estimate_gas().returning(|_| Ok(U256::from(21_000)));
            provider
                .expect_send_transaction()
                .returning(move |_| Err(failure.clone()));
            let tracker = TransactionTracker::new();
            let submitter = TradeSubmitter::new(&provider, &tracker, 2000);
            submitter.execute(&mut Submission::new(), &call(), "Trade").await
        };

        let rejected = run(ProviderFailure::Rpc {
            code: 4001,
            message: "User rejected the request.".into(),
            data: None,
        })
        .await;
        assert_eq!(rejected, Err(TradeError::UserRejected));

        let broadcast = run(ProviderFailure::Transport("connection refused".into())).await;
        assert!(matches!(broadcast, Err(TradeError::BroadcastFailed(_))));
    }
}
