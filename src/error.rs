//! Error types for the trade-execution path.
//!
//! `FetchError` never leaves the oracle fan-out on its own: the reconciler folds it into
//! quorum accounting. `TradeError` is what the trade flow reports to the caller.

use thiserror::Error;

/// Why a single oracle node did not produce a usable signature record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("oracle request timed out")]
    Timeout,

    #[error("oracle returned HTTP {0}")]
    Status(u16),

    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("malformed oracle payload: {0}")]
    Malformed(String),

    #[error("oracle has no quote for {0}")]
    MissingAsset(String),

    #[error("oracle quote has no '{0}' signature")]
    MissingOperation(String),
}

/// Failures surfaced by a trade attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("Missing dependencies: {0}")]
    MissingDependencies(String),

    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    #[error("Insufficient oracle signatures: {received} of {required} required")]
    InsufficientSignatures { required: usize, received: usize },

    #[error("Oracle signatures disagree: {0}")]
    SignatureMismatch(String),

    #[error("Gas estimation failed: {0}")]
    EstimationFailed(String),

    #[error("Transaction would revert: {0}")]
    ContractWouldRevert(String),

    #[error("Transaction rejected.")]
    UserRejected,

    #[error("Transaction failed: {0}")]
    BroadcastFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("ABI encoding failed: {0}")]
    Abi(String),
}

impl TradeError {
    /// Single line shown to the user when an attempt ends with this error.
    pub fn user_message(&self) -> String {
        match self {
            TradeError::UserRejected => "Transaction rejected.".to_string(),
            TradeError::InsufficientSignatures { .. } => {
                "Not enough oracles answered. Please try again.".to_string()
            }
            TradeError::SignatureMismatch(_) => {
                "Oracle prices do not agree right now. Please try again.".to_string()
            }
            TradeError::EstimationFailed(_) => {
                "Unexpected error. Could not estimate gas for this transaction.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// A declined signature is the user's choice, not an application failure.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, TradeError::UserRejected)
    }
}

impl From<ethers::abi::Error> for TradeError {
    fn from(e: ethers::abi::Error) -> Self {
        TradeError::Abi(e.to_string())
    }
}

pub type TradeResult<T> = Result<T, TradeError>;
