//! Trade attempt state.
//!
//! A single store owns the state. Every action produces a new value through `reduce`, and the
//! store swaps it in whole. Async flows tag their results with the generation they started in,
//! and the store drops results from a generation that has since been dismissed.

use ethers::types::H256;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypedField {
    #[default]
    A,
    B,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TradeState {
    pub typed_value: String,
    pub typed_field: TypedField,
    pub show_review: bool,
    pub attempting_txn: bool,
    pub error: Option<String>,
    pub tx_hash: Option<H256>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    SetTyped { value: String, field: TypedField },
    ShowReview,
    Attempting,
    Completed { tx_hash: H256 },
    Failed { error: String },
    Dismiss,
}

pub fn reduce(state: &TradeState, action: TradeAction) -> TradeState {
    match action {
        TradeAction::SetTyped { value, field } => TradeState {
            typed_value: value,
            typed_field: field,
            ..state.clone()
        },
        TradeAction::ShowReview => TradeState {
            show_review: true,
            error: None,
            ..state.clone()
        },
        TradeAction::Attempting => TradeState {
            attempting_txn: true,
            error: None,
            tx_hash: None,
            ..state.clone()
        },
        TradeAction::Completed { tx_hash } => TradeState {
            attempting_txn: false,
            error: None,
            tx_hash: Some(tx_hash),
            ..state.clone()
        },
        TradeAction::Failed { error } => TradeState {
            attempting_txn: false,
            error: Some(error),
            tx_hash: None,
            ..state.clone()
        },
        TradeAction::Dismiss => TradeState {
            show_review: false,
            attempting_txn: false,
            error: None,
            tx_hash: None,
            ..state.clone()
        },
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: TradeState,
    generation: u64,
}

/// Owner of the trade attempt state.
#[derive(Debug, Default)]
pub struct TradeStore {
    inner: RwLock<Inner>,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TradeState {
        self.inner
            .read()
            .map(|inner| inner.state.clone())
            .unwrap_or_default()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().map(|inner| inner.generation).unwrap_or(0)
    }

    pub fn dispatch(&self, action: TradeAction) {
        if let Ok(mut inner) = self.inner.write() {
            let next = reduce(&inner.state, action);
            inner.state = next;
        }
    }

    /// Start a new attempt; earlier in-flight attempts become stale.
    pub fn begin_attempt(&self) -> u64 {
        match self.inner.write() {
            Ok(mut inner) => {
                inner.generation += 1;
                let next = reduce(&inner.state, TradeAction::Attempting);
                inner.state = next;
                inner.generation
            }
            Err(_) => 0,
        }
    }

    /// Apply a flow result if `generation` is still current. Returns whether it applied.
    pub fn apply_if_current(&self, generation: u64, action: TradeAction) -> bool {
        match self.inner.write() {
            Ok(mut inner) if inner.generation == generation => {
                let next = reduce(&inner.state, action);
                inner.state = next;
                true
            }
            _ => false,
        }
    }

    /// Close the review and invalidate whatever attempt is in flight.
    pub fn dismiss(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.generation += 1;
            let next = reduce(&inner.state, TradeAction::Dismiss);
            inner.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_lifecycle() {
        let s0 = TradeState::default();
        let s1 = reduce(&s0, TradeAction::SetTyped { value: "1.5".into(), field: TypedField::A });
        let s2 = reduce(&s1, TradeAction::ShowReview);
        let s3 = reduce(&s2, TradeAction::Attempting);
        let s4 = reduce(&s3, TradeAction::Failed { error: "Transaction rejected.".into() });

        assert_eq!(s0, TradeState::default());
        assert_eq!(s1.typed_value, "1.5");
        assert!(s2.show_review);
        assert!(s3.attempting_txn);
        assert!(!s4.attempting_txn);
        assert_eq!(s4.error.as_deref(), Some("Transaction rejected."));

        let s5 = reduce(&s4, TradeAction::Dismiss);
        assert!(!s5.show_review);
        assert_eq!(s5.error, None);
        assert_eq!(s5.typed_value, "1.5");
    }

    #[test]
    fn test_stale_result_is_dropped() {
        let store = TradeStore::new();
        store.dispatch(TradeAction::ShowReview);

        let stale = store.begin_attempt();
        store.dismiss();
        assert!(!store.apply_if_current(stale, TradeAction::Completed { tx_hash: H256::repeat_byte(1) }));
        assert_eq!(store.snapshot().tx_hash, None);

        let current = store.begin_attempt();
        assert!(store.apply_if_current(current, TradeAction::Completed { tx_hash: H256::repeat_byte(2) }));
        assert_eq!(store.snapshot().tx_hash, Some(H256::repeat_byte(2)));
        assert!(!store.snapshot().attempting_txn);
    }
}
