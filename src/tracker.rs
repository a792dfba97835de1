//! Transaction tracker.
//!
//! Keeps the hashes the wallet broadcast together with a readable summary, and settles them
//! once a receipt shows up.

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::wallet::WalletProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTransaction {
    pub hash: H256,
    pub summary: String,
    pub chain_id: u64,
    pub from: Address,
    pub added_at: DateTime<Utc>,
    pub status: TxStatus,
}

/// Shared, cloneable handle to the transaction log.
#[derive(Clone, Default)]
pub struct TransactionTracker {
    entries: Arc<RwLock<HashMap<H256, TrackedTransaction>>>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hash: H256, summary: &str, chain_id: u64, from: Address) {
        info!(hash = ?hash, summary, "transaction submitted");
        let entry = TrackedTransaction {
            hash,
            summary: summary.to_string(),
            chain_id,
            from,
            added_at: Utc::now(),
            status: TxStatus::Pending,
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(hash, entry);
        }
    }

    pub fn finalize(&self, hash: H256, success: bool) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.get_mut(&hash) {
                entry.status = if success {
                    TxStatus::Confirmed
                } else {
                    TxStatus::Failed
                };
                info!(hash = ?hash, status = ?entry.status, summary = %entry.summary, "transaction settled");
            }
        }
    }

    pub fn get(&self, hash: H256) -> Option<TrackedTransaction> {
        self.entries.read().ok()?.get(&hash).cloned()
    }

    /// Pending transactions, oldest first.
    pub fn pending(&self) -> Vec<TrackedTransaction> {
        let mut pending: Vec<_> = match self.entries.read() {
            Ok(entries) => entries
                .values()
                .filter(|e| e.status == TxStatus::Pending)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        };
        pending.sort_by_key(|e| e.added_at);
        pending
    }

    /// Poll receipts for every pending transaction. Returns how many settled.
    pub async fn refresh(&self, provider: &dyn WalletProvider) -> usize {
        let mut settled = 0;
        for tx in self.pending() {
            match provider.transaction_status(tx.hash).await {
                Ok(Some(success)) => {
                    self.finalize(tx.hash, success);
                    settled += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(hash = ?tx.hash, error = %e, "receipt lookup failed"),
            }
        }
        settled
    }
}
