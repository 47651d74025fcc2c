//! Ledger client interface
//!
//! The contract side is external: the server only submits results and
//! listens for dispute notices.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::core::hash::{hash_with_domain, OutcomeHash};
use crate::game::PlayerId;

/// Domain separator for synthetic dry-run transaction hashes.
const DRY_RUN_DOMAIN: &[u8] = b"BITARENA_DRY_RUN_TX_V1";

/// Ledger call failures. All are treated as transient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No confirmation in time.
    #[error("Ledger timeout")]
    Timeout,

    /// Transaction reverted.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Gas allowance too low.
    #[error("Insufficient gas (limit {0})")]
    InsufficientGas(u64),

    /// Node unreachable.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// One `submit_result` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub ledger_match_id: u64,
    pub winner: PlayerId,
    pub digest: OutcomeHash,
    /// Gas allowance for this attempt
    pub gas_limit: u64,
}

/// Confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash, hex
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Dispute raised against a settled result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeNotice {
    pub ledger_match_id: u64,
    /// Account that raised the dispute
    pub challenger: String,
    pub reason: String,
}

/// Settlement contract client.
pub trait Ledger: Send + Sync {
    /// Submit a match result for settlement.
    fn submit_result(&self, request: SubmitRequest) -> BoxFuture<'_, Result<TxReceipt, LedgerError>>;

    /// Stream of dispute notices.
    fn subscribe_disputes(&self) -> broadcast::Receiver<DisputeNotice>;
}

// =============================================================================
// DRY RUN
// =============================================================================

/// Ledger that confirms everything locally.
///
/// Receipts carry a hash derived from the request, so repeated runs log the
/// same transaction ids. `fail_first` makes the first N submissions time out.
pub struct DryRunLedger {
    disputes: broadcast::Sender<DisputeNotice>,
    submissions: Mutex<Vec<SubmitRequest>>,
    failures_left: AtomicU32,
    next_block: AtomicU64,
}

impl DryRunLedger {
    pub fn new() -> Self {
        let (disputes, _) = broadcast::channel(64);
        Self {
            disputes,
            submissions: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(0),
            next_block: AtomicU64::new(1),
        }
    }

    /// Fail the next `count` submissions with `Timeout`.
    pub fn fail_first(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Every request received, in order (including failed ones).
    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.submissions.lock().clone()
    }

    /// Publish a dispute notice. Returns the number of listeners reached.
    pub fn raise_dispute(&self, ledger_match_id: u64, challenger: &str, reason: &str) -> usize {
        let notice = DisputeNotice {
            ledger_match_id,
            challenger: challenger.to_string(),
            reason: reason.to_string(),
        };
        self.disputes.send(notice).unwrap_or(0)
    }
}

impl Default for DryRunLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for DryRunLedger {
    fn submit_result(&self, request: SubmitRequest) -> BoxFuture<'_, Result<TxReceipt, LedgerError>> {
        async move {
            self.submissions.lock().push(request.clone());

            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(LedgerError::Timeout);
            }

            let mut preimage = Vec::with_capacity(8 + 32 + request.winner.len());
            preimage.extend_from_slice(&request.ledger_match_id.to_le_bytes());
            preimage.extend_from_slice(&request.digest);
            preimage.extend_from_slice(request.winner.as_bytes());
            let tx_hash = hex::encode(hash_with_domain(DRY_RUN_DOMAIN, &preimage));

            info!(
                ledger_match_id = request.ledger_match_id,
                winner = %request.winner,
                gas_limit = request.gas_limit,
                "Dry-run settlement 0x{}",
                tx_hash
            );

            Ok(TxReceipt {
                tx_hash,
                block_number: self.next_block.fetch_add(1, Ordering::SeqCst),
                gas_used: request.gas_limit / 2,
            })
        }
        .boxed()
    }

    fn subscribe_disputes(&self) -> broadcast::Receiver<DisputeNotice> {
        self.disputes.subscribe()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u64) -> SubmitRequest {
        SubmitRequest {
            ledger_match_id: id,
            winner: "p1".into(),
            digest: [3u8; 32],
            gas_limit: 300_000,
        }
    }

    #[tokio::test]
    async fn test_dry_run_receipt_is_stable() {
        let a = DryRunLedger::new().submit_result(request(1)).await.unwrap();
        let b = DryRunLedger::new().submit_result(request(1)).await.unwrap();
        let c = DryRunLedger::new().submit_result(request(2)).await.unwrap();

        assert_eq!(a.tx_hash, b.tx_hash);
        assert_ne!(a.tx_hash, c.tx_hash);
        assert_eq!(a.tx_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_fail_first() {
        let ledger = DryRunLedger::new().fail_first(2);

        assert_eq!(ledger.submit_result(request(1)).await, Err(LedgerError::Timeout));
        assert_eq!(ledger.submit_result(request(1)).await, Err(LedgerError::Timeout));
        assert!(ledger.submit_result(request(1)).await.is_ok());
        assert_eq!(ledger.submissions().len(), 3);
    }

    #[tokio::test]
    async fn test_dispute_reaches_subscribers() {
        let ledger = DryRunLedger::new();
        assert_eq!(ledger.raise_dispute(1, "0xabc", "no listeners"), 0);

        let mut rx = ledger.subscribe_disputes();
        assert_eq!(ledger.raise_dispute(9, "0xabc", "bad digest"), 1);

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.ledger_match_id, 9);
        assert_eq!(notice.reason, "bad digest");
    }
}
