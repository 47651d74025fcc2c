//! In-process store
//!
//! Implements both storage traits over `parking_lot` locks. Used by the
//! demo binary and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;

use super::{
    CompletionRecord, EventLog, LogEntry, MatchStore, ReplayData, SettlementRecord,
    SettlementStatus, StorageError,
};
use crate::game::MatchId;

/// Everything stored for one match.
#[derive(Debug, Clone, Default)]
struct StoredMatch {
    ledger_match_id: Option<u64>,
    completion: Option<CompletionRecord>,
    settlement: Option<SettlementRecord>,
    replay: Option<ReplayData>,
    disputed: bool,
}

/// Map-backed `MatchStore` + `EventLog`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    matches: RwLock<BTreeMap<MatchId, StoredMatch>>,
    ledger_index: RwLock<BTreeMap<u64, MatchId>>,
    logs: RwLock<BTreeMap<MatchId, Vec<LogEntry>>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a match with its ledger-side id.
    pub fn register_ledger_match(&self, match_id: impl Into<MatchId>, ledger_match_id: u64) {
        let match_id = match_id.into();
        self.matches
            .write()
            .entry(match_id.clone())
            .or_default()
            .ledger_match_id = Some(ledger_match_id);
        self.ledger_index.write().insert(ledger_match_id, match_id);
    }

    /// Make every subsequent write fail with `Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn completion(&self, match_id: &str) -> Option<CompletionRecord> {
        self.matches.read().get(match_id).and_then(|m| m.completion.clone())
    }

    pub fn settlement(&self, match_id: &str) -> Option<SettlementRecord> {
        self.matches.read().get(match_id).and_then(|m| m.settlement.clone())
    }

    pub fn replay(&self, match_id: &str) -> Option<ReplayData> {
        self.matches.read().get(match_id).and_then(|m| m.replay.clone())
    }

    pub fn is_disputed(&self, match_id: &str) -> bool {
        self.matches.read().get(match_id).is_some_and(|m| m.disputed)
    }

    /// Snapshot of the log for a match.
    pub fn log(&self, match_id: &str) -> Vec<LogEntry> {
        self.logs.read().get(match_id).cloned().unwrap_or_default()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

impl MatchStore for InMemoryStore {
    fn record_completion(&self, record: CompletionRecord) -> BoxFuture<'_, Result<(), StorageError>> {
        async move {
            self.check_writable()?;
            let id = record.match_id.clone();
            self.matches.write().entry(id).or_default().completion = Some(record);
            Ok(())
        }
        .boxed()
    }

    fn ledger_match_id(&self, match_id: MatchId) -> BoxFuture<'_, Result<Option<u64>, StorageError>> {
        async move {
            Ok(self.matches.read().get(&match_id).and_then(|m| m.ledger_match_id))
        }
        .boxed()
    }

    fn match_for_ledger_id(&self, ledger_match_id: u64) -> BoxFuture<'_, Result<Option<MatchId>, StorageError>> {
        async move { Ok(self.ledger_index.read().get(&ledger_match_id).cloned()) }.boxed()
    }

    fn save_settlement(&self, mut record: SettlementRecord) -> BoxFuture<'_, Result<(), StorageError>> {
        async move {
            self.check_writable()?;
            let mut matches = self.matches.write();
            let stored = matches.entry(record.match_id.clone()).or_default();
            // Disputed is terminal
            if stored.disputed {
                record.status = SettlementStatus::Disputed;
            }
            stored.settlement = Some(record);
            Ok(())
        }
        .boxed()
    }

    fn store_replay(&self, match_id: MatchId, replay: ReplayData) -> BoxFuture<'_, Result<(), StorageError>> {
        async move {
            self.check_writable()?;
            let mut matches = self.matches.write();
            let stored = matches.get_mut(&match_id).ok_or_else(|| StorageError::NotFound(match_id.clone()))?;
            stored.replay = Some(replay);
            stored.disputed = true;
            if let Some(settlement) = stored.settlement.as_mut() {
                settlement.status = SettlementStatus::Disputed;
                settlement.updated_at = chrono::Utc::now();
            }
            Ok(())
        }
        .boxed()
    }
}

impl EventLog for InMemoryStore {
    fn append(&self, entry: LogEntry) -> BoxFuture<'_, Result<(), StorageError>> {
        async move {
            self.check_writable()?;
            self.logs.write().entry(entry.match_id.clone()).or_default().push(entry);
            Ok(())
        }
        .boxed()
    }

    fn events_for(&self, match_id: MatchId) -> BoxFuture<'_, Result<Vec<LogEntry>, StorageError>> {
        async move { Ok(self.logs.read().get(&match_id).cloned().unwrap_or_default()) }.boxed()
    }
}

// =============================================================================
// TESTS
// =============================================================================
