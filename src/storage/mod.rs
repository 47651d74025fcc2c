//! Storage Collaborators
//!
//! Interfaces to the relational store and the append-only event log. The
//! scheduler and settlement only see these traits; `memory` provides an
//! in-process implementation for local runs and tests.

pub mod memory;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Serialize, Deserialize};

use crate::game::{MatchId, PlayerId};

pub use memory::InMemoryStore;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Backend refused or failed the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// RECORDS
// =============================================================================

/// Persisted match lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Completed,
}

/// Written once when a match ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub winner: PlayerId,
    pub ended_at: DateTime<Utc>,
}

/// Final state of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Ledger accepted the result
    Confirmed,
    /// Retries exhausted. Settlements aborted at shutdown write no record
    /// and are reported in the error log instead.
    Failed,
    /// Result challenged; replay stored for review
    Disputed,
}

/// Outcome of submitting a match to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub match_id: MatchId,
    pub ledger_match_id: u64,
    pub winner: PlayerId,
    /// SHA-256 outcome digest
    pub digest: [u8; 32],
    /// Submission attempts made
    pub attempts: u32,
    pub status: SettlementStatus,
    /// Confirmed transaction hash, hex
    pub tx_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only event log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub match_id: MatchId,
    /// Engine tick the event belongs to
    pub tick: u32,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl LogEntry {
    /// Entry stamped with the current time.
    pub fn now(
        match_id: impl Into<MatchId>,
        tick: u32,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            match_id: match_id.into(),
            tick,
            timestamp: Utc::now(),
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Replay bundle stored when a result is disputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayData {
    /// Log entries in append order
    pub events: Vec<LogEntry>,
    pub metadata: ReplayMetadata,
}

/// Replay bundle header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMetadata {
    pub generated_at: DateTime<Utc>,
    pub event_count: usize,
}

impl ReplayData {
    /// Bundle an ordered event list.
    pub fn from_events(events: Vec<LogEntry>) -> Self {
        let event_count = events.len();
        Self {
            events,
            metadata: ReplayMetadata {
                generated_at: Utc::now(),
                event_count,
            },
        }
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// Match records: completion, ledger id mapping, settlement, disputes.
pub trait MatchStore: Send + Sync {
    /// Mark a match completed with its winner.
    fn record_completion(&self, record: CompletionRecord) -> BoxFuture<'_, Result<(), StorageError>>;

    /// Ledger-side id for a match, if one was registered.
    fn ledger_match_id(&self, match_id: MatchId) -> BoxFuture<'_, Result<Option<u64>, StorageError>>;

    /// Reverse lookup from a ledger id.
    fn match_for_ledger_id(&self, ledger_match_id: u64) -> BoxFuture<'_, Result<Option<MatchId>, StorageError>>;

    /// Upsert the settlement record for a match.
    fn save_settlement(&self, record: SettlementRecord) -> BoxFuture<'_, Result<(), StorageError>>;

    /// Persist replay data and flag the match disputed.
    fn store_replay(&self, match_id: MatchId, replay: ReplayData) -> BoxFuture<'_, Result<(), StorageError>>;
}

/// Append-only per-match event log.
pub trait EventLog: Send + Sync {
    /// Append one entry.
    fn append(&self, entry: LogEntry) -> BoxFuture<'_, Result<(), StorageError>>;

    /// All entries for a match, in append order.
    fn events_for(&self, match_id: MatchId) -> BoxFuture<'_, Result<Vec<LogEntry>, StorageError>>;
}
