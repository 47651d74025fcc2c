//! Settlement
//!
//! Turns finished matches into ledger transactions. The scheduler hands
//! outcomes over a channel; `run` settles them in the background with
//! bounded retry, and `monitor_disputes` stores replay data for any result
//! the ledger reports as challenged.

pub mod ledger;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::core::hash::{outcome_digest, OutcomeHash};
use crate::game::{MatchId, PlayerId, Snapshot, WinReason};
use crate::storage::{
    EventLog, MatchStore, ReplayData, SettlementRecord, SettlementStatus, StorageError,
};

pub use ledger::{DisputeNotice, DryRunLedger, Ledger, LedgerError, SubmitRequest, TxReceipt};

/// Settlement errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    /// Every attempt failed.
    #[error("Settlement failed after {attempts} attempts: {last_error}")]
    SettlementFailure {
        /// Attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: LedgerError,
    },

    /// No ledger id registered for the match.
    #[error("No ledger match id for {0}")]
    MissingLedgerId(MatchId),

    /// Dispute for a ledger id we never settled.
    #[error("Unknown ledger match id {0}")]
    UnknownLedgerMatch(u64),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Final state could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Retry and shutdown tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each retry.
    pub backoff_base: Duration,
    /// Gas allowance of the first attempt.
    pub base_gas: u64,
    /// Extra gas per further attempt.
    pub gas_step: u64,
    /// How long in-flight settlements may run after shutdown.
    pub shutdown_grace: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            base_gas: 300_000,
            gas_step: 50_000,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl SettlementConfig {
    /// Gas allowance for a zero-based attempt.
    pub fn gas_for_attempt(&self, attempt: u32) -> u64 {
        self.base_gas
            .saturating_add(self.gas_step.saturating_mul(attempt as u64))
    }

    /// Wait after a failed zero-based attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Finished match handed from the scheduler.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub match_id: MatchId,
    pub winner: PlayerId,
    pub reason: WinReason,
    pub final_state: Snapshot,
}

/// Successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub receipt: TxReceipt,
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

/// Ledger submission with retry, plus dispute handling.
pub struct Settlement {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn MatchStore>,
    log: Arc<dyn EventLog>,
    config: SettlementConfig,
}

impl Settlement {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn MatchStore>,
        log: Arc<dyn EventLog>,
        config: SettlementConfig,
    ) -> Self {
        Self { ledger, store, log, config }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Digest the outcome, resolve the ledger id and submit.
    ///
    /// The settlement record is written either way; storage failures there
    /// are logged, not returned.
    #[instrument(skip(self, final_state))]
    pub async fn submit_result(
        &self,
        match_id: &str,
        winner: &str,
        final_state: &Snapshot,
    ) -> Result<Settled, SettlementError> {
        let digest = outcome_digest(match_id, winner, final_state)?;
        let ledger_match_id = self
            .store
            .ledger_match_id(match_id.to_string())
            .await?
            .ok_or_else(|| SettlementError::MissingLedgerId(match_id.to_string()))?;

        debug!("Outcome digest {}", hex::encode(digest));

        let result = self.submit_with_retry(ledger_match_id, winner, digest).await;

        let (status, attempts, tx_hash) = match &result {
            Ok(settled) => (
                SettlementStatus::Confirmed,
                settled.attempts,
                Some(settled.receipt.tx_hash.clone()),
            ),
            Err(SettlementError::SettlementFailure { attempts, .. }) => {
                (SettlementStatus::Failed, *attempts, None)
            }
            Err(_) => (SettlementStatus::Failed, 0, None),
        };

        let record = SettlementRecord {
            match_id: match_id.to_string(),
            ledger_match_id,
            winner: winner.to_string(),
            digest,
            attempts,
            status,
            tx_hash,
            updated_at: Utc::now(),
        };
        if let Err(e) = self.store.save_settlement(record).await {
            error!("Failed to save settlement record: {}", e);
        }

        result
    }

    /// Submit until confirmed or `max_retries` retries are spent.
    ///
    /// Attempt `n` (zero-based) carries `base_gas + n * gas_step`; after a
    /// failed attempt `n` the next one waits `backoff_base * 2^n`.
    pub async fn submit_with_retry(
        &self,
        ledger_match_id: u64,
        winner: &str,
        digest: OutcomeHash,
    ) -> Result<Settled, SettlementError> {
        let mut attempt = 0;
        loop {
            let request = SubmitRequest {
                ledger_match_id,
                winner: winner.to_string(),
                digest,
                gas_limit: self.config.gas_for_attempt(attempt),
            };

            match self.ledger.submit_result(request).await {
                Ok(receipt) => {
                    info!(
                        ledger_match_id,
                        attempts = attempt + 1,
                        "Settlement confirmed: 0x{}",
                        receipt.tx_hash
                    );
                    return Ok(Settled { receipt, attempts: attempt + 1 });
                }
                Err(e) if attempt >= self.config.max_retries => {
                    error!(ledger_match_id, "Settlement giving up: {}", e);
                    return Err(SettlementError::SettlementFailure {
                        attempts: attempt + 1,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.config.backoff_after(attempt);
                    warn!(
                        ledger_match_id,
                        attempt = attempt + 1,
                        "Settlement attempt failed: {}, retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Subscribe to ledger disputes. Call before spawning `monitor_disputes`
    /// so no notice is missed.
    pub fn subscribe_disputes(&self) -> broadcast::Receiver<DisputeNotice> {
        self.ledger.subscribe_disputes()
    }

    /// Settle outcomes as they arrive until shutdown or the channel closes.
    ///
    /// On shutdown the channel is closed and anything already queued is
    /// still submitted. In-flight settlements get `shutdown_grace` to
    /// finish; whatever is still running then is aborted and reported per
    /// match.
    pub async fn run(
        self: Arc<Self>,
        mut outcomes: mpsc::UnboundedReceiver<MatchOutcome>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut tasks: JoinSet<MatchId> = JoinSet::new();
        let mut in_flight: BTreeSet<MatchId> = BTreeSet::new();

        loop {
            tokio::select! {
                biased;

                outcome = outcomes.recv() => {
                    let Some(outcome) = outcome else { break };
                    self.spawn_settlement(outcome, &mut tasks, &mut in_flight);
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::finish_task(joined, &mut in_flight);
                }
                _ = shutdown.recv() => {
                    info!("Settlement worker shutting down");
                    outcomes.close();
                    while let Ok(outcome) = outcomes.try_recv() {
                        self.spawn_settlement(outcome, &mut tasks, &mut in_flight);
                    }
                    break;
                }
            }
        }

        if tasks.is_empty() {
            return;
        }

        info!("Waiting up to {:?} for {} settlements", self.config.shutdown_grace, tasks.len());
        let drained = tokio::time::timeout(self.config.shutdown_grace, async {
            while let Some(joined) = tasks.join_next().await {
                Self::finish_task(joined, &mut in_flight);
            }
        })
        .await;

        if drained.is_err() {
            tasks.abort_all();
            for match_id in &in_flight {
                error!(match_id = %match_id, "Settlement abandoned at shutdown");
            }
        }
    }

    fn spawn_settlement(
        self: &Arc<Self>,
        outcome: MatchOutcome,
        tasks: &mut JoinSet<MatchId>,
        in_flight: &mut BTreeSet<MatchId>,
    ) {
        in_flight.insert(outcome.match_id.clone());
        let settlement = self.clone();
        tasks.spawn(async move {
            if let Err(e) = settlement
                .submit_result(&outcome.match_id, &outcome.winner, &outcome.final_state)
                .await
            {
                error!(match_id = %outcome.match_id, "Settlement failed: {}", e);
            }
            outcome.match_id
        });
    }

    fn finish_task(
        joined: Result<MatchId, tokio::task::JoinError>,
        in_flight: &mut BTreeSet<MatchId>,
    ) {
        match joined {
            Ok(match_id) => {
                in_flight.remove(&match_id);
            }
            Err(e) => error!("Settlement task failed: {}", e),
        }
    }

    /// Handle dispute notices until shutdown or the ledger stream closes.
    pub async fn monitor_disputes(
        self: Arc<Self>,
        mut disputes: broadcast::Receiver<DisputeNotice>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                notice = disputes.recv() => match notice {
                    Ok(notice) => {
                        if let Err(e) = self.handle_dispute(notice).await {
                            error!("Dispute handling failed: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Dispute monitor lagged, {} notices dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Build and store the replay for a disputed match.
    #[instrument(skip(self, notice), fields(ledger_match_id = notice.ledger_match_id))]
    pub async fn handle_dispute(&self, notice: DisputeNotice) -> Result<MatchId, SettlementError> {
        let match_id = self
            .store
            .match_for_ledger_id(notice.ledger_match_id)
            .await?
            .ok_or(SettlementError::UnknownLedgerMatch(notice.ledger_match_id))?;

        let events = self.log.events_for(match_id.clone()).await?;
        let replay = ReplayData::from_events(events);
        let event_count = replay.metadata.event_count;
        self.store.store_replay(match_id.clone(), replay).await?;

        warn!(
            match_id = %match_id,
            challenger = %notice.challenger,
            event_count,
            "Match disputed: {}",
            notice.reason
        );
        Ok(match_id)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Engine, GameType};
    use crate::storage::{InMemoryStore, LogEntry};
    use futures_util::future::{BoxFuture, FutureExt};
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::Instant;

    /// Fails every submission and records when each one arrived.
    struct DownLedger {
        calls: Mutex<Vec<(Instant, u64)>>,
        disputes: broadcast::Sender<DisputeNotice>,
    }

    impl DownLedger {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                disputes: broadcast::channel(4).0,
            }
        }
    }

    impl Ledger for DownLedger {
        fn submit_result(&self, request: SubmitRequest) -> BoxFuture<'_, Result<TxReceipt, LedgerError>> {
            async move {
                self.calls.lock().push((Instant::now(), request.gas_limit));
                Err(LedgerError::Unavailable("node down".into()))
            }
            .boxed()
        }

        fn subscribe_disputes(&self) -> broadcast::Receiver<DisputeNotice> {
            self.disputes.subscribe()
        }
    }

    fn final_state() -> Snapshot {
        let players = vec!["p1".to_string(), "p2".to_string()];
        Engine::new(GameType::ProjectileDuel, 42, &players).get_state()
    }

    fn settlement_with(ledger: Arc<dyn Ledger>, store: Arc<InMemoryStore>) -> Settlement {
        Settlement::new(ledger, store.clone(), store, SettlementConfig::default())
    }

    #[test]
    fn test_gas_and_backoff_schedule() {
        let config = SettlementConfig::default();
        assert_eq!(config.gas_for_attempt(0), 300_000);
        assert_eq!(config.gas_for_attempt(2), 400_000);
        assert_eq!(config.backoff_after(0), Duration::from_secs(1));
        assert_eq!(config.backoff_after(1), Duration::from_secs(2));
        assert_eq!(config.backoff_after(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_and_delays() {
        let ledger = Arc::new(DownLedger::new());
        let settlement = settlement_with(ledger.clone(), Arc::new(InMemoryStore::new()));

        let result = settlement.submit_with_retry(7, "p1", [1u8; 32]).await;

        match result {
            Err(SettlementError::SettlementFailure { attempts, last_error }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, LedgerError::Unavailable("node down".into()));
            }
            other => panic!("expected SettlementFailure, got {:?}", other),
        }

        let calls = ledger.calls.lock().clone();
        assert_eq!(calls.len(), 4);

        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].0 - w[0].0).collect();
        assert_eq!(
            gaps,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );

        let gas: Vec<u64> = calls.iter().map(|c| c.1).collect();
        assert_eq!(gas, vec![300_000, 350_000, 400_000, 450_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_confirmed() {
        let ledger = Arc::new(DryRunLedger::new().fail_first(2));
        let store = Arc::new(InMemoryStore::new());
        store.register_ledger_match("m1", 7);
        let settlement = settlement_with(ledger.clone(), store.clone());

        let settled = settlement.submit_result("m1", "p1", &final_state()).await.unwrap();
        assert_eq!(settled.attempts, 3);

        let record = store.settlement("m1").unwrap();
        assert_eq!(record.status, SettlementStatus::Confirmed);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.tx_hash, Some(settled.receipt.tx_hash));
        assert_eq!(record.digest, outcome_digest("m1", "p1", &final_state()).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_records_failure() {
        let store = Arc::new(InMemoryStore::new());
        store.register_ledger_match("m1", 7);
        let settlement = settlement_with(Arc::new(DownLedger::new()), store.clone());

        let result = settlement.submit_result("m1", "p1", &final_state()).await;
        assert!(matches!(result, Err(SettlementError::SettlementFailure { .. })));

        let record = store.settlement("m1").unwrap();
        assert_eq!(record.status, SettlementStatus::Failed);
        assert_eq!(record.attempts, 4);
    }

    #[tokio::test]
    async fn test_missing_ledger_id() {
        let ledger = Arc::new(DryRunLedger::new());
        let settlement = settlement_with(ledger.clone(), Arc::new(InMemoryStore::new()));

        let result = settlement.submit_result("m1", "p1", &final_state()).await;
        assert!(matches!(result, Err(SettlementError::MissingLedgerId(id)) if id == "m1"));
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_dispute_stores_replay() {
        let ledger = Arc::new(DryRunLedger::new());
        let store = Arc::new(InMemoryStore::new());
        store.register_ledger_match("m1", 7);
        for (tick, kind) in [(0, "match_start"), (12, "kill"), (40, "match_end")] {
            store.append(LogEntry::now("m1", tick, kind, json!({}))).await.unwrap();
        }
        let settlement = Arc::new(settlement_with(ledger.clone(), store.clone()));
        settlement.submit_result("m1", "p1", &final_state()).await.unwrap();

        let (shutdown_tx, _) = broadcast::channel(1);
        let monitor = tokio::spawn(
            settlement.clone().monitor_disputes(settlement.subscribe_disputes(), shutdown_tx.subscribe()),
        );

        assert_eq!(ledger.raise_dispute(7, "0xchallenger", "digest mismatch"), 1);

        // Give the monitor a chance to run
        for _ in 0..100 {
            if store.is_disputed("m1") {
                break;
            }
            tokio::task::yield_now().await;
        }

        let replay = store.replay("m1").expect("replay stored");
        assert_eq!(replay.metadata.event_count, 3);
        let kinds: Vec<&str> = replay.events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["match_start", "kill", "match_end"]);
        assert_eq!(store.settlement("m1").unwrap().status, SettlementStatus::Disputed);

        let _ = shutdown_tx.send(());
        monitor.await.unwrap();
    }

    #[tokio::test]
    async fn test_dispute_for_unknown_ledger_id() {
        let store = Arc::new(InMemoryStore::new());
        let settlement = settlement_with(Arc::new(DryRunLedger::new()), store);

        let notice = DisputeNotice {
            ledger_match_id: 99,
            challenger: "0x1".into(),
            reason: "?".into(),
        };
        assert!(matches!(
            settlement.handle_dispute(notice).await,
            Err(SettlementError::UnknownLedgerMatch(99))
        ));
    }

    #[tokio::test]
    async fn test_worker_settles_outcomes() {
        let ledger = Arc::new(DryRunLedger::new());
        let store = Arc::new(InMemoryStore::new());
        store.register_ledger_match("m1", 1);
        store.register_ledger_match("m2", 2);
        let settlement = Arc::new(settlement_with(ledger.clone(), store.clone()));

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let worker = tokio::spawn(settlement.run(rx, shutdown_tx.subscribe()));

        for id in ["m1", "m2"] {
            tx.send(MatchOutcome {
                match_id: id.into(),
                winner: "p1".into(),
                reason: WinReason::Score,
                final_state: final_state(),
            })
            .unwrap();
        }
        // Closing the channel ends the worker once both are settled
        drop(tx);
        worker.await.unwrap();

        assert_eq!(store.settlement("m1").unwrap().status, SettlementStatus::Confirmed);
        assert_eq!(store.settlement("m2").unwrap().status, SettlementStatus::Confirmed);
        assert_eq!(ledger.submissions().len(), 2);
    }

    #[tokio::test]
    async fn test_worker_settles_queued_outcomes_on_shutdown() {
        let ledger = Arc::new(DryRunLedger::new());
        let store = Arc::new(InMemoryStore::new());
        store.register_ledger_match("m1", 1);
        store.register_ledger_match("m2", 2);
        let settlement = Arc::new(settlement_with(ledger.clone(), store.clone()));

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        for id in ["m1", "m2"] {
            tx.send(MatchOutcome {
                match_id: id.into(),
                winner: "p1".into(),
                reason: WinReason::Score,
                final_state: final_state(),
            })
            .unwrap();
        }
        shutdown_tx.send(()).unwrap();

        settlement.run(rx, shutdown_rx).await;

        assert_eq!(store.settlement("m1").unwrap().status, SettlementStatus::Confirmed);
        assert_eq!(store.settlement("m2").unwrap().status, SettlementStatus::Confirmed);
        assert_eq!(ledger.submissions().len(), 2);
        // Late outcomes are refused rather than queued forever
        assert!(tx
            .send(MatchOutcome {
                match_id: "m3".into(),
                winner: "p1".into(),
                reason: WinReason::Score,
                final_state: final_state(),
            })
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_abandons_after_grace() {
        let store = Arc::new(InMemoryStore::new());
        store.register_ledger_match("m1", 1);
        let config = SettlementConfig {
            max_retries: 10,
            shutdown_grace: Duration::from_secs(2),
            ..SettlementConfig::default()
        };
        let ledger = Arc::new(DownLedger::new());
        let settlement = Arc::new(Settlement::new(ledger.clone(), store.clone(), store.clone(), config));

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let worker = tokio::spawn(settlement.run(rx, shutdown_tx.subscribe()));

        tx.send(MatchOutcome {
            match_id: "m1".into(),
            winner: "p1".into(),
            reason: WinReason::Forced,
            final_state: final_state(),
        })
        .unwrap();
        while ledger.calls.lock().is_empty() {
            tokio::task::yield_now().await;
        }
        let _ = shutdown_tx.send(());

        let started = Instant::now();
        worker.await.unwrap();

        // Aborted at the grace deadline, long before retries run out
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert!(store.settlement("m1").is_none());
    }
}
