//! Game Server
//!
//! Owns the scheduler and the settlement side and drives both. The tick
//! loop runs on a monotonic `tokio::time::interval`; when a tick overruns
//! its period, missed ticks are skipped rather than replayed in a burst, so
//! simulated time falls behind wall time instead of speeding up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::game::{MatchId, PlayerId, PlayerInput};
use crate::server::broadcast::Broadcaster;
use crate::server::scheduler::{MatchScheduler, SchedulerError};
use crate::settlement::{Ledger, MatchOutcome, Settlement};
use crate::storage::{EventLog, MatchStore};

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// `run` was called twice.
    #[error("Server already running")]
    AlreadyRunning,

    /// Scheduler rejected the request.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// External collaborators, injected at construction.
pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub store: Arc<dyn MatchStore>,
    pub log: Arc<dyn EventLog>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Live matches.
    scheduler: Arc<RwLock<MatchScheduler>>,
    /// Ledger submission and disputes.
    settlement: Arc<Settlement>,
    /// Outcome stream, taken by the settlement worker on `run`.
    outcomes: Mutex<Option<mpsc::UnboundedReceiver<MatchOutcome>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, collaborators: Collaborators) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let Collaborators { ledger, store, log, broadcaster } = collaborators;
        let settlement = Settlement::new(ledger, store.clone(), log.clone(), config.settlement.clone());
        let scheduler = MatchScheduler::new(store, log, broadcaster, outcome_tx, config.match_grace);

        Self {
            config,
            scheduler: Arc::new(RwLock::new(scheduler)),
            settlement: Arc::new(settlement),
            outcomes: Mutex::new(Some(outcome_rx)),
            shutdown_tx,
        }
    }

    /// Run the tick loop and background tasks until `shutdown`.
    ///
    /// Returns after the settlement worker has finished or abandoned its
    /// in-flight submissions.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let outcomes = self.outcomes.lock().take().ok_or(GameServerError::AlreadyRunning)?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // Spawn settlement worker
        let settlement_handle = tokio::spawn(
            self.settlement.clone().run(outcomes, self.shutdown_tx.subscribe()),
        );

        // Spawn dispute monitor
        let disputes = self.settlement.subscribe_disputes();
        let dispute_handle = tokio::spawn(
            self.settlement.clone().monitor_disputes(disputes, self.shutdown_tx.subscribe()),
        );

        let period = self.config.tick_period();
        let mut tick_interval = interval(period);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Tick loop running at {} Hz", self.config.tick_rate);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let started = Instant::now();
                    self.scheduler.write().await.tick().await;
                    let elapsed = started.elapsed();
                    if elapsed > period {
                        warn!(?elapsed, ?period, "Tick overran its period");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Err(e) = settlement_handle.await {
            error!("Settlement worker failed: {}", e);
        }
        dispute_handle.abort();

        info!("Game server stopped");
        Ok(())
    }

    /// Start a match.
    pub async fn create_match(
        &self,
        match_id: &str,
        game_type: &str,
        participants: Vec<PlayerId>,
        seed: Option<u64>,
    ) -> Result<(), GameServerError> {
        self.scheduler
            .write()
            .await
            .create_match(match_id, game_type, participants, seed)
            .await?;
        Ok(())
    }

    /// Queue player input. Returns whether it was accepted.
    pub async fn submit_input(&self, match_id: &str, player: &str, input: PlayerInput) -> bool {
        self.scheduler
            .write()
            .await
            .handle_player_input(match_id, player, input)
            .await
    }

    /// End a match administratively.
    pub async fn force_end_match(&self, match_id: &str, winner: &str) -> Result<(), GameServerError> {
        self.scheduler.write().await.force_end_match(match_id, winner).await?;
        Ok(())
    }

    /// Ids of matches still running.
    pub async fn active_matches(&self) -> Vec<MatchId> {
        self.scheduler.read().await.active_matches()
    }

    /// Matches held, including ended ones in their grace period.
    pub async fn match_count(&self) -> usize {
        self.scheduler.read().await.match_count()
    }

    /// Shared handle to the scheduler for queries.
    pub fn scheduler(&self) -> Arc<RwLock<MatchScheduler>> {
        self.scheduler.clone()
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Configured shutdown grace for settlements.
    pub fn settlement_grace(&self) -> Duration {
        self.config.settlement.shutdown_grace
    }
}

// =============================================================================
// TESTS
// =============================================================================
