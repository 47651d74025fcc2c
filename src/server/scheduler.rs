//! Match Scheduler
//!
//! Owns every live match and advances them together, one tick at a time.
//! Inputs are queued per match and applied right before that match's next
//! update. Ended matches stay queryable for a grace period, then are
//! dropped along with their engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::rng::derive_match_seed;
use crate::game::engine::UnknownGameType;
use crate::game::{
    Engine, GameEvent, GameType, MatchId, PlayerId, PlayerInput, Snapshot, WinReason, WinResult,
    TICK_DT,
};
use crate::server::broadcast::{Broadcaster, StateBroadcast};
use crate::settlement::MatchOutcome;
use crate::storage::{CompletionRecord, EventLog, LogEntry, MatchStatus, MatchStore};

/// Scheduler errors. All are validation failures; nothing is mutated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// A match with this id already exists.
    #[error("Match {0} already exists")]
    DuplicateMatch(MatchId),

    /// Game type tag not recognized.
    #[error(transparent)]
    UnknownGameType(#[from] UnknownGameType),

    /// Match does not exist.
    #[error("Match {0} not found")]
    MatchNotFound(MatchId),

    /// Match already ended.
    #[error("Match {0} already ended")]
    MatchEnded(MatchId),

    /// Participant list rejected.
    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),

    /// Named winner is not in the match.
    #[error("{player} is not a participant of {match_id}")]
    NotParticipant {
        /// Match
        match_id: MatchId,
        /// Rejected player
        player: PlayerId,
    },
}

/// One scheduled match.
pub struct Match {
    id: MatchId,
    game_type: GameType,
    participants: Vec<PlayerId>,
    seed: u64,
    engine: Engine,
    /// Inputs received since the last tick, in arrival order
    pending: Vec<(PlayerId, PlayerInput)>,
    created_at: Instant,
    last_update: Instant,
    active: bool,
    ended_at: Option<Instant>,
    result: Option<WinResult>,
}

impl Match {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    /// Participants in seat order.
    pub fn participants(&self) -> &[PlayerId] {
        &self.participants
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Ticks simulated.
    pub fn tick(&self) -> u32 {
        self.engine.tick()
    }

    /// Winner and reason once ended.
    pub fn result(&self) -> Option<&WinResult> {
        self.result.as_ref()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn state(&self) -> Snapshot {
        self.engine.get_state()
    }

    fn has_participant(&self, player: &str) -> bool {
        self.participants.iter().any(|p| p == player)
    }
}

/// Fixed-rate driver for all live matches.
pub struct MatchScheduler {
    matches: BTreeMap<MatchId, Match>,
    store: Arc<dyn MatchStore>,
    log: Arc<dyn EventLog>,
    broadcaster: Arc<dyn Broadcaster>,
    outcomes: mpsc::UnboundedSender<MatchOutcome>,
    grace: Duration,
}

impl MatchScheduler {
    /// Create a scheduler. Finished matches are handed to `outcomes`.
    pub fn new(
        store: Arc<dyn MatchStore>,
        log: Arc<dyn EventLog>,
        broadcaster: Arc<dyn Broadcaster>,
        outcomes: mpsc::UnboundedSender<MatchOutcome>,
        grace: Duration,
    ) -> Self {
        Self {
            matches: BTreeMap::new(),
            store,
            log,
            broadcaster,
            outcomes,
            grace,
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Register and start a match. Without a seed one is derived from the
    /// id and participants.
    pub async fn create_match(
        &mut self,
        match_id: &str,
        game_type: &str,
        participants: Vec<PlayerId>,
        seed: Option<u64>,
    ) -> Result<(), SchedulerError> {
        let game_type = match self.validate_new_match(match_id, game_type, &participants) {
            Ok(game_type) => game_type,
            Err(e) => {
                warn!(match_id, "Rejected match: {}", e);
                return Err(e);
            }
        };

        let seed = seed.unwrap_or_else(|| derive_match_seed(match_id, &participants));
        let now = Instant::now();
        let engine = Engine::new(game_type, seed, &participants);

        self.matches.insert(
            match_id.to_string(),
            Match {
                id: match_id.to_string(),
                game_type,
                participants: participants.clone(),
                seed,
                engine,
                pending: Vec::new(),
                created_at: now,
                last_update: now,
                active: true,
                ended_at: None,
                result: None,
            },
        );

        self.append_log(LogEntry::now(
            match_id,
            0,
            "match_start",
            json!({
                "game_type": game_type.as_str(),
                "participants": participants,
                "seed": seed,
            }),
        ))
        .await;

        info!(match_id, %game_type, players = participants.len(), "Match created");
        Ok(())
    }

    fn validate_new_match(
        &self,
        match_id: &str,
        game_type: &str,
        participants: &[PlayerId],
    ) -> Result<GameType, SchedulerError> {
        if self.matches.contains_key(match_id) {
            return Err(SchedulerError::DuplicateMatch(match_id.to_string()));
        }

        let game_type: GameType = game_type.parse()?;

        let range = game_type.participant_range();
        if !range.contains(&participants.len()) {
            return Err(SchedulerError::InvalidParticipants(format!(
                "{} needs {}..={} players, got {}",
                game_type,
                range.start(),
                range.end(),
                participants.len()
            )));
        }
        for (i, player) in participants.iter().enumerate() {
            if player.is_empty() {
                return Err(SchedulerError::InvalidParticipants("empty player id".into()));
            }
            if participants[..i].contains(player) {
                return Err(SchedulerError::InvalidParticipants(format!(
                    "{} listed twice",
                    player
                )));
            }
        }

        Ok(game_type)
    }

    /// Queue input for the match's next tick. Returns whether it was
    /// accepted; rejections are logged and otherwise ignored.
    pub async fn handle_player_input(
        &mut self,
        match_id: &str,
        player: &str,
        input: PlayerInput,
    ) -> bool {
        let Some(m) = self.matches.get_mut(match_id) else {
            warn!(match_id, player, "Input for unknown match");
            return false;
        };
        if !m.active {
            warn!(match_id, player, "Input for ended match");
            return false;
        }
        if !m.has_participant(player) {
            warn!(match_id, player, "Input from non-participant");
            return false;
        }

        let payload = json!({ "player": player, "input": &input });
        let tick = m.engine.tick();
        m.pending.push((player.to_string(), input));

        self.append_log(LogEntry::now(match_id, tick, "player_input", payload)).await;
        true
    }

    /// Advance every active match by one tick.
    pub async fn tick(&mut self) {
        self.tick_at(Instant::now()).await;
    }

    /// `tick` with an explicit clock reading.
    pub async fn tick_at(&mut self, now: Instant) {
        #[cfg(feature = "debug-tracing")]
        let started = Instant::now();

        let active: Vec<MatchId> = self
            .matches
            .values()
            .filter(|m| m.active)
            .map(|m| m.id.clone())
            .collect();

        for match_id in &active {
            let Some(m) = self.matches.get_mut(match_id) else { continue };

            for (player, input) in m.pending.drain(..) {
                if let Err(e) = m.engine.handle_input(&player, input) {
                    warn!(match_id = %m.id, player = %player, "Dropped input: {}", e);
                }
            }

            m.engine.update(TICK_DT);
            m.last_update = now;

            let events = m.engine.take_events();
            let won = m.engine.check_win_condition();
            let state = m.engine.get_state();

            for event in events {
                self.append_log(game_event_entry(match_id, &event)).await;
            }

            if let Some(result) = won {
                self.finish(match_id, result, now).await;
            }

            self.broadcaster.publish(StateBroadcast::new(match_id, state));
        }

        self.purge_ended(now);

        #[cfg(feature = "debug-tracing")]
        debug!(matches = active.len(), elapsed = ?started.elapsed(), "Tick complete");
    }

    /// End a match with the given result.
    pub async fn end_match(
        &mut self,
        match_id: &str,
        winner: &str,
        reason: WinReason,
    ) -> Result<(), SchedulerError> {
        let m = self
            .matches
            .get(match_id)
            .ok_or_else(|| SchedulerError::MatchNotFound(match_id.to_string()))?;
        if !m.active {
            return Err(SchedulerError::MatchEnded(match_id.to_string()));
        }
        if !m.has_participant(winner) {
            return Err(SchedulerError::NotParticipant {
                match_id: match_id.to_string(),
                player: winner.to_string(),
            });
        }

        let result = WinResult { winner: winner.to_string(), reason };
        self.finish(match_id, result, Instant::now()).await;
        Ok(())
    }

    /// Administrative end with reason `forced`.
    pub async fn force_end_match(&mut self, match_id: &str, winner: &str) -> Result<(), SchedulerError> {
        let ended = self.end_match(match_id, winner, WinReason::Forced).await;
        if let Err(e) = &ended {
            warn!(match_id, "Force end rejected: {}", e);
        }
        ended
    }

    async fn finish(&mut self, match_id: &str, result: WinResult, now: Instant) {
        let Some(m) = self.matches.get_mut(match_id) else { return };
        if !m.active {
            return;
        }

        m.active = false;
        m.ended_at = Some(now);
        m.result = Some(result.clone());
        m.pending.clear();

        let tick = m.engine.tick();
        let duration = now.saturating_duration_since(m.created_at);
        let final_state = m.engine.get_state();

        info!(
            match_id,
            winner = %result.winner,
            reason = %result.reason,
            tick,
            "Match ended"
        );

        self.append_log(LogEntry::now(
            match_id,
            tick,
            "match_end",
            json!({
                "winner": &result.winner,
                "reason": result.reason,
                "duration_secs": duration.as_secs_f64(),
                "final_state": &final_state,
            }),
        ))
        .await;

        let record = CompletionRecord {
            match_id: match_id.to_string(),
            status: MatchStatus::Completed,
            winner: result.winner.clone(),
            ended_at: Utc::now(),
        };
        if let Err(e) = self.store.record_completion(record).await {
            error!(match_id, "Failed to persist completion: {}", e);
        }

        let outcome = MatchOutcome {
            match_id: match_id.to_string(),
            winner: result.winner,
            reason: result.reason,
            final_state,
        };
        if self.outcomes.send(outcome).is_err() {
            error!(match_id, "Settlement worker gone, outcome not submitted");
        }
    }

    fn purge_ended(&mut self, now: Instant) {
        let grace = self.grace;
        self.matches.retain(|id, m| {
            let expired = m
                .ended_at
                .is_some_and(|ended| now.saturating_duration_since(ended) >= grace);
            if expired {
                debug!(match_id = %id, "Match removed");
            }
            !expired
        });
    }

    async fn append_log(&self, entry: LogEntry) {
        if let Err(e) = self.log.append(entry).await {
            error!("Failed to append event log: {}", e);
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Look up a match, active or within its grace period.
    pub fn get_match(&self, match_id: &str) -> Option<&Match> {
        self.matches.get(match_id)
    }

    /// Ids of matches still being simulated.
    pub fn active_matches(&self) -> Vec<MatchId> {
        self.matches
            .values()
            .filter(|m| m.active)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Matches held, ended ones included.
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }
}

fn game_event_entry(match_id: &str, event: &GameEvent) -> LogEntry {
    let payload = match serde_json::to_value(event) {
        Ok(value) => value,
        Err(e) => {
            error!(match_id, "Failed to encode {} event: {}", event.event_type(), e);
            serde_json::Value::Null
        }
    };
    LogEntry::now(match_id, event.tick, event.event_type(), payload)
}

// =============================================================================
// TESTS
// =============================================================================
