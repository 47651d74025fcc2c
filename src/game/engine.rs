//! Simulation Engine Contract
//!
//! Every game type implements [`Simulation`]. The scheduler never talks to a
//! concrete engine directly; it holds an [`Engine`], a closed enum over the
//! variants, and dispatches exhaustively.
//!
//! ## Timing
//!
//! One `update` call is one tick. Timers (cooldowns, respawns, pulses, the
//! match clock) count ticks, never wall time. `dt` scales integration only
//! and the scheduler always passes [`TICK_DT`].

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::events::GameEvent;
use crate::game::projectile::{ProjectileEngine, ProjectileInput, ProjectileSnapshot};
use crate::game::territory::{Rgb, TerritoryEngine, TerritoryInput, TerritorySnapshot};
use crate::game::PlayerId;
use crate::TICK_RATE;

/// Fixed step length in seconds.
pub const TICK_DT: f32 = 1.0 / TICK_RATE as f32;

/// Convert whole seconds to ticks.
pub const fn secs_to_ticks(secs: u32) -> u32 {
    secs * TICK_RATE
}

/// Seconds left on a tick-counted match clock.
pub fn time_remaining(tick: u32, duration_ticks: u32) -> f32 {
    duration_ticks.saturating_sub(tick) as f32 / TICK_RATE as f32
}

// =============================================================================
// CONTRACT
// =============================================================================

/// Common per-tick contract shared by all game types.
pub trait Simulation: Sized {
    /// Per-player input accepted by this engine.
    type Input;
    /// Serializable view of the engine state.
    type Snapshot;

    /// Build an engine. `seed` and `participants` fully determine the
    /// state reached by any given input sequence.
    fn new(seed: u64, participants: &[PlayerId]) -> Self;

    /// Advance one tick.
    fn update(&mut self, dt: f32);

    /// Apply input from a participant. Unknown players are ignored.
    fn handle_input(&mut self, player: &str, input: Self::Input);

    /// Winner and reason, once the match is decided.
    fn check_win_condition(&self) -> Option<WinResult>;

    /// Snapshot of the current state.
    fn get_state(&self) -> Self::Snapshot;

    /// Drain events buffered since the last call.
    fn take_events(&mut self) -> Vec<GameEvent>;

    /// Ticks simulated so far.
    fn tick(&self) -> u32;
}

/// Why a match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    /// Reached the score threshold
    Score,
    /// Highest score at the time limit
    Time,
    /// Largest territory at the time limit
    Territory,
    /// Ended by an administrator
    Forced,
}

impl WinReason {
    /// Log/persistence tag.
    pub fn as_str(self) -> &'static str {
        match self {
            WinReason::Score => "score",
            WinReason::Time => "time",
            WinReason::Territory => "territory",
            WinReason::Forced => "forced",
        }
    }
}

impl fmt::Display for WinReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decided match result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinResult {
    /// Winning participant
    pub winner: PlayerId,
    /// Why they won
    pub reason: WinReason,
}

// =============================================================================
// GAME TYPES
// =============================================================================

/// Supported game types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GameType {
    /// Two-player projectile combat
    ProjectileDuel,
    /// Particle painting / territory control
    GravityPainters,
}

impl GameType {
    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            GameType::ProjectileDuel => "ProjectileDuel",
            GameType::GravityPainters => "GravityPainters",
        }
    }

    /// Allowed participant count, inclusive.
    pub fn participant_range(self) -> RangeInclusive<usize> {
        match self {
            GameType::ProjectileDuel => 2..=2,
            GameType::GravityPainters => 1..=Rgb::PALETTE.len(),
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Game type tag not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown game type: {0}")]
pub struct UnknownGameType(pub String);

impl FromStr for GameType {
    type Err = UnknownGameType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ProjectileDuel" | "projectile_duel" => Ok(GameType::ProjectileDuel),
            "GravityPainters" | "gravity_painters" => Ok(GameType::GravityPainters),
            other => Err(UnknownGameType(other.to_string())),
        }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Input routed to a match, tagged by game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum PlayerInput {
    /// Input for a projectile duel
    Projectile(ProjectileInput),
    /// Input for gravity painters
    Territory(TerritoryInput),
}

/// Snapshot of any engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum Snapshot {
    /// Projectile duel state
    Projectile(ProjectileSnapshot),
    /// Gravity painters state
    Territory(TerritorySnapshot),
}

/// Input variant did not match the engine it was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{got} input sent to a {expected} match")]
pub struct InputMismatch {
    /// Engine game type
    pub expected: GameType,
    /// Game the input was built for
    pub got: GameType,
}

/// A match's engine. Exactly one per match, never shared.
#[derive(Debug, Clone)]
pub enum Engine {
    /// Projectile combat
    Projectile(Box<ProjectileEngine>),
    /// Territory control
    Territory(Box<TerritoryEngine>),
}

impl Engine {
    /// Construct the engine variant for `game_type`.
    pub fn new(game_type: GameType, seed: u64, participants: &[PlayerId]) -> Self {
        match game_type {
            GameType::ProjectileDuel => {
                Engine::Projectile(Box::new(ProjectileEngine::new(seed, participants)))
            }
            GameType::GravityPainters => {
                Engine::Territory(Box::new(TerritoryEngine::new(seed, participants)))
            }
        }
    }

    /// Game type of this engine.
    pub fn game_type(&self) -> GameType {
        match self {
            Engine::Projectile(_) => GameType::ProjectileDuel,
            Engine::Territory(_) => GameType::GravityPainters,
        }
    }

    /// Advance one tick.
    pub fn update(&mut self, dt: f32) {
        match self {
            Engine::Projectile(e) => e.update(dt),
            Engine::Territory(e) => e.update(dt),
        }
    }

    /// Forward input to the engine. Fails if the input is for another game.
    pub fn handle_input(&mut self, player: &str, input: PlayerInput) -> Result<(), InputMismatch> {
        match (self, input) {
            (Engine::Projectile(e), PlayerInput::Projectile(input)) => {
                e.handle_input(player, input);
                Ok(())
            }
            (Engine::Territory(e), PlayerInput::Territory(input)) => {
                e.handle_input(player, input);
                Ok(())
            }
            (engine, input) => Err(InputMismatch {
                expected: engine.game_type(),
                got: match input {
                    PlayerInput::Projectile(_) => GameType::ProjectileDuel,
                    PlayerInput::Territory(_) => GameType::GravityPainters,
                },
            }),
        }
    }

    /// Winner and reason, once decided.
    pub fn check_win_condition(&self) -> Option<WinResult> {
        match self {
            Engine::Projectile(e) => e.check_win_condition(),
            Engine::Territory(e) => e.check_win_condition(),
        }
    }

    /// Snapshot of the current state.
    pub fn get_state(&self) -> Snapshot {
        match self {
            Engine::Projectile(e) => Snapshot::Projectile(e.get_state()),
            Engine::Territory(e) => Snapshot::Territory(e.get_state()),
        }
    }

    /// Drain buffered gameplay events.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        match self {
            Engine::Projectile(e) => e.take_events(),
            Engine::Territory(e) => e.take_events(),
        }
    }

    /// Ticks simulated so far.
    pub fn tick(&self) -> u32 {
        match self {
            Engine::Projectile(e) => e.tick(),
            Engine::Territory(e) => e.tick(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
