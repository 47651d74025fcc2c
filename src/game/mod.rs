//! Game Logic Module
//!
//! All match simulation code. Deterministic given a seed and input
//! sequence.
//!
//! ## Module Structure
//!
//! - `engine`: Simulation contract, game types, engine dispatch
//! - `projectile`: Projectile duel
//! - `territory`: Gravity painters (particles + territory)
//! - `events`: Gameplay events for the replay log

pub mod engine;
pub mod projectile;
pub mod territory;
pub mod events;

/// Participant identity (wallet address or account id).
pub type PlayerId = String;

/// Match identity assigned by the caller.
pub type MatchId = String;

// Re-export key types
pub use engine::{Engine, GameType, PlayerInput, Simulation, Snapshot, WinReason, WinResult, TICK_DT};
pub use events::{GameEvent, GameEventData};
pub use projectile::{ProjectileEngine, ProjectileInput};
pub use territory::{TerritoryEngine, TerritoryInput};
