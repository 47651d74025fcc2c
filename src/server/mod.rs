//! Server Module
//!
//! Non-deterministic shell around the engines: match scheduling, the fixed
//! rate driver, and snapshot broadcast.
//!
//! ## Module Structure
//!
//! - `scheduler`: Live match table, input routing, match lifecycle
//! - `game_server`: Tick loop and background task wiring
//! - `broadcast`: Snapshot egress

pub mod broadcast;
pub mod game_server;
pub mod scheduler;

pub use broadcast::{Broadcaster, ChannelBroadcaster, NullBroadcaster, StateBroadcast};
pub use game_server::{Collaborators, GameServer, GameServerError};
pub use scheduler::{Match, MatchScheduler, SchedulerError};
