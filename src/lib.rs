//! # Bitarena Match Server
//!
//! Authoritative real-time match simulation for Bitarena, with ledger
//! settlement of finished matches.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BITARENA SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── vec2.rs     - 2D vector algebra                         │
//! │  ├── collision.rs- AABB/circle tests, sweeps, bounce         │
//! │  ├── rng.rs      - Seeded LCG, match seed derivation         │
//! │  ├── quadtree.rs - Radius queries over a bounded region      │
//! │  ├── pool.rs     - Fixed-capacity object pool                │
//! │  └── hash.rs     - Canonical outcome digest                  │
//! │                                                              │
//! │  game/           - Simulation engines (deterministic)        │
//! │  ├── engine.rs   - Engine contract and dispatch              │
//! │  ├── projectile.rs - Projectile duel                         │
//! │  ├── territory.rs  - Gravity painters                        │
//! │  └── events.rs   - Gameplay events                           │
//! │                                                              │
//! │  server/         - Scheduling (non-deterministic)            │
//! │  ├── scheduler.rs  - Match table and lifecycle               │
//! │  ├── game_server.rs- Tick loop, task wiring                  │
//! │  └── broadcast.rs  - Snapshot egress                         │
//! │                                                              │
//! │  settlement/     - Ledger submission, retry, disputes        │
//! │  storage/        - Match records and event log               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules are deterministic:
//! - No HashMap (BTreeMap for sorted iteration)
//! - No system time; every timer counts ticks
//! - All randomness from the per-match seeded LCG
//!
//! Given the same seed and input sequence an engine produces bit-identical
//! snapshots on the same platform.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod server;
pub mod settlement;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig};
pub use game::{Engine, GameType, MatchId, PlayerId, PlayerInput, Snapshot, WinReason, WinResult};
pub use server::{GameServer, MatchScheduler};
pub use settlement::{Settlement, SettlementError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
