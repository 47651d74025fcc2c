//! Core deterministic primitives.
//!
//! Vector math, collision shapes, the seeded RNG, spatial partitioning,
//! pooling, and hashing. Nothing here reads the clock or global state.

pub mod vec2;
pub mod collision;
pub mod rng;
pub mod quadtree;
pub mod pool;
pub mod hash;

// Re-export core types
pub use vec2::Vec2;
pub use collision::{Aabb, Circle};
pub use rng::SeededRng;
pub use quadtree::Quadtree;
pub use pool::{Pool, PoolHandle};
pub use hash::outcome_digest;
