//! Game Events
//!
//! Events generated during simulation. Engines buffer them per tick; the
//! scheduler drains the buffer into the append-only event log so a disputed
//! match can be replayed in order.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::projectile::PowerUpKind;
use crate::game::PlayerId;

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEventData {
    /// A projectile reduced a player to zero health
    Kill {
        victim: PlayerId,
        killer: PlayerId,
        killer_score: u32,
    },

    /// Dead player returned at a fresh position
    Respawn {
        player: PlayerId,
        position: Vec2,
    },

    /// Shield charge absorbed a hit
    ShieldAbsorbed {
        player: PlayerId,
        charges_left: u32,
    },

    /// Power-up appeared in the arena
    PowerUpSpawned {
        power_up_id: u32,
        kind: PowerUpKind,
        position: Vec2,
    },

    /// Player picked up a power-up
    PowerUpCollected {
        power_up_id: u32,
        kind: PowerUpKind,
        player: PlayerId,
    },

    /// Unclaimed power-up timed out
    PowerUpExpired {
        power_up_id: u32,
    },

    /// Projectile struck an obstacle
    ObstacleHit {
        obstacle_id: String,
        projectile_id: u32,
        health: i32,
        bounce_velocity: Vec2,
    },

    /// Destructible obstacle reached zero health
    ObstacleDestroyed {
        obstacle_id: String,
    },

    /// Well emitted a radial burst
    Pulse {
        player: PlayerId,
        particles: u32,
    },
}

/// A game event with the tick it happened on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u32,

    /// Event data
    #[serde(flatten)]
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u32, data: GameEventData) -> Self {
        Self { tick, data }
    }

    /// Event-log type tag.
    pub fn event_type(&self) -> &'static str {
        match self.data {
            GameEventData::Kill { .. } => "kill",
            GameEventData::Respawn { .. } => "respawn",
            GameEventData::ShieldAbsorbed { .. } => "shield_absorbed",
            GameEventData::PowerUpSpawned { .. } => "power_up_spawned",
            GameEventData::PowerUpCollected { .. } => "power_up_collected",
            GameEventData::PowerUpExpired { .. } => "power_up_expired",
            GameEventData::ObstacleHit { .. } => "obstacle_hit",
            GameEventData::ObstacleDestroyed { .. } => "obstacle_destroyed",
            GameEventData::Pulse { .. } => "pulse",
        }
    }

    /// Player the event is about, if any.
    pub fn player(&self) -> Option<&PlayerId> {
        match &self.data {
            GameEventData::Kill { victim, .. } => Some(victim),
            GameEventData::Respawn { player, .. }
            | GameEventData::ShieldAbsorbed { player, .. }
            | GameEventData::PowerUpCollected { player, .. }
            | GameEventData::Pulse { player, .. } => Some(player),
            _ => None,
        }
    }

    /// Create kill event.
    pub fn kill(tick: u32, victim: PlayerId, killer: PlayerId, killer_score: u32) -> Self {
        Self::new(tick, GameEventData::Kill { victim, killer, killer_score })
    }

    /// Create respawn event.
    pub fn respawn(tick: u32, player: PlayerId, position: Vec2) -> Self {
        Self::new(tick, GameEventData::Respawn { player, position })
    }

    /// Create pulse event.
    pub fn pulse(tick: u32, player: PlayerId, particles: u32) -> Self {
        Self::new(tick, GameEventData::Pulse { player, particles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_tags() {
        let kill = GameEvent::kill(10, "a".into(), "b".into(), 1);
        assert_eq!(kill.event_type(), "kill");
        assert_eq!(kill.player().map(String::as_str), Some("a"));

        let pulse = GameEvent::pulse(1800, "a".into(), 100);
        assert_eq!(pulse.event_type(), "pulse");
    }

    #[test]
    fn test_event_json_shape() {
        let event = GameEvent::new(5, GameEventData::ObstacleDestroyed {
            obstacle_id: "obstacle_left".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["tick"], 5);
        assert_eq!(json["type"], "obstacle_destroyed");
        assert_eq!(json["obstacle_id"], "obstacle_left");
    }
}
