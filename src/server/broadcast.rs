//! Snapshot broadcast to spectators and players.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;

use crate::game::{MatchId, Snapshot};

/// One post-tick state message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBroadcast {
    /// Transport room, `match:<id>`
    pub room: String,
    pub match_id: MatchId,
    pub state: Snapshot,
    pub timestamp: DateTime<Utc>,
}

impl StateBroadcast {
    pub fn new(match_id: &str, state: Snapshot) -> Self {
        Self {
            room: room_for(match_id),
            match_id: match_id.to_string(),
            state,
            timestamp: Utc::now(),
        }
    }
}

/// Room name for a match.
pub fn room_for(match_id: &str) -> String {
    format!("match:{}", match_id)
}

/// Real-time transport. Fire-and-forget; delivery failures are the
/// transport's problem.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, message: StateBroadcast);
}

/// Broadcaster over a tokio broadcast channel.
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<StateBroadcast>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateBroadcast> {
        self.tx.subscribe()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, message: StateBroadcast) {
        // No subscribers is fine
        let _ = self.tx.send(message);
    }
}

/// Drops everything.
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn publish(&self, _message: StateBroadcast) {}
}
