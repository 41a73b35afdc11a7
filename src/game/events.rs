//! Game Events
//!
//! Events produced by a tick. They are informational: peers log them and
//! forward them to local observers, but the replicated document is the
//! source of truth.

use serde::{Serialize, Deserialize};

use crate::core::grid::Cell;
use crate::game::state::{GameOutcome, ItemKind, PeerId};

/// How a participant died.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationCause {
    /// Head left the board
    Wall,
    /// Head hit its own body
    SelfCollision,
    /// Head hit another living participant's body
    Collision { other: PeerId },
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Participant died this tick
    ParticipantEliminated {
        participant: PeerId,
        cause: EliminationCause,
        score: u32,
    },

    /// Participant ate an item
    ItemConsumed {
        participant: PeerId,
        item_id: String,
        kind: ItemKind,
        new_score: u32,
    },

    /// Item placed on the board
    ItemSpawned {
        item_id: String,
        kind: ItemKind,
        position: Cell,
    },

    /// Game started
    GameStarted { participants: Vec<PeerId> },

    /// Game ended
    GameEnded { outcome: GameOutcome },
}

/// A game event with timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self { tick, data }
    }

    /// Participant this event is about, if any.
    pub fn participant(&self) -> Option<&PeerId> {
        match &self.data {
            GameEventData::ParticipantEliminated { participant, .. }
            | GameEventData::ItemConsumed { participant, .. } => Some(participant),
            GameEventData::GameEnded { outcome } => outcome.winner.as_ref(),
            _ => None,
        }
    }

    /// Create participant eliminated event.
    pub fn eliminated(tick: u64, participant: PeerId, cause: EliminationCause, score: u32) -> Self {
        Self::new(tick, GameEventData::ParticipantEliminated { participant, cause, score })
    }

    /// Create item consumed event.
    pub fn consumed(
        tick: u64,
        participant: PeerId,
        item_id: String,
        kind: ItemKind,
        new_score: u32,
    ) -> Self {
        Self::new(
            tick,
            GameEventData::ItemConsumed {
                participant,
                item_id,
                kind,
                new_score,
            },
        )
    }

    /// Create item spawned event.
    pub fn spawned(tick: u64, item_id: String, kind: ItemKind, position: Cell) -> Self {
        Self::new(tick, GameEventData::ItemSpawned { item_id, kind, position })
    }

    /// Create game started event.
    pub fn started(tick: u64, participants: Vec<PeerId>) -> Self {
        Self::new(tick, GameEventData::GameStarted { participants })
    }

    /// Create game ended event.
    pub fn ended(tick: u64, outcome: GameOutcome) -> Self {
        Self::new(tick, GameEventData::GameEnded { outcome })
    }

    /// Is this the end-of-game event?
    pub fn is_game_end(&self) -> bool {
        matches!(self.data, GameEventData::GameEnded { .. })
    }
}
