//! Document Fields
//!
//! Typed keys and values of the replicated room document, plus the stamps
//! that order writes to the same field.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::grid::Direction;
use crate::game::state::{ConsumableItem, GameOutcome, Participant, PeerId};

// =============================================================================
// KEYS
// =============================================================================

/// A named, independently mergeable field.
///
/// Each field has one conventional writer:
///
/// | Field | Writer |
/// |-------|--------|
/// | `Participant(id)` | owner at join, authority afterwards |
/// | `Intent(id)` | owner only |
/// | `Consumables`, `Running`, `Outcome` | authority |
/// | `Authority` | first joiner, once |
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    /// One participant's record
    Participant(PeerId),
    /// One participant's requested direction
    Intent(PeerId),
    /// The item pool
    Consumables,
    /// Whether the game is running
    Running,
    /// Identity of the simulating peer
    Authority,
    /// Result of the last finished game
    Outcome,
}

impl FieldKey {
    /// Merge rule for concurrent writes to this field.
    pub fn policy(&self) -> MergePolicy {
        match self {
            FieldKey::Authority => MergePolicy::FirstWriterWins,
            _ => MergePolicy::LastWriterWins,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Participant(id) => write!(f, "participant/{id}"),
            FieldKey::Intent(id) => write!(f, "intent/{id}"),
            FieldKey::Consumables => f.write_str("consumables"),
            FieldKey::Running => f.write_str("running"),
            FieldKey::Authority => f.write_str("authority"),
            FieldKey::Outcome => f.write_str("outcome"),
        }
    }
}

/// How concurrent writes to one field are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergePolicy {
    /// Highest stamp wins
    LastWriterWins,
    /// Lowest stamp wins; later writes never replace it
    FirstWriterWins,
}

// =============================================================================
// VALUES
// =============================================================================

/// A direction request, tagged with the record round it was made against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Requested heading
    pub direction: Direction,
    /// Round of the participant record when the request was made
    pub round: u32,
}

/// Field payload. Replaced wholesale on every write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Participant record
    Participant(Participant),
    /// Direction request
    Intent(Intent),
    /// Item pool
    Consumables(Vec<ConsumableItem>),
    /// Running flag
    Running(bool),
    /// Authoritative identity
    Authority(PeerId),
    /// Finished-game result, or none while a game is pending
    Outcome(Option<GameOutcome>),
}

impl FieldValue {
    /// Is this value well-formed for `key`?
    ///
    /// Rejects kind mismatches and participant records filed under another id.
    pub fn fits(&self, key: &FieldKey) -> bool {
        match (key, self) {
            (FieldKey::Participant(id), FieldValue::Participant(p)) => p.id == *id,
            (FieldKey::Intent(_), FieldValue::Intent(_))
            | (FieldKey::Consumables, FieldValue::Consumables(_))
            | (FieldKey::Running, FieldValue::Running(_))
            | (FieldKey::Authority, FieldValue::Authority(_))
            | (FieldKey::Outcome, FieldValue::Outcome(_)) => true,
            _ => false,
        }
    }
}

// =============================================================================
// STAMPS AND UPDATES
// =============================================================================

/// Lamport stamp: (counter, writer). Ordered by counter, then writer id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// Lamport counter
    pub counter: u64,
    /// Writing replica
    pub replica: PeerId,
}

impl Stamp {
    /// Create a stamp.
    pub fn new(counter: u64, replica: PeerId) -> Self {
        Self { counter, replica }
    }
}

/// One stamped field write, as sent between replicas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocUpdate {
    /// Field written
    pub key: FieldKey,
    /// Write stamp
    pub stamp: Stamp,
    /// New value
    pub value: FieldValue,
}
