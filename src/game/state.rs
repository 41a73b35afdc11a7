//! Game State Definitions
//!
//! Participants, consumable items and the per-tick simulation state.
//! Participants live in a BTreeMap so every pass visits them in ascending
//! identity order.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::grid::{Cell, Direction};
use crate::GRID_SIZE;

// =============================================================================
// PEER ID
// =============================================================================

/// Opaque participant identity, stable for the lifetime of a peer process.
///
/// Implements Ord: ascending identity is the simulation order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an existing identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh short identity.
    pub fn generate() -> Self {
        Self(short_uuid())
    }

    /// Identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First six characters, for log lines and notifications.
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(6).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Nine lowercase hex characters taken from a v4 UUID.
pub(crate) fn short_uuid() -> String {
    let mut s = uuid::Uuid::new_v4().simple().to_string();
    s.truncate(9);
    s
}

// =============================================================================
// COLORS AND SPAWNS
// =============================================================================

/// Display colors, in assignment order (cyan-500, amber-500).
pub const PALETTE: [&str; 2] = ["#06b6d4", "#f59e0b"];

/// Multiplayer spawn cell per palette slot, symmetric about the board centre.
pub const SPAWN_CELLS: [Cell; 2] = [
    Cell::new(GRID_SIZE / 2 - 4, GRID_SIZE / 2),
    Cell::new(GRID_SIZE / 2 + 3, GRID_SIZE / 2),
];

/// Pick the first palette color not already taken.
///
/// Falls back to the first entry when every color is in use; under the
/// two-seat capacity that never happens.
pub fn assign_color<'a, I>(used: I) -> &'static str
where
    I: IntoIterator<Item = &'a str>,
{
    let used: Vec<&str> = used.into_iter().collect();
    PALETTE
        .iter()
        .copied()
        .find(|c| !used.contains(c))
        .unwrap_or(PALETTE[0])
}

/// Spawn cell for a color. Unknown colors use the first slot.
pub fn spawn_cell_for(color: &str) -> Cell {
    let slot = PALETTE.iter().position(|c| *c == color).unwrap_or(0);
    SPAWN_CELLS[slot]
}

// =============================================================================
// PARTICIPANT
// =============================================================================

/// One snake.
///
/// `direction` is the heading the simulation will move along next tick.
/// In the replicated record it is the heading committed by the last tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Owner identity
    pub id: PeerId,

    /// Body cells, head first
    pub body: Vec<Cell>,

    /// Movement heading
    pub direction: Direction,

    /// Still in the game?
    pub alive: bool,

    /// Accumulated score, never below zero
    pub score: u32,

    /// Display color
    pub color: String,

    /// Reset generation this record belongs to
    #[serde(default)]
    pub round: u32,
}

impl Participant {
    /// Create a fresh participant on its color's spawn cell.
    pub fn spawn(id: PeerId, color: impl Into<String>, round: u32) -> Self {
        let color = color.into();
        Self {
            body: vec![spawn_cell_for(&color)],
            id,
            direction: Direction::Up,
            alive: true,
            score: 0,
            color,
            round,
        }
    }

    /// Head cell, if the body is non-empty.
    #[inline]
    pub fn head(&self) -> Option<Cell> {
        self.body.first().copied()
    }

    /// Does any body segment occupy `cell`?
    #[inline]
    pub fn occupies(&self, cell: Cell) -> bool {
        self.body.contains(&cell)
    }

    /// Put the participant back on its spawn cell with a clean slate.
    ///
    /// Keeps identity and color; bumps `round` so stale direction requests
    /// from before the reset are ignored.
    pub fn reset(&mut self, round: u32) {
        self.body = vec![spawn_cell_for(&self.color)];
        self.direction = Direction::Up;
        self.alive = true;
        self.score = 0;
        self.round = round;
    }

    /// Apply a score change, clamped at zero.
    pub fn apply_score(&mut self, delta: i32) {
        self.score = if delta >= 0 {
            self.score.saturating_add(delta as u32)
        } else {
            self.score.saturating_sub(delta.unsigned_abs())
        };
    }
}

// =============================================================================
// CONSUMABLES
// =============================================================================

/// Kind of consumable item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Green: +10
    Beneficial,
    /// Red: -5
    Harmful,
}

impl ItemKind {
    /// Score change applied when eaten.
    pub fn score_delta(self) -> i32 {
        match self {
            ItemKind::Beneficial => 10,
            ItemKind::Harmful => -5,
        }
    }
}

/// A grid-resident item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumableItem {
    /// Unique item id
    pub id: String,

    /// Cell the item sits on
    pub position: Cell,

    /// Kind of item
    pub kind: ItemKind,
}

impl ConsumableItem {
    /// Create an item.
    pub fn new(id: impl Into<String>, position: Cell, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            position,
            kind,
        }
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Why the game ended the way it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Exactly one participant still alive
    LastSurvivor,
    /// Nobody survived; strictly higher score won
    HigherScore,
    /// Nobody survived with equal scores; first in identity order won
    Tiebreak,
}

/// Result of a finished game, replicated so both peers see game-over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    /// Winner (None only if nobody was in the room)
    pub winner: Option<PeerId>,
    /// How the winner was determined
    pub reason: EndReason,
    /// Final score per participant
    pub scores: BTreeMap<PeerId, u32>,
}

impl GameOutcome {
    /// Winner's final score.
    pub fn winning_score(&self) -> Option<u32> {
        self.winner.as_ref().and_then(|w| self.scores.get(w).copied())
    }
}

// =============================================================================
// SIMULATION STATE
// =============================================================================

/// Everything one tick reads and writes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimState {
    /// Ticks simulated so far this round (local to the simulating peer)
    pub tick: u64,

    /// Whether the game is running
    pub running: bool,

    /// All participants (BTreeMap for deterministic iteration)
    pub participants: BTreeMap<PeerId, Participant>,

    /// Active consumables
    pub consumables: Vec<ConsumableItem>,
}

impl SimState {
    /// Create an empty, stopped state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a participant.
    pub fn add_participant(&mut self, participant: Participant) {
        self.participants.insert(participant.id.clone(), participant);
    }

    /// Number of participants still alive.
    pub fn alive_count(&self) -> usize {
        self.participants.values().filter(|p| p.alive).count()
    }

    /// Is `cell` covered by a living body or an existing item?
    pub fn is_cell_taken(&self, cell: Cell) -> bool {
        self.participants.values().any(|p| p.alive && p.occupies(cell))
            || self.consumables.iter().any(|c| c.position == cell)
    }
}

// =============================================================================
// TESTS
// =============================================================================
