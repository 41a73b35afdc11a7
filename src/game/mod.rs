//! Game Logic Module
//!
//! Snake simulation. Pure and deterministic for a given state and RNG.
//!
//! ## Module Structure
//!
//! - `state`: Participants, items, outcome, simulation state
//! - `tick`: Authoritative simulation step
//! - `collision`: Wall, self and body checks
//! - `consumable`: Item pool replenishment
//! - `events`: Game events for logs and notifications
//! - `solo`: Single-player variant

pub mod state;
pub mod tick;
pub mod collision;
pub mod consumable;
pub mod events;
pub mod solo;

// Re-export key types
pub use state::{ConsumableItem, GameOutcome, ItemKind, Participant, PeerId, SimState};
pub use tick::{EngineConfig, TickResult};
pub use events::{GameEvent, GameEventData};
pub use solo::{SoloGame, Speed};
