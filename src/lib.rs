//! # P2P Snake
//!
//! Serverless two-player grid snake. Two peers share a replicated room
//! document; the first peer to claim the room simulates the game and writes
//! the results back, the other only publishes its own direction.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         P2P SNAKE                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── grid.rs     - Cells and directions                      │
//! │  ├── rng.rs      - Seeded PRNG for item placement            │
//! │  └── hash.rs     - Snapshot digests                          │
//! │                                                              │
//! │  game/           - Simulation (pure)                         │
//! │  ├── state.rs    - Participants, items, outcome              │
//! │  ├── tick.rs     - Authoritative tick                        │
//! │  ├── collision.rs- Wall, self and body checks                │
//! │  ├── consumable.rs- Item pool                                │
//! │  ├── events.rs   - Game events                               │
//! │  └── solo.rs     - Single-player variant                     │
//! │                                                              │
//! │  doc/            - Replicated room document                  │
//! │  network/        - Transports (in-memory, WebSocket relay)   │
//! │  room/           - Session, snapshot, intents, peer loop     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! `core/` and `game/` never read the clock or the network. Iteration is
//! over `BTreeMap`s, so participants always move in ascending identity
//! order, and all randomness comes from [`DeterministicRng`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

use std::time::Duration;

pub mod core;
pub mod game;
pub mod doc;
pub mod network;
pub mod room;
pub mod config;

// Re-export commonly used types
pub use core::grid::{Cell, Direction};
pub use core::rng::DeterministicRng;
pub use game::state::{PeerId, Participant, ConsumableItem, GameOutcome};
pub use game::solo::{SoloGame, Speed};
pub use room::peer::PeerHandle;
pub use room::session::{RoomId, SessionError};
pub use room::snapshot::RoomSnapshot;
pub use config::{PeerConfig, RelayConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Board edge length in cells
pub const GRID_SIZE: i32 = 20;

/// Two-player tick period in milliseconds
pub const TICK_PERIOD_MS: u64 = 150;

/// Two-player tick period
pub const TICK_PERIOD: Duration = Duration::from_millis(TICK_PERIOD_MS);

/// Peers per room
pub const ROOM_CAPACITY: usize = 2;
