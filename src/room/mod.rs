//! Room Module
//!
//! Everything a peer does inside one room, on top of the document and a
//! transport.
//!
//! ## Module Structure
//!
//! - `session`: Room Session Manager (admission, authority, game control)
//! - `snapshot`: Renderer view and state digest
//! - `intent`: Local Intent Publisher
//! - `scheduler`: Tick scheduler for the authoritative peer
//! - `peer`: Per-peer event loop and renderer handle

pub mod session;
pub mod snapshot;
pub mod intent;
pub mod scheduler;
pub mod peer;

pub use session::{RoomId, RoomSession, SessionError, SessionState};
pub use snapshot::RoomSnapshot;
pub use scheduler::TickScheduler;
pub use peer::{PeerCommand, PeerHandle};
