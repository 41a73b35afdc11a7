//! Networking Module
//!
//! Transport adapters that carry document updates between the two peers of
//! a room. Nothing here is authoritative.
//!
//! ## Module Structure
//!
//! - `protocol`: Wire message types
//! - `transport`: Link abstraction and the `Connector` trait
//! - `memory`: In-process hub for tests and local play
//! - `relay`: WebSocket relay server and client connector

pub mod protocol;
pub mod transport;
pub mod memory;
pub mod relay;

pub use protocol::{ProtocolError, WireMessage};
pub use transport::{Connector, LinkEvent, LinkStatus, PeerLink, TransportError};
pub use memory::MemoryHub;
pub use relay::{RelayServer, WsConnector};
