//! Transport Adapter
//!
//! A room-scoped duplex link between this peer and whoever else is in the
//! room. Connectors hand back a [`PeerLink`]: an outbound queue of
//! [`WireMessage`]s and an inbound stream of [`LinkEvent`]s. Connectivity
//! changes arrive on the same stream as payloads, in delivery order.

use std::future::Future;

use tokio::sync::mpsc;

use crate::game::state::PeerId;
use crate::network::protocol::{ProtocolError, WireMessage};
use crate::room::session::RoomId;

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The room already holds two peers.
    #[error("Room {0} is full")]
    RoomFull(RoomId),

    /// The link is gone.
    #[error("Link closed")]
    Closed,

    /// Connection setup failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Relay answered the handshake with something unexpected.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame encode/decode error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Connectivity change on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Link is up; `peers` were already in the room.
    Connected { peers: Vec<PeerId> },
    /// A partner arrived.
    PeerJoined(PeerId),
    /// A partner went away.
    PeerLeft(PeerId),
    /// The link itself dropped.
    Disconnected,
}

/// Something arriving on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Connectivity change
    Status(LinkStatus),
    /// Payload from the partner
    Message(WireMessage),
}

/// A live connection to a room.
///
/// Dropping the link (or its outbound half) leaves the room.
#[derive(Debug)]
pub struct PeerLink {
    outbound: mpsc::Sender<WireMessage>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl PeerLink {
    /// Assemble a link from its two channel halves.
    pub fn new(
        outbound: mpsc::Sender<WireMessage>,
        inbound: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a message for the partner.
    pub async fn send(&self, msg: WireMessage) -> Result<(), TransportError> {
        self.outbound.send(msg).await.map_err(|_| TransportError::Closed)
    }

    /// Next inbound event. `None` once the link is gone for good.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.inbound.recv().await
    }
}

/// Something that can attach a peer to a room.
pub trait Connector: Send + Sync + 'static {
    /// Join `room` as `peer`.
    ///
    /// Fails with [`TransportError::RoomFull`] when two peers are already in.
    fn connect(
        &self,
        room: &RoomId,
        peer: &PeerId,
    ) -> impl Future<Output = Result<PeerLink, TransportError>> + Send;
}
