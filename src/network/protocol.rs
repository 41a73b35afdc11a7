//! Protocol Messages
//!
//! Wire format between peers and the relay. Frames are bincode on the wire;
//! JSON is available for logs and debugging.
//!
//! Enums here are externally tagged: bincode cannot decode internally
//! tagged (`#[serde(tag = "...")]`) enums.

use serde::{Serialize, Deserialize};

use crate::doc::field::DocUpdate;
use crate::game::state::PeerId;
use crate::room::session::RoomId;

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON encode/decode failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encode/decode failed.
    #[error("Binary error: {0}")]
    Binary(#[from] bincode::Error),

    /// A well-formed message arrived at the wrong point of the exchange.
    #[error("Unexpected message: {0}")]
    Unexpected(String),
}

/// Every message carried by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMessage {
    // -------------------------------------------------------------------------
    // Peer -> relay
    // -------------------------------------------------------------------------
    /// First frame on a relay connection.
    Hello { room: RoomId, peer: PeerId, version: String },

    // -------------------------------------------------------------------------
    // Relay -> peer
    // -------------------------------------------------------------------------
    /// Admission accepted; lists peers already in the room.
    Welcome { peers: Vec<PeerId> },

    /// Room already holds two peers.
    RoomFull { room: RoomId },

    /// Another peer entered the room.
    PeerJoined { peer: PeerId },

    /// Another peer left the room.
    PeerLeft { peer: PeerId },

    // -------------------------------------------------------------------------
    // Peer -> peer (relayed verbatim)
    // -------------------------------------------------------------------------
    /// Full document state, sent to a partner on first contact.
    Sync { from: PeerId, updates: Vec<DocUpdate> },

    /// One field write.
    Update { from: PeerId, update: DocUpdate },
}

impl WireMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary (bincode).
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }

    /// Short message name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Hello { .. } => "hello",
            WireMessage::Welcome { .. } => "welcome",
            WireMessage::RoomFull { .. } => "room_full",
            WireMessage::PeerJoined { .. } => "peer_joined",
            WireMessage::PeerLeft { .. } => "peer_left",
            WireMessage::Sync { .. } => "sync",
            WireMessage::Update { .. } => "update",
        }
    }

    /// Is this a peer-to-peer payload the relay must forward?
    pub fn is_peer_payload(&self) -> bool {
        matches!(self, WireMessage::Sync { .. } | WireMessage::Update { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::Cell;
    use crate::doc::field::{FieldKey, FieldValue, Stamp};
    use crate::game::state::{ConsumableItem, ItemKind, Participant, PALETTE};

    fn sample_update() -> DocUpdate {
        DocUpdate {
            key: FieldKey::Consumables,
            stamp: Stamp::new(4, PeerId::new("a")),
            value: FieldValue::Consumables(vec![ConsumableItem::new(
                "item-1",
                Cell::new(3, 7),
                ItemKind::Harmful,
            )]),
        }
    }

    #[test]
    fn test_binary_update() {
        let msg = WireMessage::Update {
            from: PeerId::new("a"),
            update: sample_update(),
        };
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(WireMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_binary_sync_with_record() {
        let id = PeerId::new("b");
        let record = DocUpdate {
            key: FieldKey::Participant(id.clone()),
            stamp: Stamp::new(1, id.clone()),
            value: FieldValue::Participant(Participant::spawn(id.clone(), PALETTE[1], 2)),
        };
        let msg = WireMessage::Sync { from: id, updates: vec![record, sample_update()] };
        let parsed = WireMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_json_names() {
        let msg = WireMessage::RoomFull { room: RoomId::new("abc123def") };
        let json = msg.to_json().unwrap();
        assert!(json.contains("room_full"));
        assert_eq!(WireMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            WireMessage::from_bytes(&[0xff, 0xff, 0xff, 0xff, 0x01]),
            Err(ProtocolError::Binary(_))
        ));
        assert!(matches!(WireMessage::from_json("{"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_peer_payload_classification() {
        assert!(WireMessage::Update { from: PeerId::new("a"), update: sample_update() }.is_peer_payload());
        assert!(!WireMessage::Welcome { peers: vec![] }.is_peer_payload());
        assert_eq!(WireMessage::PeerLeft { peer: PeerId::new("a") }.kind(), "peer_left");
    }
}
