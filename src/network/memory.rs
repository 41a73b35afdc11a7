//! In-Process Transport
//!
//! A hub that links peers living in the same process. Used by tests and the
//! local demo; behaves like the relay (two peers per room, join/leave
//! announcements, verbatim forwarding).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::game::state::PeerId;
use crate::network::protocol::WireMessage;
use crate::network::transport::{Connector, LinkEvent, LinkStatus, PeerLink, TransportError};
use crate::room::session::RoomId;
use crate::ROOM_CAPACITY;

type Members = BTreeMap<PeerId, mpsc::UnboundedSender<LinkEvent>>;

/// Shared in-memory room registry.
#[derive(Clone, Debug)]
pub struct MemoryHub {
    rooms: Arc<Mutex<BTreeMap<RoomId, Members>>>,
    queue_depth: usize,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MemoryHub {
    /// Create a hub. `queue_depth` bounds each link's outbound queue.
    pub fn new(queue_depth: usize) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(BTreeMap::new())),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Peers currently in a room.
    pub async fn members(&self, room: &RoomId) -> Vec<PeerId> {
        self.rooms
            .lock()
            .await
            .get(room)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Cut a peer's link as if the network dropped.
    ///
    /// The peer sees `Disconnected`; everyone else sees `PeerLeft`.
    pub async fn disconnect(&self, room: &RoomId, peer: &PeerId) {
        let mut rooms = self.rooms.lock().await;
        if let Some(tx) = remove_member(&mut rooms, room, peer) {
            let _ = tx.send(LinkEvent::Status(LinkStatus::Disconnected));
        }
    }
}

/// Remove a member and tell the rest. Returns the removed sender.
fn remove_member(
    rooms: &mut BTreeMap<RoomId, Members>,
    room: &RoomId,
    peer: &PeerId,
) -> Option<mpsc::UnboundedSender<LinkEvent>> {
    let members = rooms.get_mut(room)?;
    let removed = members.remove(peer)?;

    for tx in members.values() {
        let _ = tx.send(LinkEvent::Status(LinkStatus::PeerLeft(peer.clone())));
    }
    if members.is_empty() {
        rooms.remove(room);
    }

    info!(room = %room, peer = %peer, "Peer left room");
    Some(removed)
}

impl Connector for MemoryHub {
    async fn connect(&self, room: &RoomId, peer: &PeerId) -> Result<PeerLink, TransportError> {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::channel::<WireMessage>(self.queue_depth);

        {
            let mut rooms = self.rooms.lock().await;
            let members = rooms.entry(room.clone()).or_default();

            if members.len() >= ROOM_CAPACITY && !members.contains_key(peer) {
                info!(room = %room, peer = %peer, "Rejecting join: room full");
                return Err(TransportError::RoomFull(room.clone()));
            }

            let existing: Vec<PeerId> = members.keys().filter(|id| *id != peer).cloned().collect();
            for tx in members.values() {
                let _ = tx.send(LinkEvent::Status(LinkStatus::PeerJoined(peer.clone())));
            }
            let _ = in_tx.send(LinkEvent::Status(LinkStatus::Connected { peers: existing }));
            members.insert(peer.clone(), in_tx.clone());

            info!(room = %room, peer = %peer, members = members.len(), "Peer joined room");
        }

        // Forward this peer's frames to the rest of the room
        let rooms = self.rooms.clone();
        let room = room.clone();
        let peer = peer.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let rooms = rooms.lock().await;
                let Some(members) = rooms.get(&room) else {
                    break;
                };
                // Cut by `disconnect`: stop forwarding
                if !members.get(&peer).is_some_and(|tx| tx.same_channel(&in_tx)) {
                    break;
                }
                for (id, tx) in members {
                    if *id != peer {
                        debug!(from = %peer, to = %id, kind = msg.kind(), "Forwarding");
                        let _ = tx.send(LinkEvent::Message(msg.clone()));
                    }
                }
            }

            // Link dropped by its owner
            let mut rooms = rooms.lock().await;
            let still_ours = rooms
                .get(&room)
                .and_then(|m| m.get(&peer))
                .is_some_and(|tx| tx.same_channel(&in_tx));
            if still_ours {
                remove_member(&mut rooms, &room, &peer);
            }
        });

        Ok(PeerLink::new(out_tx, in_rx))
    }
}
