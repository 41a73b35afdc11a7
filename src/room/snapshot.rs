//! Room Snapshot
//!
//! Read-only, normalized view of the room handed to renderers. Recomputed
//! from the document after every change.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::core::hash::{compute_state_digest, StateDigest};
use crate::doc::document::Document;
use crate::game::state::{ConsumableItem, GameOutcome, Participant, PeerId};
use crate::room::intent::effective_direction;
use crate::room::session::RoomId;
use crate::ROOM_CAPACITY;

/// What a renderer sees.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room this peer is in
    pub room: RoomId,
    /// This peer's identity
    pub local: PeerId,
    /// Participants; `direction` is the heading the next tick will use
    pub participants: BTreeMap<PeerId, Participant>,
    /// Items on the board
    pub consumables: Vec<ConsumableItem>,
    /// Game running?
    pub running: bool,
    /// Two others hold the room; this peer is not playing
    pub room_full: bool,
    /// Simulating peer, once elected
    pub authority: Option<PeerId>,
    /// Transport link is up
    pub connected: bool,
    /// The other peer is present on the transport
    pub partner_connected: bool,
    /// Result of the last finished game
    pub outcome: Option<GameOutcome>,
}

impl RoomSnapshot {
    /// Empty snapshot for a peer that has not synced yet.
    pub fn empty(room: RoomId, local: PeerId) -> Self {
        Self {
            room,
            local,
            participants: BTreeMap::new(),
            consumables: Vec::new(),
            running: false,
            room_full: false,
            authority: None,
            connected: false,
            partner_connected: false,
            outcome: None,
        }
    }

    /// Derive a snapshot from a document.
    ///
    /// `rejected` is set when the transport itself turned this peer away.
    pub fn from_document(
        doc: &Document,
        room: &RoomId,
        rejected: bool,
        connected: bool,
        partner_connected: bool,
    ) -> Self {
        let local = doc.replica().clone();
        let running = doc.running();

        let participants: BTreeMap<PeerId, Participant> = doc
            .participants()
            .into_iter()
            .map(|(id, mut p)| {
                p.direction = effective_direction(&p, doc.intent(&id), running);
                (id, p)
            })
            .collect();

        let room_full = rejected
            || (participants.len() >= ROOM_CAPACITY && !participants.contains_key(&local));

        Self {
            room: room.clone(),
            local,
            participants,
            consumables: doc.consumables(),
            running,
            room_full,
            authority: doc.authority().cloned(),
            connected,
            partner_connected,
            outcome: doc.outcome().cloned(),
        }
    }

    /// This peer's own participant, if admitted.
    pub fn me(&self) -> Option<&Participant> {
        self.participants.get(&self.local)
    }

    /// Is this peer the simulating one?
    pub fn is_authority(&self) -> bool {
        self.authority.as_ref() == Some(&self.local)
    }

    /// Did this peer win the last game?
    pub fn won(&self) -> Option<bool> {
        self.outcome
            .as_ref()
            .map(|o| o.winner.as_ref() == Some(&self.local))
    }

    /// Digest of the replicated part of the snapshot.
    ///
    /// Local-only flags (connectivity, room_full) are left out, so two
    /// converged replicas agree.
    pub fn digest(&self) -> StateDigest {
        compute_state_digest(|h| {
            h.update_u32(self.participants.len() as u32);
            for (id, p) in &self.participants {
                h.update_str(id.as_str());
                h.update_u32(p.body.len() as u32);
                for cell in &p.body {
                    h.update_cell(*cell);
                }
                let (dx, dy) = p.direction.vector();
                h.update_i32(dx);
                h.update_i32(dy);
                h.update_bool(p.alive);
                h.update_u32(p.score);
                h.update_str(&p.color);
            }

            h.update_u32(self.consumables.len() as u32);
            for item in &self.consumables {
                h.update_str(&item.id);
                h.update_cell(item.position);
                h.update_u8(item.kind.score_delta().is_positive() as u8);
            }

            h.update_bool(self.running);
            h.update_str(self.authority.as_ref().map(|a| a.as_str()).unwrap_or(""));
            h.update_str(
                self.outcome
                    .as_ref()
                    .and_then(|o| o.winner.as_ref())
                    .map(|w| w.as_str())
                    .unwrap_or(""),
            );
        })
    }

    /// Hex-encoded digest for logs.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}
