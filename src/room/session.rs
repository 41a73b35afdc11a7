//! Room Session Manager
//!
//! One peer's view of a room: admission, authority election, game control
//! and the authoritative tick. The session is a plain state machine. It
//! never touches a socket or a clock; the peer loop feeds it link events and
//! scheduler ticks, then drains its outbox onto the transport.
//!
//! ## Lifecycle
//!
//! ```text
//! Connecting --Connected{[]}------------------> Admitted
//! Connecting --Connected{peers}--> Syncing --Sync--> Admitted | Full
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::config::PeerConfig;
use crate::core::grid::Direction;
use crate::core::rng::DeterministicRng;
use crate::doc::document::{DocChange, Document, Origin};
use crate::doc::field::{FieldKey, FieldValue};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::{assign_color, short_uuid, Participant, PeerId, SimState};
use crate::game::tick::{self, EngineConfig, TickResult};
use crate::network::protocol::WireMessage;
use crate::network::transport::{LinkStatus, TransportError};
use crate::room::intent::{effective_direction, publish_direction};
use crate::room::snapshot::RoomSnapshot;
use crate::ROOM_CAPACITY;

/// Longest accepted room id.
pub const MAX_ROOM_ID_LEN: usize = 64;

// =============================================================================
// ROOM ID
// =============================================================================

/// Short opaque room identifier, shareable through a link.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap an id without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random room id.
    pub fn generate() -> Self {
        Self(short_uuid())
    }

    /// Parse and validate a user-supplied id.
    ///
    /// Accepts 1 to 64 ASCII letters, digits, `-` or `_`.
    pub fn parse(id: &str) -> Result<Self, SessionError> {
        let id = id.trim();
        let valid = !id.is_empty()
            && id.len() <= MAX_ROOM_ID_LEN
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(id.to_string()))
        } else {
            Err(SessionError::InvalidRoomId(id.to_string()))
        }
    }

    /// Extract the `room` parameter from a share link or bare query string.
    ///
    /// ```
    /// use p2p_snake::room::session::RoomId;
    ///
    /// let room = RoomId::from_link("https://play.example/snake?room=k3j9x&lang=en").unwrap();
    /// assert_eq!(room.as_str(), "k3j9x");
    /// ```
    pub fn from_link(link: &str) -> Result<Self, SessionError> {
        let without_fragment = link.split('#').next().unwrap_or("");
        let query = match without_fragment.split_once('?') {
            Some((_, query)) => query,
            None => without_fragment,
        };

        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "room")
            .ok_or_else(|| SessionError::InvalidRoomId(link.to_string()))
            .and_then(|(_, value)| Self::parse(value))
    }

    /// Render a link that joins this room.
    pub fn share_link(&self, base: &str) -> String {
        if !base.contains('?') {
            format!("{}?room={}", base, self.0)
        } else if base.ends_with('?') || base.ends_with('&') {
            format!("{}room={}", base, self.0)
        } else {
            format!("{}&room={}", base, self.0)
        }
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoomId({})", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ERRORS AND STATE
// =============================================================================

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Only the authoritative peer may do this.
    #[error("Not the authoritative peer")]
    NotAuthority,

    /// Starting needs a full room.
    #[error("Need two participants to start, have {count}")]
    NeedTwoParticipants {
        /// Participants currently in the room
        count: usize,
    },

    /// A game is already running.
    #[error("Game already in progress")]
    GameInProgress,

    /// This peer has no participant entry yet.
    #[error("Not admitted to the room")]
    NotAdmitted,

    /// Room held two others when this peer arrived.
    #[error("Room {0} is full")]
    RoomFull(RoomId),

    /// Room id or link could not be parsed.
    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    /// Session already left.
    #[error("Session closed")]
    Closed,

    /// Transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the link to come up.
    Connecting,
    /// Waiting for the partner's full state.
    Syncing,
    /// Participant entry present; playing.
    Admitted,
    /// Two others hold the room. Terminal.
    Full,
    /// Left the room. Terminal.
    Left,
}

// =============================================================================
// SESSION
// =============================================================================

/// One peer's session in one room.
pub struct RoomSession {
    room: RoomId,
    local: PeerId,
    doc: Document,
    changes: broadcast::Receiver<DocChange>,
    state: SessionState,
    connected: bool,
    partner_connected: bool,
    config: EngineConfig,
    /// Item RNG, present on the authority once a game has been started
    rng: Option<DeterministicRng>,
    games: u32,
    tick: u64,
    outbox: Vec<WireMessage>,
    events: Vec<GameEvent>,
}

impl RoomSession {
    /// Create a session with a fresh, empty document.
    pub fn new(room: RoomId, local: PeerId, config: &PeerConfig) -> Self {
        let doc = Document::new(local.clone(), config.change_capacity);
        let changes = doc.subscribe();
        Self {
            room,
            local,
            doc,
            changes,
            state: SessionState::Connecting,
            connected: false,
            partner_connected: false,
            config: config.engine.clone(),
            rng: None,
            games: 0,
            tick: 0,
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Room id.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// This peer's identity.
    pub fn local_id(&self) -> &PeerId {
        &self.local
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Local replica of the room document.
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Is this peer the elected authority?
    pub fn is_authority(&self) -> bool {
        self.doc.authority() == Some(&self.local)
    }

    /// Should the tick scheduler be armed?
    pub fn should_tick(&self) -> bool {
        self.state == SessionState::Admitted && self.doc.running() && self.is_authority()
    }

    /// Terminal room-full state reached.
    pub fn is_full(&self) -> bool {
        self.state == SessionState::Full
    }

    // -------------------------------------------------------------------------
    // Link input
    // -------------------------------------------------------------------------

    /// React to a connectivity change.
    pub fn on_link_status(&mut self, status: LinkStatus) {
        match status {
            LinkStatus::Connected { peers } => {
                self.connected = true;
                self.partner_connected = !peers.is_empty();

                if self.state != SessionState::Connecting {
                    return;
                }
                if peers.is_empty() {
                    self.admit();
                } else {
                    debug!(room = %self.room, ?peers, "Waiting for partner state");
                    self.state = SessionState::Syncing;
                }
            }
            LinkStatus::PeerJoined(peer) => {
                info!(room = %self.room, peer = %peer, "Partner connected");
                self.partner_connected = true;
                self.outbox.push(self.sync_message());
            }
            LinkStatus::PeerLeft(peer) => {
                self.partner_connected = false;
                if self.doc.running() && self.doc.authority() == Some(&peer) {
                    warn!(
                        room = %self.room,
                        authority = %peer,
                        "Authoritative peer left mid-game, simulation stalled"
                    );
                } else {
                    info!(room = %self.room, peer = %peer, "Partner disconnected");
                }
            }
            LinkStatus::Disconnected => {
                warn!(room = %self.room, "Transport link lost");
                self.connected = false;
                self.partner_connected = false;
            }
        }
    }

    /// Apply a payload from the partner.
    pub fn on_message(&mut self, msg: WireMessage) {
        match msg {
            WireMessage::Sync { from, updates } => {
                if from == self.local {
                    return;
                }
                let applied = self.doc.apply_all(updates);
                debug!(room = %self.room, from = %from, applied, "Applied partner state");

                if self.state == SessionState::Syncing {
                    self.admit();
                }
            }
            WireMessage::Update { from, update } => {
                if from != self.local {
                    self.doc.apply(update);
                }
            }
            other => {
                debug!(kind = other.kind(), "Ignoring relay message");
            }
        }
    }

    fn sync_message(&self) -> WireMessage {
        WireMessage::Sync {
            from: self.local.clone(),
            updates: self.doc.encode_state(),
        }
    }

    /// Add this peer's participant entry, or end up full.
    fn admit(&mut self) {
        if self.doc.participant(&self.local).is_some() {
            info!(room = %self.room, peer = %self.local, "Rejoined room");
            self.state = SessionState::Admitted;
            return;
        }

        let participants = self.doc.participants();
        if participants.len() >= ROOM_CAPACITY {
            warn!(room = %self.room, peer = %self.local, "Room full");
            self.state = SessionState::Full;
            return;
        }

        let color = assign_color(participants.values().map(|p| p.color.as_str()));
        let round = participants.values().map(|p| p.round).max().unwrap_or(0);
        self.doc.set(
            FieldKey::Participant(self.local.clone()),
            FieldValue::Participant(Participant::spawn(self.local.clone(), color, round)),
        );

        if participants.is_empty()
            && self
                .doc
                .set_if_absent(FieldKey::Authority, FieldValue::Authority(self.local.clone()))
                .is_some()
        {
            info!(room = %self.room, peer = %self.local, "Elected authority");
        }

        self.state = SessionState::Admitted;
        info!(room = %self.room, peer = %self.local, color, "Joined room");
    }

    // -------------------------------------------------------------------------
    // Game control
    // -------------------------------------------------------------------------

    fn ensure_admitted(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Admitted => Ok(()),
            SessionState::Full => Err(SessionError::RoomFull(self.room.clone())),
            SessionState::Left => Err(SessionError::Closed),
            SessionState::Connecting | SessionState::Syncing => Err(SessionError::NotAdmitted),
        }
    }

    fn ensure_authority(&self) -> Result<(), SessionError> {
        self.ensure_admitted()?;
        if self.is_authority() {
            Ok(())
        } else {
            Err(SessionError::NotAuthority)
        }
    }

    fn max_round(&self) -> u32 {
        self.doc
            .participants()
            .values()
            .map(|p| p.round)
            .max()
            .unwrap_or(0)
    }

    /// Start a game. Authority only, with both participants present.
    ///
    /// Directions requested before the start become the initial headings.
    /// Participants left dead by a previous game are respawned first.
    pub fn start_game(&mut self) -> Result<(), SessionError> {
        self.ensure_authority()?;
        if self.doc.running() {
            return Err(SessionError::GameInProgress);
        }

        let participants = self.doc.participants();
        if participants.len() != ROOM_CAPACITY {
            return Err(SessionError::NeedTwoParticipants { count: participants.len() });
        }

        // Read intents against the current round, before a respawn bumps it
        let next_round = self.max_round() + 1;
        let mut headings = Vec::with_capacity(participants.len());
        let mut state = SimState::new();
        for (id, participant) in participants {
            headings.push((id.clone(), effective_direction(&participant, self.doc.intent(&id), false)));
            state.add_participant(participant);
        }
        if state.participants.values().any(|p| !p.alive) {
            tick::reset_round(&mut state, next_round);
        }
        for (id, heading) in headings {
            if let Some(participant) = state.participants.get_mut(&id) {
                participant.direction = heading;
            }
        }

        self.games += 1;
        let mut rng = DeterministicRng::for_round(self.room.as_str(), self.local.as_str(), self.games);
        let events = tick::start_round(&mut state, &mut rng, &self.config, next_round);

        self.rng = Some(rng);
        self.tick = 0;

        if self.doc.outcome().is_some() {
            self.doc.set(FieldKey::Outcome, FieldValue::Outcome(None));
        }
        self.write_back(&state);

        info!(
            room = %self.room,
            game = self.games,
            items = state.consumables.len(),
            "Game started"
        );
        self.events.extend(events);
        Ok(())
    }

    /// Put both participants back on their spawn cells and stop.
    ///
    /// Authority only. Calling it twice leaves the same snapshot as once.
    pub fn reset_game(&mut self) -> Result<(), SessionError> {
        self.ensure_authority()?;

        let mut state = SimState::new();
        for participant in self.doc.participants().into_values() {
            state.add_participant(participant);
        }
        tick::reset_round(&mut state, self.max_round() + 1);

        self.rng = None;
        self.tick = 0;

        if self.doc.outcome().is_some() {
            self.doc.set(FieldKey::Outcome, FieldValue::Outcome(None));
        }
        self.write_back(&state);

        info!(room = %self.room, "Game reset");
        Ok(())
    }

    /// Request a new heading for this peer's snake.
    ///
    /// Returns `Ok(false)` when a reversal was dropped. When no game is
    /// running this also tries to start one; failure to start is not an
    /// error here.
    pub fn change_direction(&mut self, direction: Direction) -> Result<bool, SessionError> {
        self.ensure_admitted()?;

        let accepted = publish_direction(&mut self.doc, &self.local, direction)?;
        if accepted && !self.doc.running() {
            if let Err(e) = self.start_game() {
                debug!(room = %self.room, reason = %e, "Auto-start skipped");
            }
        }
        Ok(accepted)
    }

    /// Run one authoritative tick and write the result back.
    ///
    /// A no-op result when the game is not running.
    pub fn run_tick(&mut self) -> Result<TickResult, SessionError> {
        self.ensure_authority()?;

        let running = self.doc.running();
        let mut state = SimState::new();
        state.tick = self.tick;
        state.running = running;
        for (id, mut participant) in self.doc.participants() {
            participant.direction = effective_direction(&participant, self.doc.intent(&id), running);
            state.add_participant(participant);
        }
        state.consumables = self.doc.consumables();

        let (room, local, games) = (&self.room, &self.local, self.games);
        let rng = self
            .rng
            .get_or_insert_with(|| DeterministicRng::for_round(room.as_str(), local.as_str(), games));

        let result = tick::tick(&mut state, rng, &self.config);
        if !running {
            return Ok(result);
        }
        self.tick = state.tick;

        for event in &result.events {
            if let GameEventData::ParticipantEliminated { participant, cause, score } = &event.data {
                info!(room = %self.room, participant = %participant, ?cause, score, "Participant eliminated");
            }
        }

        if let Some(outcome) = &result.outcome {
            info!(
                room = %self.room,
                winner = ?outcome.winner,
                reason = ?outcome.reason,
                ticks = state.tick,
                "Game ended"
            );
            self.doc
                .set(FieldKey::Outcome, FieldValue::Outcome(Some(outcome.clone())));
        }
        self.write_back(&state);

        self.events.extend(result.events.iter().cloned());
        Ok(result)
    }

    /// Write every field that differs from the document.
    fn write_back(&mut self, state: &SimState) {
        for (id, participant) in &state.participants {
            if self.doc.participant(id) != Some(participant) {
                self.doc.set(
                    FieldKey::Participant(id.clone()),
                    FieldValue::Participant(participant.clone()),
                );
            }
        }

        if self.doc.consumables() != state.consumables {
            self.doc.set(
                FieldKey::Consumables,
                FieldValue::Consumables(state.consumables.clone()),
            );
        }

        if self.doc.running() != state.running {
            self.doc.set(FieldKey::Running, FieldValue::Running(state.running));
        }
    }

    /// Leave the room. The local document stops being served.
    pub fn leave(&mut self) {
        if self.state != SessionState::Left {
            info!(room = %self.room, peer = %self.local, "Left room");
        }
        self.state = SessionState::Left;
        self.connected = false;
        self.partner_connected = false;
    }

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------

    /// Current renderer view.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::from_document(
            &self.doc,
            &self.room,
            self.state == SessionState::Full,
            self.connected,
            self.partner_connected,
        )
    }

    /// Consume pending document notifications.
    ///
    /// Local writes are queued for the partner. Returns true if anything
    /// changed since the last call.
    pub fn drain_changes(&mut self) -> bool {
        let mut dirty = false;
        loop {
            match self.changes.try_recv() {
                Ok(change) => {
                    dirty = true;
                    if change.origin == Origin::Local {
                        self.outbox.push(WireMessage::Update {
                            from: self.local.clone(),
                            update: change.update,
                        });
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(room = %self.room, skipped, "Change backlog overflowed, resending full state");
                    dirty = true;
                    self.outbox.push(self.sync_message());
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        dirty
    }

    /// Messages waiting to go out.
    pub fn take_outbox(&mut self) -> Vec<WireMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Game events produced since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}

impl fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomSession")
            .field("room", &self.room)
            .field("local", &self.local)
            .field("state", &self.state)
            .field("connected", &self.connected)
            .field("partner_connected", &self.partner_connected)
            .field("tick", &self.tick)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{spawn_cell_for, EndReason, PALETTE};
    use proptest::prelude::*;

    fn session(id: &str) -> RoomSession {
        RoomSession::new(RoomId::new("room"), PeerId::new(id), &PeerConfig::default())
    }

    /// Move everything `from` has queued over to `to`.
    fn deliver(from: &mut RoomSession, to: &mut RoomSession) {
        from.drain_changes();
        for msg in from.take_outbox() {
            to.on_message(msg);
        }
    }

    /// `a` creates the room, `b` joins it.
    fn pair() -> (RoomSession, RoomSession) {
        let mut a = session("a");
        let mut b = session("b");

        a.on_link_status(LinkStatus::Connected { peers: vec![] });
        b.on_link_status(LinkStatus::Connected { peers: vec![PeerId::new("a")] });
        a.on_link_status(LinkStatus::PeerJoined(PeerId::new("b")));
        deliver(&mut a, &mut b);
        deliver(&mut b, &mut a);
        (a, b)
    }

    #[test]
    fn test_room_id_parse() {
        assert!(RoomId::parse("k3j9x-2_a").is_ok());
        assert!(RoomId::parse("").is_err());
        assert!(RoomId::parse("bad id").is_err());
        assert!(RoomId::parse(&"x".repeat(MAX_ROOM_ID_LEN + 1)).is_err());
        assert_eq!("abc".parse::<RoomId>().unwrap(), RoomId::new("abc"));
        assert_eq!(RoomId::generate().as_str().len(), 9);
    }

    #[test]
    fn test_room_links() {
        let room = RoomId::new("k3j9x");
        assert_eq!(room.share_link("https://play.example/"), "https://play.example/?room=k3j9x");
        assert_eq!(room.share_link("https://play.example/?lang=en"), "https://play.example/?lang=en&room=k3j9x");

        for link in [
            "https://play.example/?room=k3j9x",
            "https://play.example/?lang=en&room=k3j9x#top",
            "room=k3j9x",
            "?room=k3j9x",
        ] {
            assert_eq!(RoomId::from_link(link).unwrap(), room, "{link}");
        }
        assert!(RoomId::from_link("https://play.example/?lang=en").is_err());
        assert!(RoomId::from_link("https://play.example/?room=").is_err());
    }

    #[test]
    fn test_creator_admitted_as_authority() {
        let mut a = session("a");
        a.on_link_status(LinkStatus::Connected { peers: vec![] });

        assert_eq!(a.state(), SessionState::Admitted);
        assert!(a.is_authority());
        let snap = a.snapshot();
        assert_eq!(snap.me().map(|p| p.color.as_str()), Some(PALETTE[0]));
        assert!(!snap.room_full);
    }

    #[test]
    fn test_joiner_waits_for_state() {
        let mut b = session("b");
        b.on_link_status(LinkStatus::Connected { peers: vec![PeerId::new("a")] });

        assert_eq!(b.state(), SessionState::Syncing);
        assert!(matches!(b.change_direction(Direction::Left), Err(SessionError::NotAdmitted)));
    }

    #[test]
    fn test_joiner_gets_second_color() {
        let (a, b) = pair();

        assert_eq!(b.state(), SessionState::Admitted);
        assert!(!b.is_authority());
        assert_eq!(b.document().authority(), Some(&PeerId::new("a")));

        let snap = a.snapshot();
        assert_eq!(snap.participants.len(), 2);
        assert_eq!(snap.participants[&PeerId::new("b")].color, PALETTE[1]);
        assert_eq!(a.snapshot().digest(), b.snapshot().digest());
    }

    #[test]
    fn test_third_peer_is_full() {
        let (mut a, _b) = pair();
        let mut c = session("c");

        c.on_link_status(LinkStatus::Connected { peers: vec![PeerId::new("a")] });
        a.on_link_status(LinkStatus::PeerJoined(PeerId::new("c")));
        deliver(&mut a, &mut c);

        assert!(c.is_full());
        assert!(c.snapshot().room_full);
        assert_eq!(c.document().participants().len(), 2);
        c.drain_changes();
        assert!(c.take_outbox().is_empty());
        assert!(matches!(c.start_game(), Err(SessionError::RoomFull(_))));
    }

    #[test]
    fn test_start_preconditions() {
        let mut a = session("a");
        a.on_link_status(LinkStatus::Connected { peers: vec![] });
        assert!(matches!(
            a.start_game(),
            Err(SessionError::NeedTwoParticipants { count: 1 })
        ));

        let (mut a, mut b) = pair();
        assert!(matches!(b.start_game(), Err(SessionError::NotAuthority)));
        assert!(matches!(b.reset_game(), Err(SessionError::NotAuthority)));

        a.start_game().unwrap();
        assert!(matches!(a.start_game(), Err(SessionError::GameInProgress)));
        assert!(a.should_tick());
        assert!(!b.should_tick());

        let snap = a.snapshot();
        assert!(snap.running);
        assert_eq!(snap.consumables.len(), 3);
        assert!(a
            .take_events()
            .iter()
            .any(|e| matches!(e.data, GameEventData::GameStarted { .. })));
    }

    #[test]
    fn test_direction_visible_in_next_snapshot() {
        let (mut a, mut b) = pair();

        assert!(b.change_direction(Direction::Left).unwrap());
        assert_eq!(b.snapshot().me().map(|p| p.direction), Some(Direction::Left));

        deliver(&mut b, &mut a);
        let seen = a.snapshot().participants[&PeerId::new("b")].direction;
        assert_eq!(seen, Direction::Left);
        // Non-authority cannot auto-start
        assert!(!a.snapshot().running);
    }

    #[test]
    fn test_pre_start_direction_becomes_heading() {
        let (mut a, mut b) = pair();

        b.change_direction(Direction::Down).unwrap();
        deliver(&mut b, &mut a);

        // Authority's own key press starts the game
        a.change_direction(Direction::Right).unwrap();
        assert!(a.snapshot().running);

        let records = a.document().participants();
        assert_eq!(records[&PeerId::new("a")].direction, Direction::Right);
        assert_eq!(records[&PeerId::new("b")].direction, Direction::Down);
    }

    #[test]
    fn test_reversal_dropped_while_running() {
        let (mut a, mut b) = pair();
        a.start_game().unwrap();
        deliver(&mut a, &mut b);

        assert!(!b.change_direction(Direction::Down).unwrap());
        assert!(b.change_direction(Direction::Left).unwrap());
    }

    #[test]
    fn test_game_runs_to_an_outcome() {
        let (mut a, mut b) = pair();
        a.start_game().unwrap();
        deliver(&mut a, &mut b);

        let mut ended = None;
        for _ in 0..40 {
            let result = a.run_tick().unwrap();
            deliver(&mut a, &mut b);
            if let Some(outcome) = result.outcome {
                ended = Some(outcome);
                break;
            }
        }

        // Both head for the top wall and die on the same tick
        let outcome = ended.expect("game should end at the wall");
        assert_ne!(outcome.reason, EndReason::LastSurvivor);
        assert!(!a.should_tick());

        let snap = b.snapshot();
        assert!(!snap.running);
        assert_eq!(snap.outcome.as_ref(), Some(&outcome));
        assert!(snap.participants.values().all(|p| !p.alive));
        assert_eq!(a.snapshot().digest(), snap.digest());

        // Further ticks do nothing
        assert!(a.run_tick().unwrap().events.is_empty());
    }

    #[test]
    fn test_reset_twice_equals_once() {
        let (mut a, mut b) = pair();
        a.start_game().unwrap();
        for _ in 0..3 {
            a.run_tick().unwrap();
        }

        a.reset_game().unwrap();
        deliver(&mut a, &mut b);
        let once = b.snapshot();

        a.reset_game().unwrap();
        deliver(&mut a, &mut b);
        let twice = b.snapshot();

        assert_eq!(once.digest(), twice.digest());
        assert!(!twice.running);
        assert!(twice.consumables.is_empty());
        assert!(twice.participants.values().all(|p| p.alive && p.score == 0 && p.body.len() == 1));
    }

    #[test]
    fn test_restart_after_game_over() {
        let (mut a, _b) = pair();
        a.start_game().unwrap();
        while a.run_tick().unwrap().outcome.is_none() {}

        a.start_game().unwrap();
        let snap = a.snapshot();
        assert!(snap.running);
        assert!(snap.outcome.is_none());
        assert!(snap.participants.values().all(|p| p.alive && p.score == 0));
    }

    #[test]
    fn test_restart_keeps_chosen_headings() {
        let (mut a, mut b) = pair();
        a.start_game().unwrap();
        while a.run_tick().unwrap().outcome.is_none() {}
        deliver(&mut a, &mut b);

        // Guest picks a heading while the board is stopped
        assert!(b.change_direction(Direction::Down).unwrap());
        deliver(&mut b, &mut a);

        // Host's key press both picks its heading and restarts
        assert!(a.change_direction(Direction::Right).unwrap());
        let snap = a.snapshot();
        assert!(snap.running);
        assert!(snap.participants.values().all(|p| p.alive && p.body.len() == 1));
        assert_eq!(snap.participants[&PeerId::new("a")].direction, Direction::Right);
        assert_eq!(snap.participants[&PeerId::new("b")].direction, Direction::Down);

        // The committed headings drive the first tick
        a.run_tick().unwrap();
        let snap = a.snapshot();
        let a_head = snap.participants[&PeerId::new("a")].head().unwrap();
        let b_head = snap.participants[&PeerId::new("b")].head().unwrap();
        assert_eq!(a_head, spawn_cell_for(PALETTE[0]).step(Direction::Right));
        assert_eq!(b_head, spawn_cell_for(PALETTE[1]).step(Direction::Down));
    }

    #[test]
    fn test_partner_presence() {
        let (mut a, _b) = pair();
        assert!(a.snapshot().partner_connected);

        a.on_link_status(LinkStatus::PeerLeft(PeerId::new("b")));
        let snap = a.snapshot();
        assert!(!snap.partner_connected);
        // Entry stays behind
        assert_eq!(snap.participants.len(), 2);

        a.on_link_status(LinkStatus::Disconnected);
        assert!(!a.snapshot().connected);
    }

    #[test]
    fn test_rejoin_keeps_entry() {
        let (mut a, _b) = pair();
        let mut b2 = session("b");

        b2.on_link_status(LinkStatus::Connected { peers: vec![PeerId::new("a")] });
        a.on_link_status(LinkStatus::PeerJoined(PeerId::new("b")));
        deliver(&mut a, &mut b2);

        assert_eq!(b2.state(), SessionState::Admitted);
        assert!(!b2.snapshot().room_full);
    }

    #[test]
    fn test_local_writes_queue_updates() {
        let mut a = session("a");
        a.on_link_status(LinkStatus::Connected { peers: vec![] });

        assert!(a.drain_changes());
        let outbox = a.take_outbox();
        // Own record and the authority field
        assert_eq!(outbox.len(), 2);
        assert!(outbox.iter().all(|m| matches!(m, WireMessage::Update { .. })));
        assert!(!a.drain_changes());
    }

    #[test]
    fn test_left_session_rejects_commands() {
        let (mut a, _b) = pair();
        a.leave();
        assert_eq!(a.state(), SessionState::Left);
        assert!(matches!(a.start_game(), Err(SessionError::Closed)));
    }

    #[derive(Debug, PartialEq)]
    enum Joined {
        Admitted,
        LinkRefused,
        DocumentFull,
    }

    /// In-order room bus standing in for the hub: at most two links, every
    /// frame reaches every other member.
    #[derive(Default)]
    struct Bus {
        members: Vec<RoomSession>,
    }

    impl Bus {
        fn join(&mut self, id: &str) -> Joined {
            if self.members.iter().any(|m| m.local_id().as_str() == id) {
                return Joined::Admitted;
            }
            if self.members.len() >= ROOM_CAPACITY {
                return Joined::LinkRefused;
            }
            let mut joiner = session(id);
            let peers = self.members.iter().map(|m| m.local_id().clone()).collect();
            joiner.on_link_status(LinkStatus::Connected { peers });
            for member in &mut self.members {
                member.on_link_status(LinkStatus::PeerJoined(PeerId::new(id)));
            }
            self.members.push(joiner);
            self.flush();

            let full = self.members.iter().any(|m| m.is_full());
            // A full session releases its link
            self.members.retain(|m| !m.is_full());
            if full {
                Joined::DocumentFull
            } else {
                Joined::Admitted
            }
        }

        fn leave(&mut self, id: &str) {
            let Some(index) = self.members.iter().position(|m| m.local_id().as_str() == id) else {
                return;
            };
            let mut gone = self.members.remove(index);
            gone.leave();
            for member in &mut self.members {
                member.on_link_status(LinkStatus::PeerLeft(PeerId::new(id)));
            }
            self.flush();
        }

        fn flush(&mut self) {
            for _ in 0..16 {
                let mut frames = Vec::new();
                for (i, member) in self.members.iter_mut().enumerate() {
                    member.drain_changes();
                    frames.extend(member.take_outbox().into_iter().map(|msg| (i, msg)));
                }
                if frames.is_empty() {
                    return;
                }
                for (from, msg) in frames {
                    for (i, member) in self.members.iter_mut().enumerate() {
                        if i != from {
                            member.on_message(msg.clone());
                        }
                    }
                }
            }
            panic!("room never went quiet");
        }
    }

    proptest! {
        #[test]
        fn prop_room_never_exceeds_capacity(
            ops in proptest::collection::vec((0u8..3, 0usize..4), 1..40),
        ) {
            let mut bus = Bus::default();

            for (op, peer) in ops {
                let id = format!("p{peer}");
                let joined = if op < 2 { Some(bus.join(&id)) } else { bus.leave(&id); None };

                prop_assert!(bus.members.len() <= ROOM_CAPACITY);
                for member in &bus.members {
                    let records = member.document().participants();
                    prop_assert!(records.len() <= ROOM_CAPACITY);
                    prop_assert!(records.contains_key(member.local_id()));
                }

                // Turned away by the document: no entry anywhere
                if joined == Some(Joined::DocumentFull) {
                    let id = PeerId::new(id);
                    prop_assert!(!bus.members.is_empty());
                    for member in &bus.members {
                        let records = member.document().participants();
                        prop_assert_eq!(records.len(), ROOM_CAPACITY);
                        prop_assert!(!records.contains_key(&id));
                    }
                }
            }
        }
    }
}
