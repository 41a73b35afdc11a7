//! Peer Runtime
//!
//! Drives one [`RoomSession`] on a single task: link events, renderer
//! commands and scheduler ticks are handled one at a time, so the tick never
//! overlaps a document reaction. Renderers talk to the task through a
//! [`PeerHandle`].

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::PeerConfig;
use crate::core::grid::Direction;
use crate::game::events::GameEvent;
use crate::game::state::PeerId;
use crate::network::transport::{Connector, LinkEvent, LinkStatus, PeerLink, TransportError};
use crate::room::scheduler::TickScheduler;
use crate::room::session::{RoomId, RoomSession, SessionError};
use crate::room::snapshot::RoomSnapshot;
use crate::TICK_PERIOD;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Request from a renderer to the peer task.
#[derive(Debug)]
pub enum PeerCommand {
    /// Publish a direction for the local snake.
    ChangeDirection {
        /// Requested heading
        direction: Direction,
        /// `Ok(false)` when a reversal was dropped
        reply: Reply<bool>,
    },
    /// Start a game (authority only).
    StartGame {
        /// Outcome of the request
        reply: Reply<()>,
    },
    /// Reset the board (authority only).
    ResetGame {
        /// Outcome of the request
        reply: Reply<()>,
    },
    /// Leave the room and stop the task.
    Leave,
}

/// Renderer-side handle to a peer in a room.
#[derive(Debug)]
pub struct PeerHandle {
    room: RoomId,
    local: PeerId,
    commands: mpsc::Sender<PeerCommand>,
    snapshots: watch::Receiver<RoomSnapshot>,
    events: broadcast::Sender<GameEvent>,
    task: Option<JoinHandle<()>>,
}

impl PeerHandle {
    /// Create a fresh room and join it as its first participant.
    pub async fn create_room<C: Connector>(
        connector: &C,
        config: PeerConfig,
    ) -> Result<Self, SessionError> {
        let room = RoomId::generate();
        info!(room = %room, "Creating room");
        Self::join_room(connector, room, config).await
    }

    /// Join an existing room under a fresh identity.
    pub async fn join_room<C: Connector>(
        connector: &C,
        room: RoomId,
        config: PeerConfig,
    ) -> Result<Self, SessionError> {
        Self::join_room_as(connector, room, PeerId::generate(), config).await
    }

    /// Join a room under a given identity.
    ///
    /// A transport-level capacity rejection is not an error: the handle comes
    /// back with `room_full` set and no task behind it.
    #[instrument(skip_all, fields(room = %room, peer = %local))]
    pub async fn join_room_as<C: Connector>(
        connector: &C,
        room: RoomId,
        local: PeerId,
        config: PeerConfig,
    ) -> Result<Self, SessionError> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let link = match connector.connect(&room, &local).await {
            Ok(link) => link,
            Err(TransportError::RoomFull(_)) => {
                warn!("Transport rejected join, room full");
                return Ok(Self::rejected(room, local, events));
            }
            Err(e) => return Err(e.into()),
        };

        let session = RoomSession::new(room.clone(), local.clone(), &config);
        let (snapshot_tx, snapshots) = watch::channel(session.snapshot());
        let (commands, command_rx) = mpsc::channel(config.queue_depth.max(1));

        let task = tokio::spawn(run_peer(
            session,
            link,
            command_rx,
            snapshot_tx,
            events.clone(),
            TICK_PERIOD,
        ));

        Ok(Self {
            room,
            local,
            commands,
            snapshots,
            events,
            task: Some(task),
        })
    }

    fn rejected(room: RoomId, local: PeerId, events: broadcast::Sender<GameEvent>) -> Self {
        let mut snapshot = RoomSnapshot::empty(room.clone(), local.clone());
        snapshot.room_full = true;
        let (_, snapshots) = watch::channel(snapshot);
        let (commands, _) = mpsc::channel(1);

        Self {
            room,
            local,
            commands,
            snapshots,
            events,
            task: None,
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

    /// Link that lets a friend join this room.
    pub fn share_link(&self, base: &str) -> String {
        self.room.share_link(base)
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch snapshots as they change.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshots.clone()
    }

    /// Game events (eliminations, items eaten, game end) seen by this peer.
    ///
    /// Only the authoritative peer produces them.
    pub fn subscribe_events(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    /// Publish a direction for the local snake.
    pub async fn change_direction(&self, direction: Direction) -> Result<bool, SessionError> {
        self.request(|reply| PeerCommand::ChangeDirection { direction, reply }).await
    }

    /// Start a game (authority only).
    pub async fn start_game(&self) -> Result<(), SessionError> {
        self.request(|reply| PeerCommand::StartGame { reply }).await
    }

    /// Reset the board (authority only).
    pub async fn reset_game(&self) -> Result<(), SessionError> {
        self.request(|reply| PeerCommand::ResetGame { reply }).await
    }

    /// Leave the room and wait for the task to wind down.
    pub async fn leave(mut self) {
        let _ = self.commands.send(PeerCommand::Leave).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(room = %self.room, error = %e, "Peer task failed");
            }
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> PeerCommand,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(make(reply)).await.is_err() {
            return Err(self.closed_error());
        }
        response.await.map_err(|_| self.closed_error())?
    }

    fn closed_error(&self) -> SessionError {
        if self.snapshots.borrow().room_full {
            SessionError::RoomFull(self.room.clone())
        } else {
            SessionError::Closed
        }
    }
}

// =============================================================================
// EVENT LOOP
// =============================================================================

async fn run_peer(
    mut session: RoomSession,
    mut link: PeerLink,
    mut commands: mpsc::Receiver<PeerCommand>,
    snapshots: watch::Sender<RoomSnapshot>,
    events: broadcast::Sender<GameEvent>,
    period: Duration,
) {
    let mut scheduler = TickScheduler::new(period);
    let mut link_open = true;

    loop {
        let mut leaving = false;

        tokio::select! {
            event = link.recv(), if link_open => {
                match event {
                    Some(LinkEvent::Status(status)) => session.on_link_status(status),
                    Some(LinkEvent::Message(msg)) => session.on_message(msg),
                    None => {
                        link_open = false;
                        session.on_link_status(LinkStatus::Disconnected);
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    // Publish before replying so the caller's next snapshot has the change
                    Some(PeerCommand::ChangeDirection { direction, reply }) => {
                        let result = session.change_direction(direction);
                        publish(&session, &snapshots);
                        let _ = reply.send(result);
                    }
                    Some(PeerCommand::StartGame { reply }) => {
                        let result = session.start_game();
                        publish(&session, &snapshots);
                        let _ = reply.send(result);
                    }
                    Some(PeerCommand::ResetGame { reply }) => {
                        let result = session.reset_game();
                        publish(&session, &snapshots);
                        let _ = reply.send(result);
                    }
                    Some(PeerCommand::Leave) | None => {
                        session.leave();
                        leaving = true;
                    }
                }
            }
            _ = scheduler.tick() => {
                if let Err(e) = session.run_tick() {
                    debug!(error = %e, "Tick skipped");
                }
            }
        }

        session.drain_changes();

        for msg in session.take_outbox() {
            if !link_open || leaving {
                break;
            }
            if let Err(e) = link.send(msg).await {
                warn!(room = %session.room(), error = %e, "Send failed, link closed");
                link_open = false;
                session.on_link_status(LinkStatus::Disconnected);
            }
        }

        publish(&session, &snapshots);

        for event in session.take_events() {
            let _ = events.send(event);
        }

        scheduler.reconcile(session.should_tick());

        if leaving {
            break;
        }
        if session.is_full() {
            // Free the transport slot for the entry holders
            info!(room = %session.room(), "Room full, releasing link");
            break;
        }
    }

    debug!(room = %session.room(), peer = %session.local_id(), "Peer task stopped");
}

/// Push the session's view to renderers if it changed.
fn publish(session: &RoomSession, snapshots: &watch::Sender<RoomSnapshot>) {
    let next = session.snapshot();
    snapshots.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
