//! WebSocket Relay
//!
//! Room-scoped frame relay standing in for a discovery/signalling service.
//! Admits at most two peers per room, announces joins and leaves, and
//! forwards peer frames byte-for-byte. It never decodes game state and has
//! no say in the simulation.
//!
//! [`WsConnector`] is the client side, implementing [`Connector`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::config::RelayConfig;
use crate::game::state::PeerId;
use crate::network::protocol::WireMessage;
use crate::network::transport::{Connector, LinkEvent, LinkStatus, PeerLink, TransportError};
use crate::room::session::RoomId;
use crate::{ROOM_CAPACITY, VERSION};

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid config: {0}")]
    Config(String),
}

type Members = BTreeMap<PeerId, mpsc::UnboundedSender<Message>>;

/// The relay server.
pub struct RelayServer {
    /// Relay configuration.
    config: RelayConfig,
    /// Rooms and their members' outbound queues.
    rooms: Arc<RwLock<BTreeMap<RoomId, Members>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    /// Create a new relay.
    pub fn new(config: RelayConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            rooms: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), RelayError> {
        self.config.validate().map_err(RelayError::Config)?;
        let listener = TcpListener::bind(self.config.bind_address).await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Serve connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Relay listening on {}", addr),
            Err(e) => warn!("Relay listening on unknown address: {}", e),
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let rooms = self.rooms.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();

            // First frame must be a hello
            let hello = tokio::time::timeout(config.handshake_timeout, ws_receiver.next()).await;
            let (room, peer) = match hello {
                Ok(Some(Ok(Message::Binary(data)))) => match WireMessage::from_bytes(&data) {
                    Ok(WireMessage::Hello { room, peer, version }) => {
                        if version != VERSION {
                            warn!(%peer, %version, "Peer runs a different version");
                        }
                        (room, peer)
                    }
                    Ok(other) => {
                        debug!("Expected hello from {}, got {}", addr, other.kind());
                        return;
                    }
                    Err(e) => {
                        debug!("Invalid hello from {}: {}", addr, e);
                        return;
                    }
                },
                Ok(_) => {
                    debug!("Client {} left before hello", addr);
                    return;
                }
                Err(_) => {
                    debug!("Client {} timed out before hello", addr);
                    return;
                }
            };

            let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();

            // Admit or reject
            let admitted = {
                let mut rooms = rooms.write().await;
                let at_room_limit = !rooms.contains_key(&room) && rooms.len() >= config.max_rooms;
                let members = rooms.get(&room);
                let full = members.is_some_and(|m| m.len() >= ROOM_CAPACITY && !m.contains_key(&peer));

                if full || at_room_limit {
                    None
                } else {
                    let members = rooms.entry(room.clone()).or_default();
                    let existing: Vec<PeerId> =
                        members.keys().filter(|id| **id != peer).cloned().collect();
                    broadcast_frame(members, &peer, &WireMessage::PeerJoined { peer: peer.clone() });
                    members.insert(peer.clone(), msg_tx.clone());
                    Some(existing)
                }
            };

            let Some(existing) = admitted else {
                info!(%room, %peer, "Rejecting join: room full");
                if let Ok(bytes) = (WireMessage::RoomFull { room: room.clone() }).to_bytes() {
                    let _ = ws_sender.send(Message::Binary(bytes)).await;
                }
                let _ = ws_sender.close().await;
                return;
            };

            info!(%room, %peer, %addr, others = existing.len(), "Peer joined room");
            match (WireMessage::Welcome { peers: existing }).to_bytes() {
                Ok(bytes) => {
                    let _ = msg_tx.send(Message::Binary(bytes));
                }
                Err(e) => error!("Failed to serialize welcome: {}", e),
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    if ws_sender.send(msg).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            // Forward frames verbatim
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                let rooms = rooms.read().await;
                                if let Some(members) = rooms.get(&room) {
                                    for (id, tx) in members {
                                        if *id != peer {
                                            let _ = tx.send(Message::Binary(data.clone()));
                                        }
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();

            // Cleanup
            let mut rooms = rooms.write().await;
            let still_ours = rooms
                .get(&room)
                .and_then(|m| m.get(&peer))
                .is_some_and(|tx| tx.same_channel(&msg_tx));
            if still_ours {
                if let Some(members) = rooms.get_mut(&room) {
                    members.remove(&peer);
                    broadcast_frame(members, &peer, &WireMessage::PeerLeft { peer: peer.clone() });
                    if members.is_empty() {
                        rooms.remove(&room);
                    }
                }
                info!(%room, %peer, "Peer left room");
            }
        });
    }

    /// Shutdown the relay.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of open rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of admitted peers across all rooms.
    pub async fn connection_count(&self) -> usize {
        self.rooms.read().await.values().map(|m| m.len()).sum()
    }
}

/// Send a relay-originated message to every member except `skip`.
fn broadcast_frame(members: &Members, skip: &PeerId, msg: &WireMessage) {
    let bytes = match msg.to_bytes() {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to serialize {}: {}", msg.kind(), e);
            return;
        }
    };
    for (id, tx) in members {
        if id != skip {
            let _ = tx.send(Message::Binary(bytes.clone()));
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Connects peers to a [`RelayServer`] over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    queue_depth: usize,
}

impl WsConnector {
    /// Connector for the relay at `url` (`ws://host:port`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            queue_depth: 64,
        }
    }

    /// Relay URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    async fn connect(&self, room: &RoomId, peer: &PeerId) -> Result<PeerLink, TransportError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", self.url, e)))?;
        let (mut ws_sender, mut ws_receiver) = ws.split();

        let hello = WireMessage::Hello {
            room: room.clone(),
            peer: peer.clone(),
            version: VERSION.to_string(),
        };
        ws_sender.send(Message::Binary(hello.to_bytes()?)).await?;

        let peers = loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Binary(data))) => match WireMessage::from_bytes(&data)? {
                    WireMessage::Welcome { peers } => break peers,
                    WireMessage::RoomFull { room } => return Err(TransportError::RoomFull(room)),
                    other => {
                        return Err(TransportError::Handshake(format!("unexpected {}", other.kind())))
                    }
                },
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        };
        info!(%room, %peer, others = peers.len(), "Connected to relay");

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::channel::<WireMessage>(self.queue_depth);
        let _ = in_tx.send(LinkEvent::Status(LinkStatus::Connected { peers }));

        // Writer: outbound queue -> socket
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let bytes = match msg.to_bytes() {
                    Ok(b) => b,
                    Err(e) => {
                        error!("Failed to serialize {}: {}", msg.kind(), e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Binary(bytes)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        // Reader: socket -> inbound events
        tokio::spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                let data = match frame {
                    Ok(Message::Binary(data)) => data,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Relay connection error: {}", e);
                        break;
                    }
                };
                let event = match WireMessage::from_bytes(&data) {
                    Ok(WireMessage::PeerJoined { peer }) => LinkEvent::Status(LinkStatus::PeerJoined(peer)),
                    Ok(WireMessage::PeerLeft { peer }) => LinkEvent::Status(LinkStatus::PeerLeft(peer)),
                    Ok(msg) => LinkEvent::Message(msg),
                    Err(e) => {
                        warn!("Dropping undecodable frame: {}", e);
                        continue;
                    }
                };
                if in_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = in_tx.send(LinkEvent::Status(LinkStatus::Disconnected));
        });

        Ok(PeerLink::new(out_tx, in_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::field::{DocUpdate, FieldKey, FieldValue, Stamp};

    async fn start_relay() -> (Arc<RelayServer>, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(RelayServer::new(RelayConfig::default()));
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, format!("ws://{}", addr))
    }

    #[tokio::test]
    async fn test_relay_forwards_between_two_peers() {
        let (server, url) = start_relay().await;
        let connector = WsConnector::new(url);
        let room = RoomId::new("relayroom");

        let mut a = connector.connect(&room, &PeerId::new("a")).await.unwrap();
        assert_eq!(
            a.recv().await,
            Some(LinkEvent::Status(LinkStatus::Connected { peers: vec![] }))
        );

        let mut b = connector.connect(&room, &PeerId::new("b")).await.unwrap();
        assert_eq!(
            b.recv().await,
            Some(LinkEvent::Status(LinkStatus::Connected { peers: vec![PeerId::new("a")] }))
        );
        assert_eq!(
            a.recv().await,
            Some(LinkEvent::Status(LinkStatus::PeerJoined(PeerId::new("b"))))
        );

        let msg = WireMessage::Update {
            from: PeerId::new("b"),
            update: DocUpdate {
                key: FieldKey::Running,
                stamp: Stamp::new(1, PeerId::new("b")),
                value: FieldValue::Running(true),
            },
        };
        b.send(msg.clone()).await.unwrap();
        assert_eq!(a.recv().await, Some(LinkEvent::Message(msg)));

        assert_eq!(server.room_count().await, 1);
        assert_eq!(server.connection_count().await, 2);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_relay_rejects_third_peer() {
        let (server, url) = start_relay().await;
        let connector = WsConnector::new(url);
        let room = RoomId::new("crowded");

        let _a = connector.connect(&room, &PeerId::new("a")).await.unwrap();
        let _b = connector.connect(&room, &PeerId::new("b")).await.unwrap();
        let third = connector.connect(&room, &PeerId::new("c")).await;

        assert!(matches!(third, Err(TransportError::RoomFull(_))));
        assert_eq!(server.connection_count().await, 2);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_relay_announces_leave() {
        let (server, url) = start_relay().await;
        let connector = WsConnector::new(url);
        let room = RoomId::new("leaving");

        let mut a = connector.connect(&room, &PeerId::new("a")).await.unwrap();
        a.recv().await;
        let b = connector.connect(&room, &PeerId::new("b")).await.unwrap();
        a.recv().await;

        drop(b);

        assert_eq!(
            a.recv().await,
            Some(LinkEvent::Status(LinkStatus::PeerLeft(PeerId::new("b"))))
        );
        server.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let server = RelayServer::new(RelayConfig {
            max_rooms: 0,
            ..Default::default()
        });
        assert!(matches!(server.run().await, Err(RelayError::Config(_))));
    }
}
