//! Runtime configuration.
//!
//! Board size and tick period are compiled in (see the crate root); the
//! knobs here cover channel sizing and the relay.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::game::tick::EngineConfig;

/// Per-peer configuration
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Simulation rules used when this peer is the authority
    pub engine: EngineConfig,
    /// Backlog of document change notifications before a full resync
    pub change_capacity: usize,
    /// Depth of the command and outbound queues
    pub queue_depth: usize,
    /// Backlog of game events kept for slow observers
    pub event_capacity: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            change_capacity: 1024,
            queue_depth: 64,
            event_capacity: 256,
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the relay listens on
    pub bind_address: SocketAddr,
    /// Maximum number of concurrent rooms
    pub max_rooms: usize,
    /// URL peers use to reach the relay
    pub url: String,
    /// How long a new connection gets to send its hello
    pub handshake_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 9001),
            max_rooms: 100,
            url: "ws://127.0.0.1:9001".to_string(),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RELAY_BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid RELAY_BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(max_rooms) = std::env::var("RELAY_MAX_ROOMS") {
            if let Ok(parsed) = max_rooms.parse::<usize>() {
                if parsed > 0 && parsed <= 10000 {
                    config.max_rooms = parsed;
                } else {
                    tracing::warn!("RELAY_MAX_ROOMS must be 1-10000, using default");
                }
            } else {
                tracing::warn!("Invalid RELAY_MAX_ROOMS '{}', using default", max_rooms);
            }
        }

        if let Ok(url) = std::env::var("RELAY_URL") {
            if url.starts_with("ws://") || url.starts_with("wss://") {
                config.url = url;
            } else {
                tracing::warn!("RELAY_URL must start with ws:// or wss://, using default");
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_address.port() == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_rooms == 0 {
            return Err("max_rooms must be at least 1".to_string());
        }
        if self.handshake_timeout.is_zero() {
            return Err("handshake_timeout must be positive".to_string());
        }
        Ok(())
    }
}
