//! P2P Snake
//!
//! Command-line front end.
//!
//! ```text
//! p2p-snake relay                     run the WebSocket relay
//! p2p-snake play [ROOM_LINK]          create or join a room through the relay
//! p2p-snake solo [SPEED]              headless single-player run
//! p2p-snake demo                      two local peers over the in-memory hub
//! ```

use std::time::Duration;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use p2p_snake::{
    config::{PeerConfig, RelayConfig},
    game::events::GameEventData,
    network::{memory::MemoryHub, relay::{RelayServer, WsConnector}},
    room::{peer::PeerHandle, session::RoomId, snapshot::RoomSnapshot},
    Direction, SoloGame, Speed, GRID_SIZE, TICK_PERIOD_MS, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("P2P Snake v{}", VERSION);
    info!("Grid: {}x{}, tick: {} ms", GRID_SIZE, GRID_SIZE, TICK_PERIOD_MS);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("relay") => run_relay().await,
        Some("play") => play(args.get(1).map(String::as_str)).await,
        Some("solo") => run_solo(args.get(1).map(String::as_str)).await,
        Some("demo") | None => run_demo().await,
        Some(other) => bail!("unknown command `{}` (expected relay, play, solo or demo)", other),
    }
}

/// Run the relay until Ctrl-C.
async fn run_relay() -> anyhow::Result<()> {
    let config = RelayConfig::load_or_default();
    info!(
        "Relay config: {}, max_rooms={}",
        config.bind_address, config.max_rooms
    );

    let relay = RelayServer::new(config);
    tokio::select! {
        result = relay.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            relay.shutdown();
        }
    }
    Ok(())
}

/// Create a room (no argument) or join one from a link, then read commands
/// from stdin: `w`/`a`/`s`/`d` or arrow names, `start`, `reset`, `quit`.
async fn play(link: Option<&str>) -> anyhow::Result<()> {
    let config = RelayConfig::load_or_default();
    let connector = WsConnector::new(config.url.clone());

    let handle = match link {
        Some(link) => {
            let room = RoomId::from_link(link).or_else(|_| RoomId::parse(link))?;
            PeerHandle::join_room(&connector, room, PeerConfig::default()).await?
        }
        None => PeerHandle::create_room(&connector, PeerConfig::default()).await?,
    };

    info!("Room {} as {}", handle.room(), handle.local_id().short());
    info!("Share: {}", handle.share_link("https://p2p-snake.local/"));

    let mut snapshots = handle.subscribe_snapshots();
    let watcher = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snap = snapshots.borrow_and_update().clone();
            log_snapshot(&snap);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let command = line.trim();
        let result = match command {
            "" => continue,
            "quit" | "q" => break,
            "start" => handle.start_game().await.map(|_| true),
            "reset" => handle.reset_game().await.map(|_| true),
            key => match Direction::from_key(key) {
                Some(direction) => handle.change_direction(direction).await,
                None => {
                    warn!("Unknown command: {}", key);
                    continue;
                }
            },
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    handle.leave().await;
    watcher.abort();
    Ok(())
}

fn log_snapshot(snap: &RoomSnapshot) {
    if snap.room_full {
        warn!("Room {} is full", snap.room);
        return;
    }

    let scores: Vec<String> = snap
        .participants
        .values()
        .map(|p| format!("{}={}{}", p.id.short(), p.score, if p.alive { "" } else { "(dead)" }))
        .collect();
    info!(
        "running={} partner={} items={} scores=[{}] digest={}",
        snap.running,
        snap.partner_connected,
        snap.consumables.len(),
        scores.join(" "),
        &snap.digest_hex()[..12]
    );

    if let Some(won) = snap.won() {
        if !snap.running {
            info!("Game over: {}", if won { "you win" } else { "you lose" });
        }
    }
}

/// Headless single-player run with a fixed steering pattern.
async fn run_solo(speed: Option<&str>) -> anyhow::Result<()> {
    let speed = match speed {
        Some(label) => match Speed::from_label(label) {
            Some(speed) => speed,
            None => bail!("unknown speed `{}`", label),
        },
        None => Speed::default(),
    };

    let mut game = SoloGame::new(0x5EED);
    game.set_speed(speed);
    info!("Solo run at {} ({:?} per tick)", speed.label(), speed.period());

    // Sweep the board in a square spiral until something goes wrong
    let pattern = [Direction::Up, Direction::Right, Direction::Down, Direction::Left];
    game.set_direction(pattern[0]);

    let mut leg = 0usize;
    let mut steps = 0u32;
    let mut ticks = 0u32;
    while !game.is_game_over() && ticks < 2_000 {
        tokio::time::sleep(speed.period()).await;
        let result = game.tick();
        ticks += 1;
        steps += 1;

        for event in &result.events {
            info!("tick {}: {:?}", event.tick, event.data);
        }

        if steps as i32 >= GRID_SIZE / 2 - (leg / 2) as i32 {
            leg += 1;
            steps = 0;
            game.set_direction(pattern[leg % pattern.len()]);
        }
    }

    info!("Game over after {} ticks, score {}", ticks, game.score());
    Ok(())
}

/// Two peers in one process, one game, then compare their views.
async fn run_demo() -> anyhow::Result<()> {
    let hub = MemoryHub::default();

    let host = PeerHandle::create_room(&hub, PeerConfig::default()).await?;
    let guest = PeerHandle::join_room(&hub, host.room().clone(), PeerConfig::default()).await?;
    info!("Room {}: host {} guest {}", host.room(), host.local_id(), guest.local_id());

    let mut host_view = host.subscribe_snapshots();
    tokio::time::timeout(
        Duration::from_secs(5),
        host_view.wait_for(|s| s.participants.len() == 2),
    )
    .await
    .context("guest never appeared")??;

    let mut events = host.subscribe_events();
    guest.change_direction(Direction::Left).await?;
    host.start_game().await?;

    let outcome = loop {
        match events.recv().await {
            Ok(event) => {
                info!("tick {}: {:?}", event.tick, event.data);
                if let GameEventData::GameEnded { outcome } = event.data {
                    break outcome;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} events", skipped),
            Err(RecvError::Closed) => {
                error!("Event stream ended");
                bail!("game did not finish");
            }
        }
    };

    info!("Winner: {:?} ({:?})", outcome.winner, outcome.reason);

    // Let the last writes reach the guest
    let mut guest_view = guest.subscribe_snapshots();
    tokio::time::timeout(Duration::from_secs(2), guest_view.wait_for(|s| !s.running && s.outcome.is_some()))
        .await
        .context("guest never saw the end")??;

    let host_digest = host.snapshot().digest_hex();
    let guest_digest = guest.snapshot().digest_hex();
    info!("Host digest:  {}", host_digest);
    info!("Guest digest: {}", guest_digest);
    if host_digest != guest_digest {
        warn!("Replicas diverged");
    }

    guest.leave().await;
    host.leave().await;
    Ok(())
}
