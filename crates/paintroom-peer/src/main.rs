//! Headless Paintroom peer (native).
//!
//! Connects to a relay, joins a room, optionally draws a scripted set of strokes and
//! writes the final canvas to a PNG file.

mod script;

use clap::Parser;
use paintroom_core::{
    ConnectionState, EngineEvent, MembershipView, NativeChannel, Session, SyncConfig, SyncEngine,
};
use paintroom_render::{RasterConfig, RasterSurface};
use script::ScriptPlayer;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "paintroom-peer", about = "Headless Paintroom peer")]
struct Args {
    /// Relay WebSocket URL
    #[arg(long, env = "PAINTROOM_SERVER", default_value = "ws://localhost:3030/ws")]
    server: String,

    /// Room to join
    #[arg(long, env = "PAINTROOM_ROOM", default_value = paintroom_core::config::DEFAULT_ROOM)]
    room: String,

    /// Display name published with presence
    #[arg(long)]
    name: Option<String>,

    /// Canvas width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Canvas height in pixels
    #[arg(long, default_value_t = 600)]
    height: u32,

    /// JSON file with strokes to draw after joining
    #[arg(long)]
    script: Option<PathBuf>,

    /// Where to write the final canvas
    #[arg(long, default_value = "canvas.png")]
    output: PathBuf,

    /// How long to stay in the room, in seconds
    #[arg(long, default_value_t = 5.0)]
    duration: f64,

    /// Seed for the response backoff
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Error)]
enum PeerError {
    #[error(transparent)]
    Transport(#[from] paintroom_core::TransportError),
    #[error(transparent)]
    Script(#[from] script::ScriptError),
    #[error(transparent)]
    Raster(#[from] paintroom_render::RasterError),
    #[error("Invalid duration: {0}")]
    Duration(f64),
}

/// Logs the online count whenever it changes.
#[derive(Default)]
struct OnlineCount(Option<usize>);

impl MembershipView for OnlineCount {
    fn set_membership_count(&mut self, count: usize) {
        if self.0 != Some(count) {
            log::info!("{} online", count);
        }
        self.0 = Some(count);
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

/// Convert `--duration` to a [`Duration`], rejecting negative, NaN and overflowing values.
fn run_time(secs: f64) -> Result<Duration, PeerError> {
    Duration::try_from_secs_f64(secs).map_err(|_| PeerError::Duration(secs))
}

fn run(args: Args) -> Result<(), PeerError> {
    let duration = run_time(args.duration)?;

    let mut player = match &args.script {
        Some(path) => {
            let strokes = script::load(path)?;
            log::info!("Loaded {} strokes from {}", strokes.len(), path.display());
            Some(ScriptPlayer::new(strokes))
        }
        None => None,
    };

    let mut config = SyncConfig::default().with_room(args.room.clone());
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    let engine = SyncEngine::new(config);
    log::info!("Starting Paintroom peer {}", engine.peer_id());

    let mut channel = NativeChannel::new();
    channel.connect(&args.server)?;
    let mut session = Session::new(engine, channel);
    if let Some(name) = &args.name {
        session = session.with_name(name.clone());
    }

    let mut surface = RasterSurface::new(RasterConfig::default().with_size(args.width, args.height))?;
    let mut view = OnlineCount::default();
    let start = Instant::now();

    while start.elapsed() < duration {
        if session.state() == ConnectionState::Subscribed {
            if let Some(player) = player.as_mut() {
                player.step(session.engine_mut(), &mut surface);
            }
        }

        for event in session.pump(start.elapsed(), &mut surface, &mut view) {
            match event {
                EngineEvent::Synced { strokes } => log::info!("Caught up with {} strokes", strokes),
                EngineEvent::Ignored(reason) => log::debug!("Ignored input: {:?}", reason),
                other => log::debug!("{:?}", other),
            }
        }

        if matches!(session.state(), ConnectionState::Error | ConnectionState::Disconnected) {
            log::warn!("Connection lost, stopping early");
            break;
        }
        std::thread::sleep(FRAME_INTERVAL);
    }

    if player.as_ref().is_some_and(|p| !p.is_done()) {
        log::warn!("Script did not finish within {:?}", duration);
    }
    session.leave();
    log::info!("Leaving with {} strokes in the log", session.engine().log().len());

    surface.save_png(&args.output)?;
    Ok(())
}
