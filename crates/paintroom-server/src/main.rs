//! Paintroom WebSocket Relay Server
//!
//! Relays drawing events between peers in the same room and keeps each room's presence
//! state. The relay never looks inside an envelope's payload; reconciliation happens
//! between peers.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "room": "paint-room", "peer_id": "…" }
//! { "type": "track", "meta": { "online_at": "2024-01-01T00:00:00Z" } }
//! { "type": "broadcast", "event": "stroke", "payload": { … } }
//! { "type": "leave" }
//! ```

mod state;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use clap::Parser;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use paintroom_core::protocol::PeerId;
use paintroom_core::transport::{ClientFrame, ServerFrame};
use serde::Serialize;
use state::{AppState, RoomFrame};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "paintroom-server", about = "WebSocket relay for Paintroom rooms")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "PAINTROOM_BIND", default_value = "0.0.0.0:3030")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paintroom_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("Paintroom relay server listening on {}", args.bind);
    info!("WebSocket endpoint: ws://{}/ws", args.bind);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app).await
}

/// Index page
async fn index() -> &'static str {
    "Paintroom Relay Server - Connect via WebSocket at /ws"
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    rooms: usize,
    peers: usize,
}

/// Health check
async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        rooms: state.room_count(),
        peers: state.total_peers(),
    })
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type Sender = SplitSink<WebSocket, Message>;

/// Serialize and send a frame. Returns false if the socket is gone.
async fn send_frame(sender: &mut Sender, frame: &ServerFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode frame: {}", e);
            true
        }
    }
}

/// What to do with one receive from a room channel.
#[derive(Debug, PartialEq)]
enum Route {
    Forward(ServerFrame),
    Skip,
    /// The channel is gone; stop listening to it.
    Detach,
}

fn route(msg: Result<RoomFrame, RecvError>, me: &PeerId) -> Route {
    match msg {
        // Don't echo back to sender
        Ok((Some(from), _)) if &from == me => Route::Skip,
        Ok((_, frame)) => Route::Forward(frame),
        Err(RecvError::Lagged(n)) => {
            warn!("{} fell behind by {} frames", me, n);
            Route::Skip
        }
        Err(RecvError::Closed) => Route::Detach,
    }
}

/// The room a connection is in.
struct Membership {
    room: String,
    peer: PeerId,
    rx: broadcast::Receiver<RoomFrame>,
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    debug!("New connection");

    let (mut sender, mut receiver) = socket.split();
    let mut membership: Option<Membership> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!("Invalid message: {}", e);
                                let err = ServerFrame::Error {
                                    message: format!("Invalid message: {}", e),
                                };
                                if !send_frame(&mut sender, &err).await {
                                    break;
                                }
                                continue;
                            }
                        };
                        match frame {
                            ClientFrame::Join { room, peer_id } => {
                                if let Some(old) = membership.take() {
                                    state.leave_room(&old.room, &old.peer);
                                }
                                let Some((rx, peer_count)) = state.join_room(&room, &peer_id) else {
                                    warn!("Peer id {} already in use in room {}", peer_id, room);
                                    let err = ServerFrame::Error {
                                        message: format!("Peer id {} is already in room {}", peer_id, room),
                                    };
                                    if !send_frame(&mut sender, &err).await {
                                        break;
                                    }
                                    continue;
                                };
                                info!("Peer {} joined room {} ({} peers)", peer_id, room, peer_count);
                                membership = Some(Membership { room: room.clone(), peer: peer_id, rx });

                                let joined = ServerFrame::Joined { room, peer_count };
                                if !send_frame(&mut sender, &joined).await {
                                    break;
                                }
                            }
                            ClientFrame::Leave => {
                                if let Some(old) = membership.take() {
                                    state.leave_room(&old.room, &old.peer);
                                    info!("Peer {} left room {}", old.peer, old.room);
                                }
                            }
                            ClientFrame::Broadcast { envelope } => match &membership {
                                Some(m) => {
                                    debug!("'{}' from {} in {}", envelope.event, m.peer, m.room);
                                    state.broadcast(&m.room, Some(&m.peer), ServerFrame::Broadcast {
                                        from: m.peer.clone(),
                                        envelope,
                                    });
                                }
                                None => {
                                    let err = ServerFrame::Error { message: "Not in a room".to_string() };
                                    if !send_frame(&mut sender, &err).await {
                                        break;
                                    }
                                }
                            },
                            ClientFrame::Track { meta } => {
                                if let Some(m) = &membership {
                                    state.track(&m.room, &m.peer, meta);
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary, ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            // Handle broadcast frames from the room
            msg = async {
                match &mut membership {
                    Some(m) => m.rx.recv().await,
                    None => std::future::pending::<Result<RoomFrame, RecvError>>().await,
                }
            } => {
                let Some(m) = &membership else { continue };
                match route(msg, &m.peer) {
                    Route::Forward(frame) => {
                        if !send_frame(&mut sender, &frame).await {
                            break;
                        }
                    }
                    Route::Skip => {}
                    Route::Detach => {
                        warn!("Room {} closed under {}", m.room, m.peer);
                        membership = None;
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(m) = membership {
        state.leave_room(&m.room, &m.peer);
        info!("Connection closed: {}", m.peer);
    }
}
