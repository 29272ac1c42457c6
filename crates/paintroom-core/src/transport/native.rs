//! WebSocket connection to the relay server for native platforms.

use super::{ChannelEvent, ClientFrame, ServerFrame, Transport, TransportError, TransportResult};
use crate::protocol::{Envelope, PeerId, PresenceMeta};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

const LOG_PREVIEW_CHARS: usize = 100;

/// The first [`LOG_PREVIEW_CHARS`] characters of a frame, cut on a char boundary.
fn log_preview(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// Relay connection backed by a background thread.
///
/// Events from the socket are collected by the thread and handed out by
/// [`Transport::poll_events`], so the host loop never blocks on the network.
pub struct NativeChannel {
    cmd_tx: Option<Sender<WsCommand>>,
    event_rx: Option<Receiver<ChannelEvent>>,
    joined: bool,
    _thread: Option<JoinHandle<()>>,
}

impl NativeChannel {
    /// Create a disconnected channel.
    pub fn new() -> Self {
        Self {
            cmd_tx: None,
            event_rx: None,
            joined: false,
            _thread: None,
        }
    }

    /// Connect to a relay at `url` (`ws://` or `wss://`).
    pub fn connect(&mut self, url: &str) -> TransportResult<()> {
        if self.cmd_tx.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<ChannelEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || run_socket(&url, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    /// Close the connection.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.joined = false;
    }

    /// Whether a connection was opened and not yet closed.
    pub fn is_open(&self) -> bool {
        self.cmd_tx.is_some()
    }

    fn send(&self, frame: &ClientFrame) -> TransportResult<()> {
        let tx = self.cmd_tx.as_ref().ok_or(TransportError::NotConnected)?;
        let text = serde_json::to_string(frame)?;
        tx.send(WsCommand::Send(text))
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

impl Default for NativeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Transport for NativeChannel {
    fn join(&mut self, room: &str, peer: &PeerId) -> TransportResult<()> {
        self.send(&ClientFrame::Join {
            room: room.to_string(),
            peer_id: peer.clone(),
        })?;
        self.joined = true;
        Ok(())
    }

    fn leave(&mut self) -> TransportResult<()> {
        self.joined = false;
        self.send(&ClientFrame::Leave)
    }

    fn publish(&mut self, envelope: &Envelope) -> TransportResult<()> {
        if !self.joined {
            return Err(TransportError::NotJoined);
        }
        self.send(&ClientFrame::Broadcast {
            envelope: envelope.clone(),
        })
    }

    fn track(&mut self, meta: &PresenceMeta) -> TransportResult<()> {
        if !self.joined {
            return Err(TransportError::NotJoined);
        }
        self.send(&ClientFrame::Track { meta: meta.clone() })
    }

    fn poll_events(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();
        if let Some(ref rx) = self.event_rx {
            loop {
                match rx.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.cmd_tx = None;
                        self.joined = false;
                        break;
                    }
                }
            }
        }
        if events
            .iter()
            .any(|e| matches!(e, ChannelEvent::Disconnected | ChannelEvent::Error { .. }))
        {
            self.joined = false;
        }
        events
    }
}

/// Socket loop: forward commands out, decode frames in.
fn run_socket(url: &str, cmd_rx: Receiver<WsCommand>, event_tx: Sender<ChannelEvent>) {
    log::info!("WebSocket thread: connecting to {}", url);

    let (mut socket, response) = match connect(url) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("WebSocket connection failed: {}", e);
            let _ = event_tx.send(ChannelEvent::Error {
                message: format!("Connection failed: {}", e),
            });
            return;
        }
    };
    log::info!("WebSocket connected, status: {}", response.status());
    let _ = event_tx.send(ChannelEvent::Connected);

    // Short read timeout so the loop can service outgoing commands.
    match socket.get_mut() {
        tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }
        #[allow(unreachable_patterns)]
        _ => log::debug!("Non-plain stream, relying on default timeouts"),
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(text)) => {
                log::trace!("WebSocket sending: {}", log_preview(&text));
                if let Err(e) = socket.send(Message::Text(text)) {
                    log::error!("WebSocket send error: {}", e);
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                Ok(frame) => {
                    if event_tx.send(ChannelEvent::from(frame)).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("Failed to parse relay frame: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                break;
            }
        }
    }

    log::info!("WebSocket thread exiting");
    let _ = event_tx.send(ChannelEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_url() {
        let mut channel = NativeChannel::new();
        assert!(matches!(
            channel.connect("http://localhost:3030/ws"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(channel.connect("not a url"), Err(TransportError::InvalidUrl(_))));
        assert!(!channel.is_open());
    }

    #[test]
    fn test_log_preview_respects_char_boundaries() {
        let frame = ClientFrame::Broadcast {
            envelope: Envelope {
                event: "stroke".to_string(),
                payload: serde_json::json!({ "color": "é".repeat(80) }),
            },
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.len() > LOG_PREVIEW_CHARS);
        let preview = log_preview(&text);
        assert_eq!(preview.chars().count(), LOG_PREVIEW_CHARS);
        assert!(text.starts_with(preview));
        assert_eq!(log_preview("short"), "short");
    }

    #[test]
    fn test_publish_requires_connection() {
        let mut channel = NativeChannel::new();
        assert!(matches!(channel.join("room", &PeerId::from("a")), Err(TransportError::NotConnected)));
        assert!(channel.poll_events().is_empty());
    }
}
