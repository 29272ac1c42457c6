//! Room-scoped broadcast channel with presence.
//!
//! A [`Transport`] joins one room, publishes [`Envelope`]s to every other peer in it and
//! reports what happened through [`Transport::poll_events`]. Delivery is best effort:
//! no ordering across senders and no guarantee every message arrives.
//!
//! Two implementations ship with the crate: [`MemoryHub`] for tests and simulations, and
//! [`NativeChannel`] which talks to the relay server over WebSocket.

mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod native;

pub use memory::{MemoryChannel, MemoryHub};
#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeChannel;

use crate::protocol::{Envelope, PeerId, PresenceMeta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Not in a room")]
    NotJoined,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Frames sent from a peer to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe to a room as `peer_id`.
    Join { room: String, peer_id: PeerId },
    /// Unsubscribe from the current room.
    Leave,
    /// Send an envelope to every other peer in the room.
    Broadcast {
        #[serde(flatten)]
        envelope: Envelope,
    },
    /// Publish this peer's presence metadata.
    Track { meta: PresenceMeta },
}

/// Frames sent from the relay to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Subscription confirmed.
    Joined { room: String, peer_count: usize },
    /// An envelope from another peer.
    Broadcast {
        from: PeerId,
        #[serde(flatten)]
        envelope: Envelope,
    },
    /// Full presence state of the room.
    Presence {
        members: BTreeMap<PeerId, PresenceMeta>,
    },
    /// Something went wrong on the relay side.
    Error { message: String },
}

/// Events surfaced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The connection is up; the peer may now join a room.
    Connected,
    /// The connection went away.
    Disconnected,
    /// The room subscription is active.
    Subscribed { room: String, peer_count: usize },
    /// An envelope published by another peer.
    Message { from: PeerId, envelope: Envelope },
    /// The room's presence state changed.
    Presence(BTreeMap<PeerId, PresenceMeta>),
    /// A transport-level error.
    Error { message: String },
}

impl From<ServerFrame> for ChannelEvent {
    fn from(frame: ServerFrame) -> Self {
        match frame {
            ServerFrame::Joined { room, peer_count } => ChannelEvent::Subscribed { room, peer_count },
            ServerFrame::Broadcast { from, envelope } => ChannelEvent::Message { from, envelope },
            ServerFrame::Presence { members } => ChannelEvent::Presence(members),
            ServerFrame::Error { message } => ChannelEvent::Error { message },
        }
    }
}

/// A room-scoped broadcast channel.
pub trait Transport {
    /// Subscribe to `room` as `peer`. Completion is reported by [`ChannelEvent::Subscribed`].
    fn join(&mut self, room: &str, peer: &PeerId) -> TransportResult<()>;

    /// Leave the current room.
    fn leave(&mut self) -> TransportResult<()>;

    /// Broadcast to every other peer in the room. The sender does not get its own message.
    fn publish(&mut self, envelope: &Envelope) -> TransportResult<()>;

    /// Publish presence metadata for this peer.
    fn track(&mut self, meta: &PresenceMeta) -> TransportResult<()>;

    /// Drain pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<ChannelEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_serialize() {
        let frame = ClientFrame::Join {
            room: "paint-room".to_string(),
            peer_id: PeerId::from("p1"),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "join");
        assert_eq!(json["room"], "paint-room");
        assert_eq!(json["peer_id"], "p1");
    }

    #[test]
    fn test_broadcast_frame_is_flat() {
        let frame = ClientFrame::Broadcast {
            envelope: Envelope {
                event: "clear".to_string(),
                payload: serde_json::json!({}),
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"broadcast","event":"clear","payload":{}}"#);
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_server_frame_deserialize() {
        let json = r#"{"type":"broadcast","from":"p2","event":"sync-request","payload":{"requesterId":"p2"}}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        match ChannelEvent::from(frame) {
            ChannelEvent::Message { from, envelope } => {
                assert_eq!(from, PeerId::from("p2"));
                assert_eq!(envelope.event, "sync-request");
                assert_eq!(envelope.payload["requesterId"], "p2");
            }
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_joined_becomes_subscribed() {
        let json = r#"{"type":"joined","room":"test","peer_count":2}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert_eq!(
            ChannelEvent::from(frame),
            ChannelEvent::Subscribed { room: "test".to_string(), peer_count: 2 }
        );
    }
}
