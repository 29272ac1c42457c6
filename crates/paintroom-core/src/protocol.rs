//! Wire protocol between peers.
//!
//! Every message travels over the relay as an [`Envelope`]: an event name and a JSON
//! payload. The relay only ever looks at the event name; peers decode the pair into a
//! [`SyncMessage`].
//!
//! ```json
//! { "event": "stroke", "payload": { "points": [{"x":0,"y":0},{"x":5,"y":5}], "color": "red", "size": 4, "tool": "pencil" } }
//! { "event": "drawing", "payload": { "points": [{"x":0,"y":0},{"x":5,"y":5}], "color": "red", "size": 4, "tool": "pencil" } }
//! { "event": "clear", "payload": {} }
//! { "event": "sync-request", "payload": { "requesterId": "…" } }
//! { "event": "sync-response", "payload": { "targetId": "…", "imageData": "data:image/png;base64,…", "strokes": [] } }
//! ```

use crate::stroke::{Segment, Stroke};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid data URL: {0}")]
    DataUrl(String),
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Session-scoped identity of a peer. Used as the presence key and to address
/// reconciliation responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Generate a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Liveness metadata a peer publishes through presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub online_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PresenceMeta {
    /// Metadata stamped with the current time.
    pub fn now() -> Self {
        Self {
            online_at: Utc::now(),
            name: None,
        }
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// An event name and its payload, as carried by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// Catch-up state sent to a joining peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Peer the response is meant for.
    #[serde(rename = "targetId")]
    pub target: PeerId,
    /// Canvas snapshot as a `data:` URL.
    #[serde(rename = "imageData")]
    pub image_data: String,
    /// The responder's event log.
    #[serde(default)]
    pub strokes: Vec<Stroke>,
}

/// Messages exchanged between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SyncMessage {
    /// A completed stroke. Authoritative; appended to the log.
    Stroke(Stroke),
    /// The newest segment of an in-progress stroke. Render-only, may be lost.
    #[serde(rename = "drawing")]
    Segment(Segment),
    /// Wipe the canvas and the log.
    Clear {},
    /// A joining peer asks for the current state.
    SyncRequest {
        #[serde(rename = "requesterId")]
        requester: PeerId,
    },
    /// Answer to a [`SyncMessage::SyncRequest`].
    SyncResponse(SyncResponse),
}

impl SyncMessage {
    /// Event name on the wire.
    pub fn event(&self) -> &'static str {
        match self {
            SyncMessage::Stroke(_) => "stroke",
            SyncMessage::Segment(_) => "drawing",
            SyncMessage::Clear {} => "clear",
            SyncMessage::SyncRequest { .. } => "sync-request",
            SyncMessage::SyncResponse(_) => "sync-response",
        }
    }

    /// Encode into an envelope.
    pub fn to_envelope(&self) -> ProtocolResult<Envelope> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    /// Decode from an envelope. A missing payload is read as `{}`.
    pub fn from_envelope(envelope: &Envelope) -> ProtocolResult<Self> {
        let payload = match &envelope.payload {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        Ok(serde_json::from_value(serde_json::json!({
            "event": envelope.event,
            "payload": payload,
        }))?)
    }
}

/// Encode bytes as a base64 `data:` URL.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decode a base64 `data:` URL into its MIME type and bytes.
pub fn decode_data_url(url: &str) -> ProtocolResult<(String, Vec<u8>)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| ProtocolError::DataUrl("missing data: scheme".to_string()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| ProtocolError::DataUrl("missing ',' separator".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| ProtocolError::DataUrl("only base64 data URLs are supported".to_string()))?;
    Ok((mime.to_string(), STANDARD.decode(data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::BrushStyle;
    use kurbo::Point;

    fn stroke() -> Stroke {
        Stroke::new(
            vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0), Point::new(10.0, 0.0)],
            BrushStyle::draw("red", 4.0),
        )
        .unwrap()
    }

    #[test]
    fn test_event_names_match_envelope() {
        let messages = vec![
            SyncMessage::Stroke(stroke()),
            SyncMessage::Clear {},
            SyncMessage::SyncRequest { requester: PeerId::from("a") },
            SyncMessage::SyncResponse(SyncResponse {
                target: PeerId::from("a"),
                image_data: encode_data_url("image/png", b"png"),
                strokes: vec![stroke()],
            }),
        ];
        for msg in messages {
            let envelope = msg.to_envelope().unwrap();
            assert_eq!(envelope.event, msg.event());
            assert_eq!(SyncMessage::from_envelope(&envelope).unwrap(), msg);
        }
    }

    #[test]
    fn test_sync_request_payload_keys() {
        let msg = SyncMessage::SyncRequest { requester: PeerId::from("peer-1") };
        let envelope = msg.to_envelope().unwrap();
        assert_eq!(envelope.event, "sync-request");
        assert_eq!(envelope.payload["requesterId"], "peer-1");
    }

    #[test]
    fn test_segment_event_is_drawing() {
        let json = r#"{"event":"drawing","payload":{"points":[{"x":1,"y":1},{"x":2,"y":2}],"color":"blue","size":3,"tool":"pencil"}}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        match SyncMessage::from_envelope(&envelope).unwrap() {
            SyncMessage::Segment(seg) => assert_eq!(seg.style.color, "blue"),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_clear_with_empty_payload() {
        let envelope: Envelope = serde_json::from_str(r#"{"event":"clear","payload":{}}"#).unwrap();
        assert_eq!(SyncMessage::from_envelope(&envelope).unwrap(), SyncMessage::Clear {});
    }

    #[test]
    fn test_clear_without_payload() {
        let envelope: Envelope = serde_json::from_str(r#"{"event":"clear"}"#).unwrap();
        assert_eq!(SyncMessage::from_envelope(&envelope).unwrap(), SyncMessage::Clear {});
    }

    #[test]
    fn test_unknown_event_is_error() {
        let envelope = Envelope {
            event: "cursor".to_string(),
            payload: serde_json::json!({}),
        };
        assert!(SyncMessage::from_envelope(&envelope).is_err());
    }

    #[test]
    fn test_malformed_stroke_is_error() {
        let envelope = Envelope {
            event: "stroke".to_string(),
            payload: serde_json::json!({ "points": [], "color": "red", "size": 4, "tool": "pencil" }),
        };
        assert!(SyncMessage::from_envelope(&envelope).is_err());
    }

    #[test]
    fn test_data_url() {
        let url = encode_data_url("image/png", b"Hello, World!");
        assert!(url.starts_with("data:image/png;base64,"));
        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"Hello, World!");
    }

    #[test]
    fn test_bad_data_url() {
        assert!(matches!(decode_data_url("image/png;base64,AAAA"), Err(ProtocolError::DataUrl(_))));
        assert!(matches!(decode_data_url("data:image/png,AAAA"), Err(ProtocolError::DataUrl(_))));
        assert!(matches!(decode_data_url("data:image/png;base64,!!!"), Err(ProtocolError::Base64(_))));
    }

    #[test]
    fn test_presence_meta_serialization() {
        let meta = PresenceMeta::now().with_name("ada");
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json["online_at"].is_string());
        assert_eq!(json["name"], "ada");
    }
}
