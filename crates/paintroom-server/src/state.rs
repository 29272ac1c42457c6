//! Room bookkeeping shared by all connections.

use dashmap::DashMap;
use paintroom_core::protocol::{PeerId, PresenceMeta};
use paintroom_core::transport::ServerFrame;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;

/// Broadcast channel capacity per room.
pub const CHANNEL_CAPACITY: usize = 256;

/// A frame on a room's channel. `from` is `None` for frames every member receives,
/// including the one that caused them.
pub type RoomFrame = (Option<PeerId>, ServerFrame);

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<RoomFrame>,
    /// Connected peers and their presence metadata, once tracked
    peers: HashMap<PeerId, Option<PresenceMeta>>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashMap::new(),
        }
    }

    fn presence(&self) -> BTreeMap<PeerId, PresenceMeta> {
        self.peers
            .iter()
            .filter_map(|(peer, meta)| Some((peer.clone(), meta.clone()?)))
            .collect()
    }

    fn announce_presence(&self) {
        let _ = self.tx.send((
            None,
            ServerFrame::Presence {
                members: self.presence(),
            },
        ));
    }
}

/// Shared application state
#[derive(Default)]
pub struct AppState {
    rooms: DashMap<String, Room>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer to a room. Returns its receiver and the room size after joining, or
    /// `None` if another connection already holds that peer id in the room.
    pub fn join_room(
        &self,
        room_id: &str,
        peer: &PeerId,
    ) -> Option<(broadcast::Receiver<RoomFrame>, usize)> {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        if room.peers.contains_key(peer) {
            return None;
        }
        room.peers.insert(peer.clone(), None);
        Some((room.tx.subscribe(), room.peers.len()))
    }

    /// Remove a peer from a room. Empty rooms are dropped; otherwise the remaining
    /// members get fresh presence if the peer had tracked any.
    pub fn leave_room(&self, room_id: &str, peer: &PeerId) {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let had_presence = matches!(room.peers.remove(peer), Some(Some(_)));
        if room.peers.is_empty() {
            drop(room);
            self.rooms.remove(room_id);
        } else if had_presence {
            room.announce_presence();
        }
    }

    /// Record presence metadata for a peer and push the room's presence to everyone.
    pub fn track(&self, room_id: &str, peer: &PeerId, meta: PresenceMeta) -> bool {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let Some(slot) = room.peers.get_mut(peer) else {
            return false;
        };
        *slot = Some(meta);
        room.announce_presence();
        true
    }

    /// Send a frame to the room. Receivers skip frames whose `from` is themselves.
    pub fn broadcast(&self, room_id: &str, from: Option<&PeerId>, frame: ServerFrame) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from.cloned(), frame));
        }
    }

    /// Presence state of a room.
    pub fn presence(&self, room_id: &str) -> BTreeMap<PeerId, PresenceMeta> {
        self.rooms
            .get(room_id)
            .map(|room| room.presence())
            .unwrap_or_default()
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of peers in a room.
    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|room| room.peers.len()).unwrap_or(0)
    }

    /// Number of peers across all rooms.
    pub fn total_peers(&self) -> usize {
        self.rooms.iter().map(|room| room.peers.len()).sum()
    }
}
