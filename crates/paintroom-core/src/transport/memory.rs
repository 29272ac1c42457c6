//! In-process transport for tests and simulations.

use super::{ChannelEvent, Transport, TransportError, TransportResult};
use crate::protocol::{Envelope, PeerId, PresenceMeta};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

type DropFilter = Box<dyn FnMut(&PeerId, &PeerId, &Envelope) -> bool>;

#[derive(Default)]
struct Slot {
    inbox: VecDeque<ChannelEvent>,
    room: Option<String>,
    peer: Option<PeerId>,
    meta: Option<PresenceMeta>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    slots: BTreeMap<u64, Slot>,
    drop_filter: Option<DropFilter>,
}

impl HubState {
    fn room_members<'a>(&'a self, room: &'a str) -> impl Iterator<Item = (&'a u64, &'a Slot)> {
        self.slots
            .iter()
            .filter(move |(_, slot)| slot.room.as_deref() == Some(room))
    }

    fn presence(&self, room: &str) -> BTreeMap<PeerId, PresenceMeta> {
        self.room_members(room)
            .filter_map(|(_, slot)| Some((slot.peer.clone()?, slot.meta.clone()?)))
            .collect()
    }

    /// Push the room's presence state to everyone in it.
    fn announce_presence(&mut self, room: &str) {
        let members = self.presence(room);
        for slot in self.slots.values_mut() {
            if slot.room.as_deref() == Some(room) {
                slot.inbox.push_back(ChannelEvent::Presence(members.clone()));
            }
        }
    }

    fn leave(&mut self, id: u64) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        let had_presence = slot.meta.take().is_some();
        if let Some(room) = slot.room.take() {
            if had_presence {
                self.announce_presence(&room);
            }
        }
    }
}

/// Shared in-memory relay. Every [`MemoryChannel`] connected to the same hub can reach
/// the others once they have joined the same room.
///
/// Messages are delivered synchronously into the receivers' inboxes in publish order.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Rc<RefCell<HubState>>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection. Its first event is [`ChannelEvent::Connected`].
    pub fn connect(&self) -> MemoryChannel {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        let mut slot = Slot::default();
        slot.inbox.push_back(ChannelEvent::Connected);
        state.slots.insert(id, slot);
        MemoryChannel {
            id,
            hub: self.state.clone(),
        }
    }

    /// Drop messages for which `filter(from, to, envelope)` returns true.
    pub fn set_drop_filter(
        &self,
        filter: impl FnMut(&PeerId, &PeerId, &Envelope) -> bool + 'static,
    ) {
        self.state.borrow_mut().drop_filter = Some(Box::new(filter));
    }

    /// Deliver everything again.
    pub fn clear_drop_filter(&self) {
        self.state.borrow_mut().drop_filter = None;
    }

    /// Number of peers currently subscribed to `room`.
    pub fn room_size(&self, room: &str) -> usize {
        self.state.borrow().room_members(room).count()
    }
}

/// One peer's connection to a [`MemoryHub`].
pub struct MemoryChannel {
    id: u64,
    hub: Rc<RefCell<HubState>>,
}

impl Transport for MemoryChannel {
    fn join(&mut self, room: &str, peer: &PeerId) -> TransportResult<()> {
        let mut state = self.hub.borrow_mut();
        state.leave(self.id);
        let slot = state.slots.get_mut(&self.id).ok_or(TransportError::NotConnected)?;
        slot.room = Some(room.to_string());
        slot.peer = Some(peer.clone());
        let peer_count = state.room_members(room).count();
        if let Some(slot) = state.slots.get_mut(&self.id) {
            slot.inbox.push_back(ChannelEvent::Subscribed {
                room: room.to_string(),
                peer_count,
            });
        }
        Ok(())
    }

    fn leave(&mut self) -> TransportResult<()> {
        self.hub.borrow_mut().leave(self.id);
        Ok(())
    }

    fn publish(&mut self, envelope: &Envelope) -> TransportResult<()> {
        let mut state = self.hub.borrow_mut();
        let HubState {
            slots, drop_filter, ..
        } = &mut *state;

        let sender = slots.get(&self.id).ok_or(TransportError::NotConnected)?;
        let (Some(room), Some(from)) = (sender.room.clone(), sender.peer.clone()) else {
            return Err(TransportError::NotJoined);
        };

        for (id, slot) in slots.iter_mut() {
            if *id == self.id || slot.room.as_deref() != Some(room.as_str()) {
                continue;
            }
            let Some(to) = &slot.peer else { continue };
            if let Some(filter) = drop_filter.as_mut() {
                if filter(&from, to, envelope) {
                    log::trace!("Dropping '{}' from {} to {}", envelope.event, from, to);
                    continue;
                }
            }
            slot.inbox.push_back(ChannelEvent::Message {
                from: from.clone(),
                envelope: envelope.clone(),
            });
        }
        Ok(())
    }

    fn track(&mut self, meta: &PresenceMeta) -> TransportResult<()> {
        let mut state = self.hub.borrow_mut();
        let slot = state.slots.get_mut(&self.id).ok_or(TransportError::NotConnected)?;
        let room = slot.room.clone().ok_or(TransportError::NotJoined)?;
        slot.meta = Some(meta.clone());
        state.announce_presence(&room);
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<ChannelEvent> {
        self.hub
            .borrow_mut()
            .slots
            .get_mut(&self.id)
            .map(|slot| slot.inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        if let Ok(mut state) = self.hub.try_borrow_mut() {
            state.leave(self.id);
            state.slots.remove(&self.id);
        }
    }
}
