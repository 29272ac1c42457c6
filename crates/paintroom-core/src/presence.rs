//! Room membership tracking.

use crate::protocol::{PeerId, PresenceMeta};
use crate::surface::MembershipView;
use std::collections::BTreeMap;

/// Keeps the latest presence snapshot for a room and reports its size.
///
/// The transport delivers the full member map on every change; the tracker replaces its
/// copy wholesale and pushes the new count to the view.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    members: BTreeMap<PeerId, PresenceMeta>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a presence snapshot. Returns the new member count.
    pub fn on_sync(
        &mut self,
        members: BTreeMap<PeerId, PresenceMeta>,
        view: &mut dyn MembershipView,
    ) -> usize {
        self.members = members;
        let count = self.members.len();
        log::debug!("Presence sync: {} online", count);
        view.set_membership_count(count);
        count
    }

    /// Number of distinct members in the last snapshot.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Members of the last snapshot.
    pub fn members(&self) -> &BTreeMap<PeerId, PresenceMeta> {
        &self.members
    }

    /// Whether `peer` was in the last snapshot.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.members.contains_key(peer)
    }

    /// Forget all members, e.g. after leaving the room.
    pub fn reset(&mut self) {
        self.members.clear();
    }
}
