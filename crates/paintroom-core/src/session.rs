//! Glue between a [`SyncEngine`], a [`Transport`] and a [`PresenceTracker`].
//!
//! The host owns a [`Session`] and calls [`Session::pump`] from its frame loop. Local
//! input goes straight to [`Session::engine_mut`]; the next pump publishes whatever the
//! engine queued.

use crate::engine::{EngineEvent, SyncEngine};
use crate::presence::PresenceTracker;
use crate::protocol::PresenceMeta;
use crate::surface::{MembershipView, RenderSurface};
use crate::transport::{ChannelEvent, Transport};
use std::time::Duration;

/// Connection state as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Joined the room; messages flow.
    Subscribed,
    Error,
}

/// One peer's participation in one room.
pub struct Session<T: Transport> {
    engine: SyncEngine,
    transport: T,
    presence: PresenceTracker,
    state: ConnectionState,
    name: Option<String>,
}

impl<T: Transport> Session<T> {
    /// Wrap an engine and a transport whose connection is underway.
    pub fn new(engine: SyncEngine, transport: T) -> Self {
        Self {
            engine,
            transport,
            presence: PresenceTracker::new(),
            state: ConnectionState::Connecting,
            name: None,
        }
    }

    /// Display name published with presence.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine {
        &mut self.engine
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Process transport events, run due timers and publish queued messages.
    ///
    /// `now` is the time since the session started and must not go backwards.
    pub fn pump(
        &mut self,
        now: Duration,
        surface: &mut dyn RenderSurface,
        view: &mut dyn MembershipView,
    ) -> Vec<EngineEvent> {
        // Advance the clock first so delays scheduled below start from `now`.
        let mut events = self.engine.tick(now, surface);

        loop {
            let incoming = self.transport.poll_events();
            if incoming.is_empty() {
                break;
            }
            for event in incoming {
                if let Some(e) = self.handle_channel_event(event, surface, view) {
                    events.push(e);
                }
            }
        }

        events.extend(self.engine.tick(now, surface));
        self.flush();
        events
    }

    fn handle_channel_event(
        &mut self,
        event: ChannelEvent,
        surface: &mut dyn RenderSurface,
        view: &mut dyn MembershipView,
    ) -> Option<EngineEvent> {
        match event {
            ChannelEvent::Connected => {
                self.state = ConnectionState::Connected;
                let room = self.engine.config().room.clone();
                let peer = self.engine.peer_id().clone();
                log::info!("Connected, joining room '{}' as {}", room, peer);
                if let Err(e) = self.transport.join(&room, &peer) {
                    log::warn!("Failed to join room '{}': {}", room, e);
                    self.state = ConnectionState::Error;
                }
                None
            }
            ChannelEvent::Subscribed { room, peer_count } => {
                log::info!("Subscribed to '{}' ({} peers)", room, peer_count);
                self.state = ConnectionState::Subscribed;
                let mut meta = PresenceMeta::now();
                if let Some(name) = &self.name {
                    meta = meta.with_name(name.clone());
                }
                if let Err(e) = self.transport.track(&meta) {
                    log::warn!("Failed to publish presence: {}", e);
                }
                Some(self.engine.on_join())
            }
            ChannelEvent::Message { from, envelope } => {
                log::trace!("'{}' from {}", envelope.event, from);
                Some(self.engine.handle_envelope(&envelope, surface))
            }
            ChannelEvent::Presence(members) => {
                self.presence.on_sync(members, view);
                None
            }
            ChannelEvent::Disconnected => {
                log::info!("Disconnected");
                self.state = ConnectionState::Disconnected;
                None
            }
            ChannelEvent::Error { message } => {
                log::warn!("Transport error: {}", message);
                self.state = ConnectionState::Error;
                None
            }
        }
    }

    /// Publish everything the engine has queued. Messages produced while not subscribed
    /// are dropped.
    pub fn flush(&mut self) {
        if !self.engine.has_outgoing() {
            return;
        }
        let outgoing = self.engine.take_outgoing();
        if self.state != ConnectionState::Subscribed {
            log::debug!("Not subscribed; dropping {} outgoing message(s)", outgoing.len());
            return;
        }
        for envelope in &outgoing {
            if let Err(e) = self.transport.publish(envelope) {
                log::warn!("Failed to publish '{}': {}", envelope.event, e);
            }
        }
    }

    /// Leave the room. Pending requests and responses are cancelled and the engine
    /// forgets its log and reconciliation state.
    pub fn leave(&mut self) {
        self.engine.shutdown();
        self.presence.reset();
        if self.state == ConnectionState::Subscribed {
            if let Err(e) = self.transport.leave() {
                log::warn!("Failed to leave room: {}", e);
            }
            self.state = ConnectionState::Connected;
        }
    }
}
