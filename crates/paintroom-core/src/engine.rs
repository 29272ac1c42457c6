//! Stroke synchronization engine.
//!
//! One [`SyncEngine`] per peer and session. It owns the event log, the reconciliation
//! state and the in-progress local stroke, turns local gestures into outgoing messages
//! and applies incoming ones. Like the rest of the crate it is single-threaded: the host
//! calls in with local input, inbound messages and the current time, then drains
//! [`SyncEngine::take_outgoing`] into its transport.
//!
//! ## Late-join reconciliation
//!
//! ```text
//! joiner                          existing peers
//!   │ on_join()
//!   │ ... grace delay ...
//!   ├── sync-request(joiner) ───────▶ each peer with a non-empty log
//!   │                                 waits uniform [0, D]
//!   ◀── sync-response(joiner) ──────┤ (possibly several)
//!   │ first one addressed to us while unsynced wins, the rest are dropped
//! ```

use crate::config::SyncConfig;
use crate::event_log::EventLog;
use crate::protocol::{
    Envelope, PeerId, SyncMessage, SyncResponse, decode_data_url, encode_data_url,
};
use crate::stroke::{BrushStyle, Segment, Stroke, StrokeBuilder};
use crate::surface::RenderSurface;
use crate::timer::{DeferredQueue, Timer, TimerHandle};
use kurbo::Point;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;

/// Work the engine defers to its timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    /// Broadcast our reconciliation request if still unsynced.
    SendSyncRequest,
    /// Answer a peer's reconciliation request.
    SendSyncResponse { target: PeerId },
}

/// Whether this peer has caught up with the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconciliationState {
    #[default]
    Unsynced,
    Synced,
}

/// Why a message or deferred task had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Our own reconciliation request came back to us.
    OwnRequest,
    /// Asked for state but our log is empty.
    NothingToOffer,
    /// A response addressed to another peer.
    NotAddressedToUs,
    /// A response arriving after we already synced.
    AlreadySynced,
    /// The payload could not be decoded.
    Malformed,
}

/// What handling an input did. Hosts can log these; tests assert on them.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A completed stroke was appended to the log.
    StrokeAppended,
    /// A live segment was rendered.
    SegmentDrawn,
    /// Log and canvas were cleared.
    Cleared,
    /// The reconciliation request is scheduled.
    RequestScheduled { delay: Duration },
    /// The reconciliation request went out.
    RequestSent,
    /// No request was needed because we are already synced.
    RequestSkipped,
    /// We will answer `target` after `delay`.
    ResponseScheduled { target: PeerId, delay: Duration },
    /// Our response to `target` went out.
    ResponseSent { target: PeerId, strokes: usize },
    /// Our response to `target` could not be produced and was dropped.
    ResponseAbandoned { target: PeerId },
    /// A reconciliation response was accepted.
    Synced { strokes: usize },
    /// The input was dropped.
    Ignored(IgnoreReason),
}

/// Peer-side state of one drawing session.
pub struct SyncEngine<T: Timer<Deferred> = DeferredQueue<Deferred>> {
    peer_id: PeerId,
    config: SyncConfig,
    log: EventLog,
    state: ReconciliationState,
    current: Option<StrokeBuilder>,
    timer: T,
    rng: StdRng,
    request_timer: Option<TimerHandle>,
    pending_responses: HashMap<PeerId, TimerHandle>,
    outgoing: Vec<Envelope>,
}

impl SyncEngine<DeferredQueue<Deferred>> {
    /// Create an engine with a fresh identity and the default timer.
    pub fn new(config: SyncConfig) -> Self {
        Self::with_timer(PeerId::new(), config, DeferredQueue::new())
    }
}

impl<T: Timer<Deferred>> SyncEngine<T> {
    /// Create an engine with an explicit identity and timer.
    pub fn with_timer(peer_id: PeerId, config: SyncConfig, timer: T) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            peer_id,
            config,
            log: EventLog::new(),
            state: ReconciliationState::Unsynced,
            current: None,
            timer,
            rng,
            request_timer: None,
            pending_responses: HashMap::new(),
            outgoing: Vec::new(),
        }
    }

    /// This peer's identity.
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Engine settings.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The event log.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Current reconciliation state.
    pub fn state(&self) -> ReconciliationState {
        self.state
    }

    /// Whether catch-up has completed (or was never needed).
    pub fn is_synced(&self) -> bool {
        self.state == ReconciliationState::Synced
    }

    /// Whether a local gesture is in progress.
    pub fn is_drawing(&self) -> bool {
        self.current.is_some()
    }

    /// The timer, for inspection.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    // --- Local input ---

    /// Start a local gesture. Replaces any gesture still in progress.
    pub fn begin_local_stroke(&mut self, point: Point, style: BrushStyle) {
        if self.current.is_some() {
            log::debug!("Starting a new stroke while one was in progress; dropping the old one");
        }
        self.current = Some(StrokeBuilder::new(point, style));
    }

    /// Extend the local gesture, draw the new segment and queue it for peers.
    pub fn extend_local_stroke(
        &mut self,
        point: Point,
        surface: &mut dyn RenderSurface,
    ) -> Option<Segment> {
        let segment = self.current.as_mut()?.add_point(point)?;
        surface.render_segment(segment.from, segment.to, &segment.style);
        self.queue(SyncMessage::Segment(segment.clone()));
        Some(segment)
    }

    /// Finish the local gesture. Strokes with at least two points replace the live
    /// preview on `surface`, are logged and sent; shorter gestures are dropped.
    pub fn complete_local_stroke(&mut self, surface: &mut dyn RenderSurface) -> Option<Stroke> {
        let stroke = self.current.take()?.finish()?;
        surface.render_stroke(&stroke);
        self.log.append(stroke.clone());
        self.queue(SyncMessage::Stroke(stroke.clone()));
        self.mark_self_sufficient();
        Some(stroke)
    }

    /// Clear the canvas and log locally and tell peers to do the same.
    pub fn clear_all(&mut self, surface: &mut dyn RenderSurface) {
        self.current = None;
        self.log.clear();
        surface.clear_canvas();
        self.queue(SyncMessage::Clear {});
    }

    /// Rebuild the canvas from the log, e.g. after the surface was resized.
    pub fn redraw(&self, surface: &mut dyn RenderSurface) {
        self.log.replay(surface);
    }

    // --- Session lifecycle ---

    /// Called once the transport subscription is active.
    pub fn on_join(&mut self) -> EngineEvent {
        if self.is_synced() {
            return EngineEvent::RequestSkipped;
        }
        if let Some(handle) = self.request_timer.take() {
            self.timer.cancel(handle);
        }
        let delay = self.config.grace_delay;
        self.request_timer = Some(self.timer.schedule(delay, Deferred::SendSyncRequest));
        EngineEvent::RequestScheduled { delay }
    }

    /// Run deferred work that is due at `now`. Delays scheduled afterwards are measured
    /// from the latest `now`, so hosts tick before feeding input.
    pub fn tick(&mut self, now: Duration, surface: &mut dyn RenderSurface) -> Vec<EngineEvent> {
        self.timer
            .poll_due(now)
            .into_iter()
            .map(|task| self.run_deferred(task, surface))
            .collect()
    }

    /// Leave the session: cancel deferred work, drop unsent messages and forget the log
    /// and reconciliation state. A later [`SyncEngine::on_join`] starts from scratch.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.request_timer.take() {
            self.timer.cancel(handle);
        }
        for (_, handle) in self.pending_responses.drain() {
            self.timer.cancel(handle);
        }
        self.current = None;
        self.outgoing.clear();
        self.log.clear();
        self.state = ReconciliationState::Unsynced;
    }

    fn run_deferred(&mut self, task: Deferred, surface: &mut dyn RenderSurface) -> EngineEvent {
        match task {
            Deferred::SendSyncRequest => {
                self.request_timer = None;
                if self.is_synced() {
                    return EngineEvent::RequestSkipped;
                }
                log::info!("Requesting canvas state for {}", self.peer_id);
                self.queue(SyncMessage::SyncRequest {
                    requester: self.peer_id.clone(),
                });
                EngineEvent::RequestSent
            }
            Deferred::SendSyncResponse { target } => {
                self.pending_responses.remove(&target);
                self.send_response(target, surface)
            }
        }
    }

    fn send_response(&mut self, target: PeerId, surface: &mut dyn RenderSurface) -> EngineEvent {
        if self.log.is_empty() {
            log::debug!("Log emptied before answering {}; not responding", target);
            return EngineEvent::ResponseAbandoned { target };
        }
        let image = match surface.snapshot() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Abandoning response to {}: {}", target, e);
                return EngineEvent::ResponseAbandoned { target };
            }
        };
        let strokes = self.log.strokes().to_vec();
        let count = strokes.len();
        log::info!("Answering {} with {} strokes", target, count);
        self.queue(SyncMessage::SyncResponse(SyncResponse {
            target: target.clone(),
            image_data: encode_data_url(surface.snapshot_mime(), &image),
            strokes,
        }));
        EngineEvent::ResponseSent {
            target,
            strokes: count,
        }
    }

    // --- Inbound messages ---

    /// Decode and apply an inbound envelope. Undecodable payloads are dropped.
    pub fn handle_envelope(
        &mut self,
        envelope: &Envelope,
        surface: &mut dyn RenderSurface,
    ) -> EngineEvent {
        match SyncMessage::from_envelope(envelope) {
            Ok(message) => self.handle_message(message, surface),
            Err(e) => {
                log::warn!("Dropping malformed '{}' message: {}", envelope.event, e);
                EngineEvent::Ignored(IgnoreReason::Malformed)
            }
        }
    }

    /// Apply an inbound message.
    pub fn handle_message(
        &mut self,
        message: SyncMessage,
        surface: &mut dyn RenderSurface,
    ) -> EngineEvent {
        match message {
            SyncMessage::Stroke(stroke) => {
                surface.render_stroke(&stroke);
                self.log.append(stroke);
                EngineEvent::StrokeAppended
            }
            SyncMessage::Segment(segment) => {
                surface.render_segment(segment.from, segment.to, &segment.style);
                EngineEvent::SegmentDrawn
            }
            SyncMessage::Clear {} => {
                self.log.clear();
                surface.clear_canvas();
                EngineEvent::Cleared
            }
            SyncMessage::SyncRequest { requester } => self.on_sync_request(requester),
            SyncMessage::SyncResponse(response) => self.on_sync_response(response, surface),
        }
    }

    fn on_sync_request(&mut self, requester: PeerId) -> EngineEvent {
        if requester == self.peer_id {
            return EngineEvent::Ignored(IgnoreReason::OwnRequest);
        }
        if self.log.is_empty() {
            return EngineEvent::Ignored(IgnoreReason::NothingToOffer);
        }

        let max = self.config.max_response_delay.as_micros() as u64;
        let delay = Duration::from_micros(self.rng.gen_range(0..=max));
        let handle = self.timer.schedule(
            delay,
            Deferred::SendSyncResponse {
                target: requester.clone(),
            },
        );
        if let Some(previous) = self.pending_responses.insert(requester.clone(), handle) {
            self.timer.cancel(previous);
        }
        log::debug!("Will answer {} in {:?}", requester, delay);
        EngineEvent::ResponseScheduled {
            target: requester,
            delay,
        }
    }

    fn on_sync_response(
        &mut self,
        response: SyncResponse,
        surface: &mut dyn RenderSurface,
    ) -> EngineEvent {
        if response.target != self.peer_id {
            return EngineEvent::Ignored(IgnoreReason::NotAddressedToUs);
        }
        if self.is_synced() {
            return EngineEvent::Ignored(IgnoreReason::AlreadySynced);
        }

        let image = match decode_data_url(&response.image_data) {
            Ok((_, bytes)) => bytes,
            Err(e) => {
                log::warn!("Dropping sync response with bad image: {}", e);
                return EngineEvent::Ignored(IgnoreReason::Malformed);
            }
        };
        if let Err(e) = surface.load_base_image(&image) {
            log::warn!("Dropping sync response, snapshot could not be loaded: {}", e);
            return EngineEvent::Ignored(IgnoreReason::Malformed);
        }

        let strokes = response.strokes.len();
        self.log.replace(response.strokes);
        self.state = ReconciliationState::Synced;
        if let Some(handle) = self.request_timer.take() {
            self.timer.cancel(handle);
        }
        log::info!("Synced canvas state ({} strokes)", strokes);
        EngineEvent::Synced { strokes }
    }

    /// A peer that draws before anyone answers its request already has a canvas that
    /// matches its log, so it stops waiting for catch-up.
    fn mark_self_sufficient(&mut self) {
        if self.is_synced() {
            return;
        }
        self.state = ReconciliationState::Synced;
        if let Some(handle) = self.request_timer.take() {
            self.timer.cancel(handle);
        }
    }

    // --- Outgoing ---

    fn queue(&mut self, message: SyncMessage) {
        match message.to_envelope() {
            Ok(envelope) => self.outgoing.push(envelope),
            Err(e) => log::error!("Failed to encode '{}' message: {}", message.event(), e),
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outgoing)
    }

    /// Check if there are pending outgoing messages.
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }
}
