//! Paintroom Core Library
//!
//! Stroke model, event log, wire protocol and the synchronization engine that keeps a
//! shared drawing canvas consistent across peers, including late-join reconciliation.

pub mod config;
pub mod engine;
pub mod event_log;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod stroke;
pub mod surface;
pub mod timer;
pub mod transport;

pub use config::SyncConfig;
pub use engine::{Deferred, EngineEvent, IgnoreReason, ReconciliationState, SyncEngine};
pub use event_log::EventLog;
pub use presence::PresenceTracker;
pub use protocol::{Envelope, PeerId, PresenceMeta, SyncMessage, SyncResponse};
pub use session::{ConnectionState, Session};
pub use stroke::{BrushMode, BrushStyle, Segment, Stroke, StrokeBuilder, StrokeError};
pub use surface::{MembershipView, RecordingSurface, RenderSurface, SurfaceError, SurfaceResult};
pub use timer::{DeferredQueue, Timer, TimerHandle};
pub use transport::{ChannelEvent, MemoryChannel, MemoryHub, Transport, TransportError};
#[cfg(not(target_arch = "wasm32"))]
pub use transport::NativeChannel;
