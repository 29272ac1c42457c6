//! Engine configuration.

use std::time::Duration;

/// Default room everyone lands in.
pub const DEFAULT_ROOM: &str = "paint-room";

/// Wait after subscribing before asking peers for state.
pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound of the random wait before answering a state request.
pub const DEFAULT_MAX_RESPONSE_DELAY: Duration = Duration::from_millis(300);

/// Settings for a [`crate::SyncEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Room identifier shared by all peers drawing together.
    pub room: String,
    /// Delay between subscribing and sending the reconciliation request.
    pub grace_delay: Duration,
    /// Responses are delayed uniformly in `[0, max_response_delay]`.
    pub max_response_delay: Duration,
    /// Seed for the response backoff; random if unset.
    pub seed: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            room: DEFAULT_ROOM.to_string(),
            grace_delay: DEFAULT_GRACE_DELAY,
            max_response_delay: DEFAULT_MAX_RESPONSE_DELAY,
            seed: None,
        }
    }
}

impl SyncConfig {
    /// Set the room.
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    /// Set the grace delay.
    pub fn with_grace_delay(mut self, delay: Duration) -> Self {
        self.grace_delay = delay;
        self
    }

    /// Set the maximum response delay.
    pub fn with_max_response_delay(mut self, delay: Duration) -> Self {
        self.max_response_delay = delay;
        self
    }

    /// Make the response backoff deterministic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
