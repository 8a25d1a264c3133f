//! Per-light send rate limiting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::light::{LightId, TransportKind};

/// Minimum interval between sends to one light, by transport.
pub fn default_interval(transport: TransportKind) -> Duration {
    match transport {
        TransportKind::Serial => Duration::from_millis(50),
        TransportKind::Http => Duration::from_millis(2000),
        TransportKind::Hue | TransportKind::Udp => Duration::from_millis(400),
    }
}

/// Decides whether a packet may go out to a light right now.
///
/// Each light gets an entry the first time it is asked about. That first
/// lookup always admits, so a new light is never held back.
#[derive(Debug, Clone, Default)]
pub struct ThrottleTracker {
    last_send: HashMap<LightId, Instant>,
    overrides: HashMap<TransportKind, Duration>,
}

impl ThrottleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker whose per-transport intervals are replaced by `overrides`.
    pub fn with_overrides(overrides: HashMap<TransportKind, Duration>) -> Self {
        ThrottleTracker {
            last_send: HashMap::new(),
            overrides,
        }
    }

    pub fn interval(&self, transport: TransportKind) -> Duration {
        self.overrides
            .get(&transport)
            .copied()
            .unwrap_or_else(|| default_interval(transport))
    }

    /// Returns `true` and records a send at `now` if the light's interval has
    /// elapsed; otherwise leaves the stored timestamp alone.
    pub fn admit(&mut self, id: &LightId, now: Instant) -> bool {
        let interval = self.interval(id.transport());
        match self.last_send.get_mut(id) {
            Some(last) => {
                if now.saturating_duration_since(*last) >= interval {
                    *last = now;
                    true
                } else {
                    false
                }
            }
            None => {
                self.last_send.insert(id.clone(), now);
                true
            }
        }
    }

    /// Restart the interval window after a successful dispatch.
    pub fn reset(&mut self, id: &LightId, now: Instant) {
        self.last_send.insert(id.clone(), now);
    }

    pub fn len(&self) -> usize {
        self.last_send.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_send.is_empty()
    }
}
