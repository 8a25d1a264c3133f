use std::time::{Duration, Instant};

/// Suspends periodic state polls to a backend that has gone quiet.
///
/// Inbound replies and outbound directives count as traffic. The polls
/// themselves do not, so a backend that never answers stops being polled
/// once `silence` has passed since the last real traffic.
#[derive(Debug, Clone, Copy)]
pub struct StateUpdateWatchdog {
    silence: Duration,
    last_traffic: Instant,
}

impl StateUpdateWatchdog {
    pub fn new(silence: Duration, now: Instant) -> Self {
        StateUpdateWatchdog {
            silence,
            last_traffic: now,
        }
    }

    /// Record traffic, re-arming polls.
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_traffic {
            self.last_traffic = now;
        }
    }

    pub fn allows_polling(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_traffic) < self.silence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_suspends_polls() {
        let start = Instant::now();
        let watchdog = StateUpdateWatchdog::new(Duration::from_secs(15), start);
        assert!(watchdog.allows_polling(start + Duration::from_millis(14_999)));
        assert!(!watchdog.allows_polling(start + Duration::from_secs(15)));
    }

    #[test]
    fn test_traffic_rearms() {
        let start = Instant::now();
        let mut watchdog = StateUpdateWatchdog::new(Duration::from_secs(15), start);
        watchdog.touch(start + Duration::from_secs(20));
        assert!(watchdog.allows_polling(start + Duration::from_secs(30)));
    }
}
