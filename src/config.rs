//! Timing and policy knobs for the reconciliation loop.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::light::{Controller, TransportKind};

type Result<T> = std::result::Result<T, Error>;

/// Bytes of every packet kept free for the controller's own framing.
const PACKET_HEADROOM: usize = 15;

/// Smallest packet size that still fits any single command.
const MIN_PACKET_SIZE: usize = 64;

/// Configuration of the sync engines, the cleanup pass, and state polling.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use std::time::Duration;
/// use lightsync_rs::SyncConfig;
///
/// let config = SyncConfig::from_json(r#"{"hueIntervalMs": 250}"#).unwrap();
/// assert_eq!(config.hue_interval(), Duration::from_millis(250));
/// assert_eq!(config.standard_interval(), Duration::from_millis(33));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    pub standard_interval_ms: u64,
    pub hue_interval_ms: u64,
    pub slow_interval_ms: u64,
    pub slow_after_ms: u64,
    pub give_up_after_ms: u64,
    pub cleanup_delay_ms: u64,
    pub cleanup_budget_ms: u64,
    pub state_poll_interval_ms: u64,
    pub watchdog_ms: u64,
    pub timeouts_enabled: bool,
    /// Per-transport minimum send interval overrides.
    pub throttle_ms: HashMap<TransportKind, u64>,
    /// Largest packet an ArduCor controller accepts, in bytes.
    pub max_packet_size: usize,
    /// Packet sizes reported by individual controllers, keyed by name.
    pub packet_sizes: HashMap<String, usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            standard_interval_ms: 33,
            hue_interval_ms: 100,
            slow_interval_ms: 2000,
            slow_after_ms: 15_000,
            give_up_after_ms: 30_000,
            cleanup_delay_ms: 500,
            cleanup_budget_ms: 15_000,
            state_poll_interval_ms: 1000,
            watchdog_ms: 15_000,
            timeouts_enabled: true,
            throttle_ms: HashMap::new(),
            max_packet_size: 500,
            packet_sizes: HashMap::new(),
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json).map_err(Error::JsonLoad)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("standardIntervalMs", self.standard_interval_ms),
            ("hueIntervalMs", self.hue_interval_ms),
            ("slowIntervalMs", self.slow_interval_ms),
            ("cleanupDelayMs", self.cleanup_delay_ms),
            ("statePollIntervalMs", self.state_poll_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, ms)| *ms == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be non-zero")));
        }
        let mut sizes =
            std::iter::once(self.max_packet_size).chain(self.packet_sizes.values().copied());
        if let Some(size) = sizes.find(|size| *size < MIN_PACKET_SIZE) {
            return Err(Error::InvalidConfig(format!(
                "packet size {size} is below {MIN_PACKET_SIZE}"
            )));
        }
        if self.slow_after_ms >= self.give_up_after_ms {
            return Err(Error::InvalidConfig(format!(
                "slowAfterMs ({}) must be below giveUpAfterMs ({})",
                self.slow_after_ms, self.give_up_after_ms
            )));
        }
        Ok(())
    }

    pub fn standard_interval(&self) -> Duration {
        Duration::from_millis(self.standard_interval_ms)
    }

    pub fn hue_interval(&self) -> Duration {
        Duration::from_millis(self.hue_interval_ms)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms)
    }

    pub fn slow_after(&self) -> Duration {
        Duration::from_millis(self.slow_after_ms)
    }

    pub fn give_up_after(&self) -> Duration {
        Duration::from_millis(self.give_up_after_ms)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    pub fn cleanup_budget(&self) -> Duration {
        Duration::from_millis(self.cleanup_budget_ms)
    }

    pub fn state_poll_interval(&self) -> Duration {
        Duration::from_millis(self.state_poll_interval_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }

    /// Encoded length a packet to `controller` must stay below.
    pub fn packet_limit(&self, controller: &Controller) -> usize {
        let size = self
            .packet_sizes
            .get(controller.name())
            .copied()
            .unwrap_or(self.max_packet_size);
        size.saturating_sub(PACKET_HEADROOM)
    }
}
