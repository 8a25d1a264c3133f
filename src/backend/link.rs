//! State shared by the transports that speak the ArduCor packet format.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::{BackendReport, Packet, Result};
use crate::arducor::{ArduCorPacket, Command};
use crate::cache::DeviceStateCache;
use crate::errors::Error;
use crate::light::{Controller, LightId, LightState, TransportKind};
use crate::watchdog::StateUpdateWatchdog;

/// Actual-state cache, known controllers, and watchdog for one ArduCor
/// transport. The backends only add framing and I/O around it.
#[derive(Debug)]
pub(super) struct ArduCorLink {
    transport: TransportKind,
    cache: DeviceStateCache,
    controllers: BTreeSet<Controller>,
    watchdog: StateUpdateWatchdog,
}

impl ArduCorLink {
    pub(super) fn new(transport: TransportKind, watchdog: Duration, now: Instant) -> Self {
        ArduCorLink {
            transport,
            cache: DeviceStateCache::new(),
            controllers: BTreeSet::new(),
            watchdog: StateUpdateWatchdog::new(watchdog, now),
        }
    }

    pub(super) fn add_controller(&mut self, name: &str) {
        self.controllers.insert(Controller::new(name, self.transport));
    }

    pub(super) fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.controllers.iter()
    }

    pub(super) fn cache(&self) -> &DeviceStateCache {
        &self.cache
    }

    pub(super) fn fill_state(&self, id: &LightId) -> Option<LightState> {
        self.cache.get(id).cloned()
    }

    /// Wire text of an outgoing packet. Counts as traffic.
    pub(super) fn encode(&mut self, packet: Packet, now: Instant) -> Result<String> {
        let Packet::ArduCor(packet) = packet else {
            return Err(Error::packet_mismatch(self.transport, packet.kind()));
        };
        self.watchdog.touch(now);
        Ok(packet.encode())
    }

    /// The state request sent to every known controller, if polling is
    /// still allowed at `now`.
    pub(super) fn poll_request(&self, now: Instant) -> Option<String> {
        if !self.watchdog.allows_polling(now) {
            return None;
        }
        let mut request = ArduCorPacket::new();
        request.push(0, Command::StateUpdateRequest);
        Some(request.encode())
    }

    /// Fold a controller's packet into the cache. A full state report
    /// creates the light's entry; other commands only update an entry that
    /// already exists.
    pub(super) fn ingest(&mut self, report: BackendReport, now: Instant) -> bool {
        let BackendReport::ArduCor { controller, packet } = report else {
            warn!("{:?} backend ignoring non-ArduCor report", self.transport);
            return false;
        };
        let decoded = match ArduCorPacket::decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Discarding packet from {controller}: {e}");
                return false;
            }
        };

        self.watchdog.touch(now);
        self.controllers.insert(controller.clone());
        for message in decoded.messages() {
            let id = LightId::new(controller.clone(), message.index);
            match &message.command {
                Command::StateReport(report) => {
                    let mut state = LightState::new(id);
                    state.apply(&Command::StateReport(*report));
                    self.cache.insert(state);
                }
                command => {
                    if !self.cache.update(&id, |state| state.apply(command)) {
                        debug!("Ignoring {:?} for {id}, no state report yet", command.header());
                    }
                }
            }
        }
        true
    }
}
