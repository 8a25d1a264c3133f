//! ArduCor controllers on a serial port.
//!
//! Port I/O stays with the application: writes are queued as [`SerialWrite`]
//! values and every line read back is reported as a
//! [`BackendReport::ArduCor`] naming the port.

use std::time::{Duration, Instant};

use futures::channel::mpsc::UnboundedSender;
use log::error;

use super::link::ArduCorLink;
use super::{BackendReport, Packet, Result, TransportBackend};
use crate::cache::DeviceStateCache;
use crate::errors::Error;
use crate::light::{Controller, LightId, LightState, TransportKind};

/// Terminates every packet written to a port.
pub const SERIAL_DELIMITER: char = ';';

/// Bytes to write to one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialWrite {
    pub port: String,
    pub payload: String,
}

/// Serial transport backend.
pub struct SerialBackend {
    link: ArduCorLink,
    outbox: UnboundedSender<SerialWrite>,
}

impl SerialBackend {
    pub fn new(outbox: UnboundedSender<SerialWrite>, watchdog: Duration, now: Instant) -> Self {
        SerialBackend {
            link: ArduCorLink::new(TransportKind::Serial, watchdog, now),
            outbox,
        }
    }

    /// Start polling an opened port, e.g. `COM4` or `/dev/ttyUSB0`.
    pub fn add_port(&mut self, port: &str) {
        self.link.add_controller(port);
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.link.controllers()
    }

    pub fn cache(&self) -> &DeviceStateCache {
        self.link.cache()
    }

    fn queue(&self, controller: &Controller, payload: &str) -> Result<()> {
        let write = SerialWrite {
            port: controller.name().to_string(),
            payload: format!("{payload}{SERIAL_DELIMITER}"),
        };
        self.outbox
            .unbounded_send(write)
            .map_err(|_| Error::ChannelClosed)
    }
}

impl TransportBackend for SerialBackend {
    fn transport(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn fill_state(&self, id: &LightId) -> Option<LightState> {
        self.link.fill_state(id)
    }

    fn send(&mut self, controller: &Controller, packet: Packet, now: Instant) -> Result<()> {
        let payload = self.link.encode(packet, now)?;
        self.queue(controller, &payload)
    }

    fn ingest(&mut self, report: BackendReport, now: Instant) -> bool {
        let report = match report {
            BackendReport::ArduCor { controller, packet } => {
                let packet = packet.trim().trim_end_matches(SERIAL_DELIMITER).to_string();
                BackendReport::ArduCor { controller, packet }
            }
            other => other,
        };
        self.link.ingest(report, now)
    }

    fn poll_states(&mut self, now: Instant) {
        let Some(payload) = self.link.poll_request(now) else {
            return;
        };
        for controller in self.link.controllers() {
            if let Err(e) = self.queue(controller, &payload) {
                error!("Failed to queue state request for {controller}: {e}");
            }
        }
    }
}
