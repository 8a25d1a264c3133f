//! Transport backends: the adapters that own a transport's actual-state
//! cache and turn sync directives into traffic.

mod http;
mod hue;
mod link;
mod serial;
mod udp;

use std::time::Instant;

use crate::arducor::ArduCorPacket;
use crate::errors::Error;
use crate::hue::{HueSchedule, HueStateRequest};
use crate::light::{Controller, LightId, LightState, TransportKind};

pub use http::{ArduinoRequest, HttpBackend};
pub use hue::{HttpMethod, HueBridgeBackend, HueRequest};
pub use serial::{SERIAL_DELIMITER, SerialBackend, SerialWrite};
pub use udp::{Datagram, UDP_PORT, UdpBackend};

type Result<T> = std::result::Result<T, Error>;

/// A directive set for one light, in the owning transport's format.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Commands for the HTTP, UDP, and serial controllers.
    ArduCor(ArduCorPacket),
    /// One merged state request for a light on a Hue bridge.
    Hue { index: u32, request: HueStateRequest },
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::ArduCor(_) => "ArduCor",
            Packet::Hue { .. } => "Hue",
        }
    }

    /// Text form used in logs and the packet history.
    pub fn describe(&self) -> String {
        match self {
            Packet::ArduCor(packet) => packet.encode(),
            Packet::Hue { index, request } => {
                let body = serde_json::to_string(request).unwrap_or_default();
                format!("{index}:{body}")
            }
        }
    }
}

/// Raw input a backend received from its hardware.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReport {
    /// An ArduCor packet from a controller.
    ArduCor { controller: Controller, packet: String },
    /// A bridge's `GET /lights` reply.
    HueLights { bridge: Controller, body: String },
    /// A bridge's `GET /schedules` reply.
    HueSchedules { bridge: Controller, body: String },
}

/// Uniform contract every transport implements.
///
/// Backends never block: `send` queues traffic for an I/O task and returns,
/// and replies come back through [`TransportBackend::ingest`] on the sync
/// task.
pub trait TransportBackend: Send {
    fn transport(&self) -> TransportKind;

    /// Last known actual state of a light, or `None` if it never reported.
    fn fill_state(&self, id: &LightId) -> Option<LightState>;

    /// Queue a packet for a controller.
    fn send(&mut self, controller: &Controller, packet: Packet, now: Instant) -> Result<()>;

    /// Fold a report into the cache. Returns `false` if it was discarded.
    fn ingest(&mut self, report: BackendReport, now: Instant) -> bool;

    /// Issue periodic state requests, unless the watchdog has suspended them.
    fn poll_states(&mut self, now: Instant);

    /// Bridge-resident schedules, once a schedule list has been received.
    fn schedules(&self, _controller: &Controller) -> Option<Vec<HueSchedule>> {
        None
    }

    fn update_schedule(
        &mut self,
        _controller: &Controller,
        _id: &str,
        _enabled: bool,
        _minutes: u32,
    ) -> Result<()> {
        Err(Error::SchedulesUnsupported(self.transport()))
    }

    fn create_schedule(&mut self, _controller: &Controller, _index: u32, _minutes: u32) -> Result<()> {
        Err(Error::SchedulesUnsupported(self.transport()))
    }
}
