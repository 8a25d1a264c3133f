//! ArduCor controllers reached over HTTP.
//!
//! Each packet becomes a `GET http://<controller>/arduino/<packet>`. The
//! application's HTTP client performs the request and hands the reply body
//! back through [`SyncHandle::report`](crate::SyncHandle::report) as a
//! [`BackendReport::ArduCor`].

use std::time::{Duration, Instant};

use futures::channel::mpsc::UnboundedSender;
use log::error;

use super::link::ArduCorLink;
use super::{BackendReport, Packet, Result, TransportBackend};
use crate::cache::DeviceStateCache;
use crate::errors::Error;
use crate::light::{Controller, LightId, LightState, TransportKind};

/// A request for the application's HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArduinoRequest {
    pub controller: Controller,
    pub url: String,
}

impl ArduinoRequest {
    fn new(controller: &Controller, payload: &str) -> Self {
        ArduinoRequest {
            controller: controller.clone(),
            url: format!("http://{}/arduino/{payload}", controller.name()),
        }
    }
}

/// HTTP transport backend.
pub struct HttpBackend {
    link: ArduCorLink,
    outbox: UnboundedSender<ArduinoRequest>,
}

impl HttpBackend {
    pub fn new(outbox: UnboundedSender<ArduinoRequest>, watchdog: Duration, now: Instant) -> Self {
        HttpBackend {
            link: ArduCorLink::new(TransportKind::Http, watchdog, now),
            outbox,
        }
    }

    /// Start polling a controller, by host name or address.
    pub fn add_controller(&mut self, host: &str) {
        self.link.add_controller(host);
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.link.controllers()
    }

    pub fn cache(&self) -> &DeviceStateCache {
        self.link.cache()
    }

    fn queue(&self, controller: &Controller, payload: &str) -> Result<()> {
        self.outbox
            .unbounded_send(ArduinoRequest::new(controller, payload))
            .map_err(|_| Error::ChannelClosed)
    }
}

impl TransportBackend for HttpBackend {
    fn transport(&self) -> TransportKind {
        TransportKind::Http
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
            BackendReport::ArduCor { controller, packet } => BackendReport::ArduCor {
                controller,
                packet: packet.trim().to_string(),
            },
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
