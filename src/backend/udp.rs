//! ArduCor controllers reached over UDP.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use log::{debug, error, warn};

use super::link::ArduCorLink;
use super::{BackendReport, Packet, Result, TransportBackend};
use crate::cache::DeviceStateCache;
use crate::errors::Error;
use crate::light::{Controller, LightId, LightState, TransportKind};
use crate::runtime::{self, AsyncUdpSocket, UdpSocket};
use crate::service::SyncHandle;

/// Port ArduCor controllers listen on.
pub const UDP_PORT: u16 = 10008;

/// An outbound datagram queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub addr: String,
    pub payload: String,
}

/// UDP transport backend.
///
/// Outgoing packets are queued on a channel drained by a detached writer
/// task; a detached reader task forwards every datagram to the sync service
/// as a [`BackendReport::ArduCor`].
pub struct UdpBackend {
    link: ArduCorLink,
    outbox: UnboundedSender<Datagram>,
    port: u16,
}

impl UdpBackend {
    /// Backend writing to `outbox`. No socket is involved, which makes this
    /// the constructor to use when the caller drives I/O itself.
    pub fn new(outbox: UnboundedSender<Datagram>, watchdog: Duration, now: Instant) -> Self {
        UdpBackend {
            link: ArduCorLink::new(TransportKind::Udp, watchdog, now),
            outbox,
            port: UDP_PORT,
        }
    }

    /// Bind `local_addr` and start the reader and writer tasks.
    pub async fn bind(local_addr: &str, handle: SyncHandle, watchdog: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| Error::socket("bind", e))?;
        let socket = Arc::new(socket);
        let (outbox, queued) = unbounded();

        runtime::spawn_detached(write_loop(Arc::clone(&socket), queued));
        runtime::spawn_detached(read_loop(socket, handle));

        Ok(Self::new(outbox, watchdog, Instant::now()))
    }

    /// Send to controllers on a port other than [`UDP_PORT`].
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Start polling a controller before it has said anything.
    pub fn add_controller(&mut self, address: &str) {
        self.link.add_controller(address);
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.link.controllers()
    }

    pub fn cache(&self) -> &DeviceStateCache {
        self.link.cache()
    }

    fn queue(&self, controller: &Controller, payload: String) -> Result<()> {
        let datagram = Datagram {
            addr: format!("{}:{}", controller.name(), self.port),
            payload,
        };
        self.outbox
            .unbounded_send(datagram)
            .map_err(|_| Error::ChannelClosed)
    }
}

impl TransportBackend for UdpBackend {
    fn transport(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn fill_state(&self, id: &LightId) -> Option<LightState> {
        self.link.fill_state(id)
    }

    fn send(&mut self, controller: &Controller, packet: Packet, now: Instant) -> Result<()> {
        let payload = self.link.encode(packet, now)?;
        self.queue(controller, payload)
    }

    fn ingest(&mut self, report: BackendReport, now: Instant) -> bool {
        self.link.ingest(report, now)
    }

    fn poll_states(&mut self, now: Instant) {
        let Some(payload) = self.link.poll_request(now) else {
            return;
        };
        for controller in self.link.controllers() {
            if let Err(e) = self.queue(controller, payload.clone()) {
                error!("Failed to queue state request for {controller}: {e}");
            }
        }
    }
}

async fn write_loop(socket: Arc<UdpSocket>, mut queued: UnboundedReceiver<Datagram>) {
    while let Some(datagram) = queued.next().await {
        if let Err(e) = socket
            .send_to(datagram.payload.as_bytes(), &datagram.addr)
            .await
        {
            error!("UDP send to {} failed: {e}", datagram.addr);
        }
    }
}

async fn read_loop(socket: Arc<UdpSocket>, handle: SyncHandle) {
    let mut buffer = [0u8; 2048];
    loop {
        let (size, addr) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                error!("UDP receive failed: {e}");
                return;
            }
        };
        let packet = match String::from_utf8(buffer[..size].to_vec()) {
            Ok(text) => text,
            Err(e) => {
                warn!("{}", Error::Utf8Decode(e));
                continue;
            }
        };
        let controller = Controller::new(&addr.ip().to_string(), TransportKind::Udp);
        let report = BackendReport::ArduCor { controller, packet };
        if handle.report(TransportKind::Udp, report).is_err() {
            debug!("Sync service gone, stopping UDP reader");
            return;
        }
    }
}
