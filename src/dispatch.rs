//! Routing of directives to the backend owning a light's transport.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, error, warn};

use crate::backend::{BackendReport, Packet, TransportBackend};
use crate::errors::Error;
use crate::history::{PacketHistory, PacketOutcome};
use crate::hue::HueSchedule;
use crate::light::{Controller, LightId, LightState, TransportKind};

/// Registry of transport backends keyed by transport.
///
/// The dispatcher does no retrying: a failed send is logged, recorded in the
/// history and reported as `false`, and the sync engine emits the directive
/// again on a later tick if it is still outstanding.
#[derive(Default)]
pub struct Dispatcher {
    backends: HashMap<TransportKind, Box<dyn TransportBackend>>,
    history: PacketHistory,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one for its transport.
    pub fn register<B: TransportBackend + 'static>(&mut self, backend: B) {
        let transport = backend.transport();
        if self.backends.insert(transport, Box::new(backend)).is_some() {
            warn!("Replaced backend for {transport:?}");
        }
    }

    pub fn has_backend(&self, transport: TransportKind) -> bool {
        self.backends.contains_key(&transport)
    }

    pub fn history(&self) -> &PacketHistory {
        &self.history
    }

    pub fn fill_state(&self, id: &LightId) -> Option<LightState> {
        self.backends.get(&id.transport())?.fill_state(id)
    }

    /// Hand a packet to the backend owning the light's controller.
    pub fn dispatch(&mut self, id: &LightId, packet: Packet, now: Instant) -> bool {
        let transport = id.transport();
        let target = id.controller().to_string();
        let text = packet.describe();

        let result = match self.backends.get_mut(&transport) {
            Some(backend) => backend.send(id.controller(), packet, now),
            None => Err(Error::NoBackend(transport)),
        };

        match result {
            Ok(()) => {
                debug!("Sent {text} to {id}");
                self.history.record(PacketOutcome::Sent, transport, &target, text);
                true
            }
            Err(e) => {
                error!("Failed to send {text} to {id}: {e}");
                self.history.record_error(&e.to_string());
                self.history.record(PacketOutcome::Failed, transport, &target, text);
                false
            }
        }
    }

    pub fn schedules(&self, controller: &Controller) -> Option<Vec<HueSchedule>> {
        self.backends.get(&controller.transport())?.schedules(controller)
    }

    pub fn update_schedule(&mut self, controller: &Controller, id: &str, enabled: bool, minutes: u32) -> bool {
        let result = match self.backends.get_mut(&controller.transport()) {
            Some(backend) => backend.update_schedule(controller, id, enabled, minutes),
            None => Err(Error::NoBackend(controller.transport())),
        };
        self.absorb(result, "update schedule")
    }

    pub fn create_schedule(&mut self, controller: &Controller, index: u32, minutes: u32) -> bool {
        let result = match self.backends.get_mut(&controller.transport()) {
            Some(backend) => backend.create_schedule(controller, index, minutes),
            None => Err(Error::NoBackend(controller.transport())),
        };
        self.absorb(result, "create schedule")
    }

    /// Pass a report to its backend. Returns `true` if it was accepted.
    pub fn ingest(&mut self, transport: TransportKind, report: BackendReport, now: Instant) -> bool {
        let Some(backend) = self.backends.get_mut(&transport) else {
            warn!("Dropping report for {transport:?}: {}", Error::NoBackend(transport));
            return false;
        };
        let target = match &report {
            BackendReport::ArduCor { controller, .. } => controller.to_string(),
            BackendReport::HueLights { bridge, .. } | BackendReport::HueSchedules { bridge, .. } => {
                bridge.to_string()
            }
        };
        let text = match &report {
            BackendReport::ArduCor { packet, .. } => packet.clone(),
            BackendReport::HueLights { .. } => "lights".to_string(),
            BackendReport::HueSchedules { .. } => "schedules".to_string(),
        };
        let accepted = backend.ingest(report, now);
        if accepted {
            self.history.record(PacketOutcome::Received, transport, &target, text);
        }
        accepted
    }

    pub fn poll_states(&mut self, now: Instant) {
        for backend in self.backends.values_mut() {
            backend.poll_states(now);
        }
    }

    fn absorb(&mut self, result: Result<(), Error>, action: &str) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to {action}: {e}");
                self.history.record_error(&e.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arducor::{ArduCorPacket, Command};
    use crate::backend::fake::RecordingBackend;

    fn light(transport: TransportKind) -> LightId {
        LightId::new(Controller::new("c1", transport), 1)
    }

    fn packet() -> Packet {
        let mut packet = ArduCorPacket::new();
        packet.push(1, Command::OnOff(true));
        Packet::ArduCor(packet)
    }

    #[test]
    fn test_dispatch_routes_by_transport() {
        let backend = RecordingBackend::new(TransportKind::Udp);
        let sent = backend.sent.clone();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(backend);

        assert!(dispatcher.dispatch(&light(TransportKind::Udp), packet(), Instant::now()));
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.history().summary().sent_count, 1);
    }

    #[test]
    fn test_http_and_serial_backends_receive_their_lights() {
        use std::time::Duration;

        use futures::channel::mpsc::unbounded;

        use crate::backend::{HttpBackend, SerialBackend};

        let now = Instant::now();
        let (http_tx, mut http_rx) = unbounded();
        let (serial_tx, mut serial_rx) = unbounded();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(HttpBackend::new(http_tx, Duration::from_secs(15), now));
        dispatcher.register(SerialBackend::new(serial_tx, Duration::from_secs(15), now));

        assert!(dispatcher.dispatch(&light(TransportKind::Http), packet(), now));
        assert!(dispatcher.dispatch(&light(TransportKind::Serial), packet(), now));

        assert_eq!(http_rx.try_next().unwrap().unwrap().url, "http://c1/arduino/0,1,1&");
        assert_eq!(serial_rx.try_next().unwrap().unwrap().payload, "0,1,1&;");
        assert_eq!(dispatcher.history().summary().sent_count, 2);
    }

    #[test]
    fn test_missing_backend_is_absorbed() {
        let mut dispatcher = Dispatcher::new();
        assert!(!dispatcher.dispatch(&light(TransportKind::Serial), packet(), Instant::now()));
        assert_eq!(
            dispatcher.history().last_error(),
            Some("no backend registered for Serial")
        );
    }

    #[test]
    fn test_failed_send_is_recorded() {
        let mut backend = RecordingBackend::new(TransportKind::Http);
        backend.fail_sends = true;
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(backend);

        assert!(!dispatcher.dispatch(&light(TransportKind::Http), packet(), Instant::now()));
        assert_eq!(dispatcher.history().summary().failed_count, 1);
    }

    #[test]
    fn test_schedules_unsupported_off_hue() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(crate::backend::UdpBackend::new(
            futures::channel::mpsc::unbounded().0,
            std::time::Duration::from_secs(15),
            Instant::now(),
        ));
        let controller = Controller::new("c1", TransportKind::Udp);
        assert!(dispatcher.schedules(&controller).is_none());
        assert!(!dispatcher.update_schedule(&controller, "1", true, 5));
    }
}
