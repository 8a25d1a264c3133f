//! Hue bridges, driven through an HTTP client the application supplies.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::channel::mpsc::UnboundedSender;
use log::{debug, warn};
use serde_json::Value;
use strum_macros::Display;

use super::{BackendReport, Packet, Result, TransportBackend};
use crate::cache::DeviceStateCache;
use crate::errors::Error;
use crate::hue::{self, HueSchedule};
use crate::light::{Controller, LightId, LightState, TransportKind};
use crate::watchdog::StateUpdateWatchdog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
}

/// One HTTP request for a bridge. The application's HTTP client performs it
/// and feeds the reply back as a [`BackendReport`].
#[derive(Debug, Clone, PartialEq)]
pub struct HueRequest {
    pub bridge: Controller,
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

/// Schedule replies a create may be missing from before it is retried. The
/// first reply can predate the POST.
const PENDING_CREATE_REPLIES: u8 = 2;

#[derive(Debug)]
struct Bridge {
    controller: Controller,
    username: String,
    schedules: Option<Vec<HueSchedule>>,
    /// Light index of each created schedule not yet listed, with the number
    /// of schedule replies that lacked it.
    pending_creates: HashMap<u32, u8>,
}

impl Bridge {
    fn set_schedules(&mut self, schedules: Vec<HueSchedule>) {
        self.pending_creates.retain(|index, misses| {
            if schedules.iter().any(|s| s.light_index() == Some(*index)) {
                return false;
            }
            *misses += 1;
            if *misses >= PENDING_CREATE_REPLIES {
                warn!("Schedule for light {index} on {} never appeared", self.controller);
                return false;
            }
            true
        });
        self.schedules = Some(schedules);
    }
}

/// Hue bridge backend.
pub struct HueBridgeBackend {
    bridges: HashMap<Controller, Bridge>,
    cache: DeviceStateCache,
    outbox: UnboundedSender<HueRequest>,
    watchdog: StateUpdateWatchdog,
}

impl HueBridgeBackend {
    pub fn new(outbox: UnboundedSender<HueRequest>, watchdog: Duration, now: Instant) -> Self {
        HueBridgeBackend {
            bridges: HashMap::new(),
            cache: DeviceStateCache::new(),
            outbox,
            watchdog: StateUpdateWatchdog::new(watchdog, now),
        }
    }

    /// Register a paired bridge. Returns its controller identity.
    pub fn add_bridge(&mut self, id: &str, username: &str) -> Controller {
        let controller = Controller::new(id, TransportKind::Hue);
        self.bridges.insert(
            controller.clone(),
            Bridge {
                controller: controller.clone(),
                username: username.to_string(),
                schedules: None,
                pending_creates: HashMap::new(),
            },
        );
        controller
    }

    pub fn cache(&self) -> &DeviceStateCache {
        &self.cache
    }

    fn bridge(&self, controller: &Controller) -> Result<&Bridge> {
        self.bridges
            .get(controller)
            .ok_or_else(|| Error::UnknownController(controller.to_string()))
    }

    fn request(
        &self,
        bridge: &Bridge,
        method: HttpMethod,
        resource: &str,
        body: Option<Value>,
    ) -> Result<()> {
        let request = HueRequest {
            bridge: bridge.controller.clone(),
            method,
            path: format!("/api/{}/{resource}", bridge.username),
            body,
        };
        debug!("{} {}", request.method, request.path);
        self.outbox
            .unbounded_send(request)
            .map_err(|_| Error::ChannelClosed)
    }
}

impl TransportBackend for HueBridgeBackend {
    fn transport(&self) -> TransportKind {
        TransportKind::Hue
    }

    fn fill_state(&self, id: &LightId) -> Option<LightState> {
        self.cache.get(id).cloned()
    }

    fn send(&mut self, controller: &Controller, packet: Packet, now: Instant) -> Result<()> {
        let Packet::Hue { index, request } = packet else {
            return Err(Error::packet_mismatch(self.transport(), packet.kind()));
        };
        let body = serde_json::to_value(&request).map_err(Error::JsonDump)?;
        let bridge = self.bridge(controller)?;
        self.request(
            bridge,
            HttpMethod::Put,
            &format!("lights/{index}/state"),
            Some(body),
        )?;
        self.watchdog.touch(now);
        Ok(())
    }

    fn ingest(&mut self, report: BackendReport, now: Instant) -> bool {
        match report {
            BackendReport::HueLights { bridge, body } => {
                if !self.bridges.contains_key(&bridge) {
                    warn!("Lights reply from unknown bridge {bridge}");
                    return false;
                }
                match hue::parse_lights(&bridge, &body) {
                    Ok(lights) => lights.into_iter().for_each(|l| self.cache.insert(l)),
                    Err(e) => {
                        warn!("Discarding lights reply from {bridge}: {e}");
                        return false;
                    }
                }
            }
            BackendReport::HueSchedules { bridge, body } => {
                let Some(entry) = self.bridges.get_mut(&bridge) else {
                    warn!("Schedules reply from unknown bridge {bridge}");
                    return false;
                };
                match hue::parse_schedules(&body) {
                    Ok(schedules) => entry.set_schedules(schedules),
                    Err(e) => {
                        warn!("Discarding schedules reply from {bridge}: {e}");
                        return false;
                    }
                }
            }
            BackendReport::ArduCor { controller, .. } => {
                warn!("Hue backend ignoring ArduCor packet from {controller}");
                return false;
            }
        }
        self.watchdog.touch(now);
        true
    }

    fn poll_states(&mut self, now: Instant) {
        if !self.watchdog.allows_polling(now) {
            return;
        }
        for bridge in self.bridges.values() {
            for resource in ["lights", "schedules"] {
                if let Err(e) = self.request(bridge, HttpMethod::Get, resource, None) {
                    warn!("Failed to queue {resource} poll for {}: {e}", bridge.controller);
                }
            }
        }
    }

    fn schedules(&self, controller: &Controller) -> Option<Vec<HueSchedule>> {
        self.bridges.get(controller)?.schedules.clone()
    }

    fn update_schedule(
        &mut self,
        controller: &Controller,
        id: &str,
        enabled: bool,
        minutes: u32,
    ) -> Result<()> {
        let bridge = self.bridge(controller)?;
        let body = hue::schedule_update_body(enabled, minutes);
        self.request(bridge, HttpMethod::Put, &format!("schedules/{id}"), Some(body))?;
        self.request(bridge, HttpMethod::Get, "schedules", None)?;

        // Mirror the change until the refreshed list arrives.
        let known = self
            .bridges
            .get_mut(controller)
            .and_then(|b| b.schedules.as_mut())
            .and_then(|list| list.iter_mut().find(|s| s.id() == id));
        if let Some(schedule) = known {
            schedule.set_enabled(enabled);
            schedule.set_timeout(minutes);
        }
        Ok(())
    }

    fn create_schedule(&mut self, controller: &Controller, index: u32, minutes: u32) -> Result<()> {
        let bridge = self.bridge(controller)?;
        if bridge.pending_creates.contains_key(&index) {
            debug!("Schedule for light {index} on {controller} already requested");
            return Ok(());
        }
        let body = hue::schedule_create_body(&bridge.username, index, minutes);
        self.request(bridge, HttpMethod::Post, "schedules", Some(body))?;
        self.request(bridge, HttpMethod::Get, "schedules", None)?;

        if let Some(bridge) = self.bridges.get_mut(controller) {
            bridge.pending_creates.insert(index, 0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc::{UnboundedReceiver, unbounded};

    use super::*;
    use crate::hue::HueStateRequest;

    fn backend() -> (HueBridgeBackend, Controller, UnboundedReceiver<HueRequest>, Instant) {
        let (tx, rx) = unbounded();
        let now = Instant::now();
        let mut backend = HueBridgeBackend::new(tx, Duration::from_secs(15), now);
        let bridge = backend.add_bridge("001788fffe123456", "secret");
        (backend, bridge, rx, now)
    }

    #[test]
    fn test_send_puts_light_state() {
        let (mut hue, bridge, mut rx, now) = backend();
        let mut request = HueStateRequest::new();
        request.on(false);
        hue.send(&bridge, Packet::Hue { index: 3, request }, now).unwrap();

        let sent = rx.try_next().unwrap().unwrap();
        assert_eq!(sent.method, HttpMethod::Put);
        assert_eq!(sent.path, "/api/secret/lights/3/state");
        assert_eq!(sent.body, Some(serde_json::json!({"on": false})));
    }

    #[test]
    fn test_send_to_unknown_bridge_fails() {
        let (mut hue, _, _rx, now) = backend();
        let stranger = Controller::new("nope", TransportKind::Hue);
        let packet = Packet::Hue {
            index: 1,
            request: HueStateRequest::new(),
        };
        assert_eq!(
            hue.send(&stranger, packet, now),
            Err(Error::UnknownController(stranger.to_string()))
        );
    }

    #[test]
    fn test_ingest_lights_and_schedules() {
        let (mut hue, bridge, _rx, now) = backend();
        assert!(hue.schedules(&bridge).is_none());

        let lights = r#"{"7": {"state": {"on": true, "bri": 254, "ct": 300, "colormode": "ct", "reachable": true}}}"#;
        assert!(hue.ingest(
            BackendReport::HueLights { bridge: bridge.clone(), body: lights.into() },
            now,
        ));
        let state = hue.fill_state(&LightId::new(bridge.clone(), 7)).unwrap();
        assert_eq!(state.brightness(), 100);

        let schedules = r#"{"4": {"name": "Corluma_timeout_7", "status": "enabled", "localtime": "PT00:04:45"}}"#;
        assert!(hue.ingest(
            BackendReport::HueSchedules { bridge: bridge.clone(), body: schedules.into() },
            now,
        ));
        assert_eq!(hue.schedules(&bridge).unwrap()[0].light_index(), Some(7));

        assert!(!hue.ingest(
            BackendReport::HueLights { bridge, body: "{oops".into() },
            now,
        ));
    }

    #[test]
    fn test_update_schedule_refreshes_list() {
        let (mut hue, bridge, mut rx, _) = backend();
        hue.update_schedule(&bridge, "4", true, 30).unwrap();

        let put = rx.try_next().unwrap().unwrap();
        assert_eq!(put.path, "/api/secret/schedules/4");
        assert_eq!(put.body.unwrap()["localtime"], "PT00:29:45");
        let get = rx.try_next().unwrap().unwrap();
        assert_eq!(get.method, HttpMethod::Get);
        assert_eq!(get.path, "/api/secret/schedules");
    }

    #[test]
    fn test_update_schedule_mirrors_cached_list() {
        let (mut hue, bridge, _rx, now) = backend();
        let schedules = r#"{"4": {"name": "Corluma_timeout_7", "status": "enabled", "localtime": "PT00:09:45"}}"#;
        assert!(hue.ingest(
            BackendReport::HueSchedules { bridge: bridge.clone(), body: schedules.into() },
            now,
        ));

        hue.update_schedule(&bridge, "4", false, 30).unwrap();
        let cached = hue.schedules(&bridge).unwrap();
        assert!(!cached[0].enabled());
        assert_eq!(cached[0].timeout_minutes(), Some(30));
    }

    fn methods(rx: &mut UnboundedReceiver<HueRequest>) -> Vec<HttpMethod> {
        std::iter::from_fn(|| rx.try_next().ok().flatten())
            .map(|r| r.method)
            .collect()
    }

    #[test]
    fn test_create_schedule_is_sent_once_until_listed() {
        let (mut hue, bridge, mut rx, now) = backend();
        let schedules = |body: &str| BackendReport::HueSchedules {
            bridge: bridge.clone(),
            body: body.into(),
        };
        assert!(hue.ingest(schedules("{}"), now));

        for _ in 0..5 {
            hue.create_schedule(&bridge, 7, 30).unwrap();
        }
        assert_eq!(methods(&mut rx), vec![HttpMethod::Post, HttpMethod::Get]);

        let listed = r#"{"9": {"name": "Corluma_timeout_7", "status": "enabled", "localtime": "PT00:29:45"}}"#;
        assert!(hue.ingest(schedules(listed), now));
        assert!(hue.ingest(schedules("{}"), now));
        hue.create_schedule(&bridge, 7, 30).unwrap();
        assert_eq!(methods(&mut rx), vec![HttpMethod::Post, HttpMethod::Get]);
    }

    #[test]
    fn test_create_schedule_retries_after_missing_replies() {
        let (mut hue, bridge, mut rx, now) = backend();
        hue.create_schedule(&bridge, 7, 30).unwrap();
        methods(&mut rx);

        let empty = || BackendReport::HueSchedules { bridge: bridge.clone(), body: "{}".into() };
        assert!(hue.ingest(empty(), now));
        hue.create_schedule(&bridge, 7, 30).unwrap();
        assert!(methods(&mut rx).is_empty());

        assert!(hue.ingest(empty(), now));
        hue.create_schedule(&bridge, 7, 30).unwrap();
        assert_eq!(methods(&mut rx), vec![HttpMethod::Post, HttpMethod::Get]);
    }

    #[test]
    fn test_poll_requests_lights_and_schedules() {
        let (mut hue, _, mut rx, now) = backend();
        hue.poll_states(now);
        let paths: Vec<String> = std::iter::from_fn(|| rx.try_next().ok().flatten())
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["/api/secret/lights", "/api/secret/schedules"]);
    }
}
