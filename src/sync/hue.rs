//! Diff and message coalescing for Hue bridges.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use log::debug;

use crate::backend::Packet;
use crate::dispatch::Dispatcher;
use crate::hue::HueStateRequest;
use crate::light::{ColorMode, Controller, LightId, LightState};
use crate::store::DesiredStateStore;
use crate::throttle::ThrottleTracker;

const HSV_TOLERANCE: f32 = 0.02;
const CT_TOLERANCE: f32 = 0.15;
const BRIGHTNESS_TOLERANCE: f32 = 0.05;

fn brightness_differs(desired: &LightState, actual: &LightState) -> bool {
    let delta = (desired.brightness() as f32 - actual.brightness() as f32).abs() / 100.0;
    delta > BRIGHTNESS_TOLERANCE
}

/// The merged request that brings a Hue light to `desired`.
///
/// Which fields are compared depends on the mode the bulb reports: color
/// bulbs compare hue and saturation at full value, color-temperature bulbs
/// use a looser color tolerance, and dimmable bulbs only have brightness.
pub fn diff(desired: &LightState, actual: &LightState) -> HueStateRequest {
    let mut request = HueStateRequest::new();

    if desired.on() != actual.on() {
        request.on(desired.on());
    }
    if !desired.on() {
        return request;
    }

    match actual.color_mode() {
        ColorMode::Hsv | ColorMode::Rgb => {
            let target = desired.color().at_full_value();
            if target.difference(&actual.color()) > HSV_TOLERANCE {
                request.color(&target, desired.brightness());
            }
        }
        ColorMode::Ct => {
            if desired.color().difference(&actual.color()) > CT_TOLERANCE {
                request.color_temperature(desired.color().to_mireds(), desired.brightness());
            }
        }
        ColorMode::Dimmable => {}
    }
    if brightness_differs(desired, actual) {
        request.brightness(desired.brightness());
    }

    request
}

/// Diff every Hue light and send at most one request per bridge.
///
/// Pending lights on a bridge are taken round-robin by index, starting after
/// the light last sent to. The rest wait for a later tick.
pub(super) fn sync_lights(
    store: &DesiredStateStore,
    dispatcher: &mut Dispatcher,
    throttle: &mut ThrottleTracker,
    cursors: &mut HashMap<Controller, u32>,
    timeouts_enabled: bool,
    now: Instant,
) -> usize {
    let mut out_of_sync = 0;
    let mut pending: BTreeMap<Controller, Vec<(LightId, HueStateRequest)>> = BTreeMap::new();

    for desired in store.lights().filter(|l| l.id().transport().is_hue()) {
        let id = desired.id();
        let Some(actual) = dispatcher.fill_state(id) else {
            debug!("No state for {id} yet");
            out_of_sync += 1;
            continue;
        };
        let request = diff(desired, &actual);
        if request.is_empty() {
            continue;
        }
        out_of_sync += 1;
        pending
            .entry(id.controller().clone())
            .or_default()
            .push((id.clone(), request));
    }

    for (controller, mut lights) in pending {
        lights.sort_by_key(|(id, _)| id.index());
        if let Some(last) = cursors.get(&controller) {
            let start = lights
                .iter()
                .position(|(id, _)| id.index() > *last)
                .unwrap_or(0);
            lights.rotate_left(start);
        }

        let Some((id, request)) = lights.into_iter().find(|(id, _)| throttle.admit(id, now)) else {
            debug!("Every pending light on {controller} is throttled");
            continue;
        };
        let index = id.index();
        if dispatcher.dispatch(&id, Packet::Hue { index, request }, now) {
            throttle.reset(&id, now);
            cursors.insert(controller.clone(), index);
            if timeouts_enabled {
                suspend_timeout(dispatcher, &controller, index);
            }
        }
    }

    out_of_sync
}

/// Disable a light's idle-timeout schedule so it cannot fire mid-change.
/// The cleanup pass turns it back on.
fn suspend_timeout(dispatcher: &mut Dispatcher, controller: &Controller, index: u32) {
    let Some(schedules) = dispatcher.schedules(controller) else {
        return;
    };
    if let Some(schedule) = schedules
        .iter()
        .find(|s| s.light_index() == Some(index) && s.enabled())
    {
        let minutes = schedule.timeout_minutes().unwrap_or(0);
        dispatcher.update_schedule(controller, schedule.id(), false, minutes);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::fake::{RecordingBackend, ScheduleCall};
    use crate::hue::HueSchedule;
    use crate::light::TransportKind;
    use crate::types::Color;

    fn bridge() -> Controller {
        Controller::new("C1", TransportKind::Hue)
    }

    fn light(index: u32) -> LightState {
        LightState::new(LightId::new(bridge(), index))
    }

    #[test]
    fn test_ct_distance_threshold() {
        let actual = light(1)
            .with_on(true)
            .with_color_mode(ColorMode::Ct)
            .with_color(Color::rgb(0, 0, 0))
            .with_brightness(60);

        // 153 / 765 = 0.20
        let far = light(1).with_on(true).with_color(Color::rgb(153, 0, 0)).with_brightness(60);
        let request = diff(&far, &actual);
        assert!(request.ct.is_some());
        assert!(request.bri.is_some());

        // 76 / 765 ~ 0.10
        let near = light(1).with_on(true).with_color(Color::rgb(76, 0, 0)).with_brightness(60);
        assert!(diff(&near, &actual).is_empty());
    }

    #[test]
    fn test_hsv_compares_at_full_value() {
        let actual = light(1)
            .with_on(true)
            .with_color_mode(ColorMode::Hsv)
            .with_color(Color::rgb(255, 0, 0))
            .with_brightness(50);
        let desired = light(1)
            .with_on(true)
            .with_color(Color::rgb(128, 0, 0))
            .with_brightness(50);
        assert!(diff(&desired, &actual).is_empty());

        let blue = desired.clone().with_color(Color::rgb(0, 0, 200));
        let request = diff(&blue, &actual);
        assert_eq!(request.hue, Some(43690));
        assert_eq!(request.sat, Some(254));
    }

    #[test]
    fn test_dimmable_only_tracks_brightness() {
        let actual = light(1)
            .with_on(true)
            .with_color_mode(ColorMode::Dimmable)
            .with_brightness(50);
        let desired = light(1)
            .with_on(true)
            .with_color(Color::rgb(0, 255, 0))
            .with_brightness(54);
        assert!(diff(&desired, &actual).is_empty());

        let brighter = desired.with_brightness(80);
        let request = diff(&brighter, &actual);
        assert_eq!(request.bri, Some(203));
        assert_eq!(request.hue, None);
    }

    #[test]
    fn test_turn_on_merges_with_color() {
        let actual = light(1).with_color_mode(ColorMode::Hsv);
        let desired = light(1).with_on(true).with_color(Color::rgb(0, 255, 0)).with_brightness(100);
        let request = diff(&desired, &actual);
        assert_eq!(request.on, Some(true));
        assert!(request.hue.is_some());
    }

    fn setup(indices: &[u32]) -> (DesiredStateStore, Dispatcher, RecordingBackend) {
        let backend = RecordingBackend::new(TransportKind::Hue);
        let mut store = DesiredStateStore::new();
        for index in indices {
            store.upsert(light(*index).with_on(true).with_brightness(100));
            backend.cache.lock().unwrap().insert(light(*index));
        }
        (store, Dispatcher::new(), backend)
    }

    #[test]
    fn test_one_request_per_bridge_per_tick() {
        let (store, mut dispatcher, backend) = setup(&[1, 2]);
        let sent = backend.sent.clone();
        dispatcher.register(backend);
        let mut throttle = ThrottleTracker::new();
        let mut cursors = HashMap::new();
        let now = Instant::now();

        let out = sync_lights(&store, &mut dispatcher, &mut throttle, &mut cursors, true, now);
        assert_eq!(out, 2);
        assert_eq!(sent.lock().unwrap().len(), 1);

        let later = now + Duration::from_millis(100);
        sync_lights(&store, &mut dispatcher, &mut throttle, &mut cursors, true, later);
        let sent = sent.lock().unwrap();
        let indices: Vec<u32> = sent
            .iter()
            .map(|(_, packet)| match packet {
                Packet::Hue { index, .. } => *index,
                Packet::ArduCor(_) => unreachable!(),
            })
            .collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_round_robin_wraps() {
        let mut cursors = HashMap::from([(bridge(), 2)]);
        let (store, mut dispatcher, backend) = setup(&[1, 2]);
        let sent = backend.sent.clone();
        dispatcher.register(backend);

        let mut throttle = ThrottleTracker::new();
        sync_lights(&store, &mut dispatcher, &mut throttle, &mut cursors, true, Instant::now());
        assert!(matches!(sent.lock().unwrap()[0].1, Packet::Hue { index: 1, .. }));
        assert_eq!(cursors.get(&bridge()), Some(&1));
    }

    #[test]
    fn test_dispatch_suspends_enabled_timeout() {
        let (store, mut dispatcher, backend) = setup(&[7]);
        backend.schedules.lock().unwrap().insert(
            bridge(),
            vec![HueSchedule::new("3", "Corluma_timeout_7", true, Some("PT00:29:45"))],
        );
        let calls = backend.schedule_calls.clone();
        dispatcher.register(backend);

        let mut throttle = ThrottleTracker::new();
        let mut cursors = HashMap::new();
        sync_lights(&store, &mut dispatcher, &mut throttle, &mut cursors, true, Instant::now());
        assert_eq!(
            *calls.lock().unwrap(),
            vec![ScheduleCall::Update {
                id: "3".into(),
                enabled: false,
                minutes: 30
            }]
        );
    }
}
