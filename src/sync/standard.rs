//! Diff for ArduCor controllers.

use std::time::Instant;

use log::debug;

use crate::arducor::{ArduCorPacket, Command};
use crate::backend::Packet;
use crate::config::SyncConfig;
use crate::dispatch::Dispatcher;
use crate::light::LightState;
use crate::store::DesiredStateStore;
use crate::throttle::ThrottleTracker;

/// Custom colors closer than this are considered equal.
const CUSTOM_COLOR_TOLERANCE: f32 = 0.02;

/// Commands that bring `actual` to `desired`, in priority order.
///
/// On/off always comes first. Every other field is only compared when the
/// light should be on.
pub fn diff(desired: &LightState, actual: &LightState) -> ArduCorPacket {
    let index = desired.id().index();
    let mut packet = ArduCorPacket::new();

    if desired.on() != actual.on() {
        packet.push(index, Command::OnOff(desired.on()));
    }
    if !desired.on() {
        return packet;
    }

    if desired.routine().is_single_color() {
        if desired.routine() != actual.routine() {
            packet.push(index, Command::SingleRoutine(desired.routine()));
        }
        if desired.color() != actual.color() {
            packet.push(index, Command::MainColor(desired.color()));
        }
    } else if desired.routine() != actual.routine() || desired.palette() != actual.palette() {
        packet.push(
            index,
            Command::MultiRoutine {
                routine: desired.routine(),
                palette: desired.palette(),
            },
        );
    }

    if desired.brightness() != actual.brightness() {
        packet.push(index, Command::Brightness(desired.brightness()));
    }
    if desired.timeout() != actual.timeout() {
        packet.push(index, Command::IdleTimeout(desired.timeout()));
    }
    if desired.speed() != actual.speed() {
        packet.push(index, Command::Speed(desired.speed()));
    }
    if desired.custom_count() != actual.custom_count() {
        packet.push(index, Command::CustomColorCount(desired.custom_count()));
    }

    for (slot, color) in desired.custom_colors().iter().enumerate() {
        let current = actual.custom_color(slot).unwrap_or_default();
        if color.difference(&current) > CUSTOM_COLOR_TOLERANCE {
            packet.push(
                index,
                Command::CustomArrayColor {
                    slot: slot as u8,
                    color: *color,
                },
            );
        }
    }

    packet
}

/// Diff and dispatch every non-Hue light. Returns how many are out of sync.
///
/// Directives that would push a packet past its controller's size limit are
/// left out; the next tick's diff still carries them.
pub(super) fn sync_lights(
    store: &DesiredStateStore,
    dispatcher: &mut Dispatcher,
    throttle: &mut ThrottleTracker,
    config: &SyncConfig,
    now: Instant,
) -> usize {
    let mut out_of_sync = 0;
    for desired in store.lights().filter(|l| !l.id().transport().is_hue()) {
        let id = desired.id();
        let Some(actual) = dispatcher.fill_state(id) else {
            debug!("No state for {id} yet");
            out_of_sync += 1;
            continue;
        };

        let packet = diff(desired, &actual);
        if packet.is_empty() {
            continue;
        }
        out_of_sync += 1;

        if !throttle.admit(id, now) {
            debug!("{id} throttled");
            continue;
        }
        let limit = config.packet_limit(id.controller());
        let fitted = packet.fit(limit);
        if fitted.len() < packet.len() {
            debug!(
                "{id}: {} directives deferred, packet limit {limit}",
                packet.len() - fitted.len()
            );
        }
        if dispatcher.dispatch(id, Packet::ArduCor(fitted), now) {
            throttle.reset(id, now);
        }
    }
    out_of_sync
}
