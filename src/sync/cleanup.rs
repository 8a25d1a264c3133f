//! Post-convergence reconciliation of Hue idle-timeout schedules.

use std::time::{Duration, Instant};

use log::debug;

use crate::dispatch::Dispatcher;
use crate::hue::HueSchedule;
use crate::light::LightState;
use crate::store::DesiredStateStore;
use crate::throttle::ThrottleTracker;

#[derive(Debug, Clone, Copy)]
pub(super) struct CleanupPass {
    started: Instant,
    pub(super) next_run: Instant,
}

impl CleanupPass {
    pub(super) fn new(now: Instant, delay: Duration) -> Self {
        CleanupPass {
            started: now,
            next_run: now + delay,
        }
    }

    pub(super) fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Fix {
    Update { id: String, enabled: bool, minutes: u32 },
    Create { minutes: u32 },
}

/// What, if anything, a light's schedule needs.
fn fix_for(desired: &LightState, existing: Option<&HueSchedule>, timeouts_enabled: bool) -> Option<Fix> {
    let minutes = desired.timeout();
    let wanted = timeouts_enabled && minutes > 0;

    match existing {
        Some(schedule) if wanted => {
            let stale = schedule.timeout_minutes() != Some(minutes);
            (!schedule.enabled() || stale).then(|| Fix::Update {
                id: schedule.id().to_string(),
                enabled: true,
                minutes,
            })
        }
        Some(schedule) => schedule.enabled().then(|| Fix::Update {
            id: schedule.id().to_string(),
            enabled: false,
            minutes: schedule.timeout_minutes().unwrap_or(0),
        }),
        None if wanted => Some(Fix::Create { minutes }),
        None => None,
    }
}

/// Issue the schedule directives each desired Hue light still needs.
///
/// Returns `true` once every light's schedule matches. A bridge whose
/// schedule list has not arrived yet counts as not matching.
pub(super) fn reconcile(
    store: &DesiredStateStore,
    dispatcher: &mut Dispatcher,
    throttle: &mut ThrottleTracker,
    timeouts_enabled: bool,
    now: Instant,
) -> bool {
    let mut matched = true;
    for desired in store.lights().filter(|l| l.id().transport().is_hue()) {
        let id = desired.id();
        let controller = id.controller();
        let Some(schedules) = dispatcher.schedules(controller) else {
            debug!("No schedules from {controller} yet");
            matched = false;
            continue;
        };
        let existing = schedules
            .iter()
            .find(|s| s.light_index() == Some(id.index()));
        let Some(fix) = fix_for(desired, existing, timeouts_enabled) else {
            continue;
        };

        matched = false;
        if !throttle.admit(id, now) {
            continue;
        }
        debug!("Schedule for {id} needs {fix:?}");
        match fix {
            Fix::Update { id: schedule, enabled, minutes } => {
                dispatcher.update_schedule(controller, &schedule, enabled, minutes);
            }
            Fix::Create { minutes } => {
                dispatcher.create_schedule(controller, id.index(), minutes);
            }
        }
    }
    matched
}
