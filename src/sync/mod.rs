//! The reconciliation engines.
//!
//! A [`SyncEngine`] compares the desired state of every light it owns with the
//! actual state its backend last reported and dispatches the directives that
//! close the gap. Timing is passed in explicitly: the engine never reads the
//! clock, so every transition is a pure function of the `now` it is handed.
//!
//! ```text
//!  idle ──reset_sync──▶ syncing ──converged / 30 s──▶ converged
//!   ▲                                                     │ +500 ms
//!   └──────── all schedules match / 15 s ◀── cleaning-up ◀┘
//! ```

mod cleanup;
mod hue;
mod standard;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::dispatch::Dispatcher;
use crate::light::{Controller, TransportKind};
use crate::store::DesiredStateStore;
use crate::throttle::ThrottleTracker;

use cleanup::CleanupPass;

pub use hue::diff as hue_diff;
pub use standard::diff as standard_diff;

/// Which family of transports an engine reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// HTTP, UDP and serial controllers speaking ArduCor.
    Standard,
    /// Hue bridges.
    Hue,
}

impl EngineKind {
    pub fn owns(&self, transport: TransportKind) -> bool {
        match self {
            EngineKind::Standard => !transport.is_hue(),
            EngineKind::Hue => transport.is_hue(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Converged,
    CleaningUp,
}

/// A bounded run of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSession {
    id: Uuid,
    started: Instant,
    interval: Duration,
}

impl SyncSession {
    fn new(started: Instant, interval: Duration) -> Self {
        SyncSession {
            id: Uuid::new_v4(),
            started,
            interval,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Current poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }
}

/// One reconciliation engine.
#[derive(Debug)]
pub struct SyncEngine {
    kind: EngineKind,
    config: SyncConfig,
    status: SyncStatus,
    session: Option<SyncSession>,
    next_tick: Option<Instant>,
    throttle: ThrottleTracker,
    cleanup: Option<CleanupPass>,
    /// Index of the light last sent to, per controller.
    cursors: HashMap<Controller, u32>,
}

impl SyncEngine {
    pub fn new(kind: EngineKind, config: &SyncConfig) -> Self {
        let overrides = config
            .throttle_ms
            .iter()
            .map(|(transport, ms)| (*transport, Duration::from_millis(*ms)))
            .collect();
        SyncEngine {
            kind,
            config: config.clone(),
            status: SyncStatus::Idle,
            session: None,
            next_tick: None,
            throttle: ThrottleTracker::with_overrides(overrides),
            cleanup: None,
            cursors: HashMap::new(),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn session(&self) -> Option<&SyncSession> {
        self.session.as_ref()
    }

    /// Anything but an active sync counts as in sync.
    pub fn is_in_sync(&self) -> bool {
        self.status != SyncStatus::Syncing
    }

    pub fn throttle(&self) -> &ThrottleTracker {
        &self.throttle
    }

    fn base_interval(&self) -> Duration {
        match self.kind {
            EngineKind::Standard => self.config.standard_interval(),
            EngineKind::Hue => self.config.hue_interval(),
        }
    }

    /// Whether the store holds any light this engine reconciles.
    pub fn has_lights(&self, store: &DesiredStateStore) -> bool {
        store.lights().any(|l| self.kind.owns(l.id().transport()))
    }

    /// Start or continue syncing after a desired-state change.
    ///
    /// Cancels a pending cleanup pass. A running session keeps its start time
    /// so repeated changes cannot postpone the fail-safe forever.
    pub fn reset_sync(&mut self, has_lights: bool, now: Instant) {
        if self.cleanup.take().is_some() {
            debug!("{:?} cleanup cancelled", self.kind);
            self.status = SyncStatus::Idle;
        }
        if !has_lights {
            return;
        }

        self.status = SyncStatus::Syncing;
        if self.next_tick.is_none() {
            let session = SyncSession::new(now, self.base_interval());
            info!("{:?} sync session {} started", self.kind, session.id);
            self.next_tick = Some(now + session.interval);
            self.session = Some(session);
        }
    }

    /// A backend delivered a packet. Only an engine still syncing reacts, so
    /// routine poll replies do not disturb a converged engine.
    pub fn packet_received(&mut self, has_lights: bool, now: Instant) {
        if self.status == SyncStatus::Syncing {
            self.reset_sync(has_lights, now);
        }
    }

    /// Force convergence. Safe to call in any state.
    pub fn cancel_sync(&mut self, now: Instant) {
        if self.next_tick.is_some() {
            self.end_of_sync(now);
        }
    }

    /// Earliest instant at which [`SyncEngine::on_timer`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let cleanup = self.cleanup.as_ref().map(|c| c.next_run);
        match (self.next_tick, cleanup) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run whatever is due at `now`: a sync tick, a cleanup tick, or both.
    pub fn on_timer(&mut self, store: &DesiredStateStore, dispatcher: &mut Dispatcher, now: Instant) {
        if self.next_tick.is_some_and(|t| t <= now) {
            self.tick(store, dispatcher, now);
        }
        if self.cleanup.as_ref().is_some_and(|c| c.next_run <= now) {
            self.cleanup_tick(store, dispatcher, now);
        }
    }

    fn tick(&mut self, store: &DesiredStateStore, dispatcher: &mut Dispatcher, now: Instant) {
        let Some(mut session) = self.session else {
            self.next_tick = None;
            return;
        };

        let out_of_sync = match self.kind {
            EngineKind::Standard => {
                standard::sync_lights(store, dispatcher, &mut self.throttle, &self.config, now)
            }
            EngineKind::Hue => hue::sync_lights(
                store,
                dispatcher,
                &mut self.throttle,
                &mut self.cursors,
                self.config.timeouts_enabled,
                now,
            ),
        };

        let elapsed = session.elapsed(now);
        let mut converged = out_of_sync == 0;
        if elapsed >= self.config.give_up_after() {
            if !converged {
                warn!(
                    "{:?} sync session {} gave up with {out_of_sync} lights out of sync",
                    self.kind, session.id
                );
            }
            converged = true;
        } else if elapsed >= self.config.slow_after() && session.interval != self.config.slow_interval() {
            debug!("{:?} sync session {} slowing down", self.kind, session.id);
            session.interval = self.config.slow_interval();
        }

        if converged || !self.has_lights(store) {
            self.end_of_sync(now);
        } else {
            self.next_tick = Some(now + session.interval);
            self.session = Some(session);
        }
    }

    fn end_of_sync(&mut self, now: Instant) {
        if let Some(session) = self.session.take() {
            info!(
                "{:?} sync session {} ended after {:?}",
                self.kind,
                session.id,
                session.elapsed(now)
            );
        }
        self.next_tick = None;
        self.status = SyncStatus::Converged;
        if self.cleanup.is_none() {
            self.cleanup = Some(CleanupPass::new(now, self.config.cleanup_delay()));
        }
    }

    fn cleanup_tick(&mut self, store: &DesiredStateStore, dispatcher: &mut Dispatcher, now: Instant) {
        let Some(mut pass) = self.cleanup.take() else {
            return;
        };
        self.status = SyncStatus::CleaningUp;

        let matched = match self.kind {
            EngineKind::Standard => true,
            EngineKind::Hue => cleanup::reconcile(
                store,
                dispatcher,
                &mut self.throttle,
                self.config.timeouts_enabled,
                now,
            ),
        };

        if matched || pass.elapsed(now) >= self.config.cleanup_budget() {
            if !matched {
                warn!("{:?} cleanup gave up with schedules out of sync", self.kind);
            }
            self.status = SyncStatus::Idle;
        } else {
            pass.next_run = now + self.base_interval();
            self.cleanup = Some(pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Packet;
    use crate::backend::fake::{RecordingBackend, ScheduleCall};
    use crate::hue::HueSchedule;
    use crate::light::{ColorMode, LightId, LightState};
    use crate::types::Color;

    fn udp_light() -> LightState {
        LightState::new(LightId::new(Controller::new("10.0.0.9", TransportKind::Udp), 1))
    }

    fn engine_with(
        kind: EngineKind,
        desired: LightState,
        actual: Option<LightState>,
    ) -> (SyncEngine, DesiredStateStore, Dispatcher, RecordingBackend) {
        let transport = desired.id().transport();
        let backend = RecordingBackend::new(transport);
        if let Some(actual) = actual {
            backend.cache.lock().unwrap().insert(actual);
        }
        let mut store = DesiredStateStore::new();
        store.upsert(desired);
        let engine = SyncEngine::new(kind, &SyncConfig::default());
        (engine, store, Dispatcher::new(), backend)
    }

    fn arducor(packet: &Packet) -> String {
        match packet {
            Packet::ArduCor(packet) => packet.encode(),
            Packet::Hue { .. } => panic!("expected an ArduCor packet"),
        }
    }

    #[test]
    fn test_turn_on_then_remaining_fields() {
        let desired = udp_light()
            .with_on(true)
            .with_color(Color::rgb(255, 0, 0))
            .with_brightness(80);
        let (mut engine, store, mut dispatcher, backend) =
            engine_with(EngineKind::Standard, desired, Some(udp_light()));
        let sent = backend.sent.clone();
        let cache = backend.cache.clone();
        dispatcher.register(backend);

        let t0 = Instant::now();
        engine.reset_sync(true, t0);
        assert_eq!(engine.status(), SyncStatus::Syncing);
        assert!(!engine.is_in_sync());

        engine.on_timer(&store, &mut dispatcher, t0 + Duration::from_millis(33));
        assert!(arducor(&sent.lock().unwrap()[0].1).starts_with("0,1,1&"));

        // the controller only applied the power change
        let id = udp_light().id().clone();
        cache.lock().unwrap().update(&id, |l| l.on = true);

        engine.on_timer(&store, &mut dispatcher, t0 + Duration::from_millis(500));
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(arducor(&sent[1].1), "7,1,255,0,0&3,1,80&");
    }

    #[test]
    fn test_throttle_holds_back_resend() {
        let desired = udp_light().with_on(true);
        let (mut engine, store, mut dispatcher, backend) =
            engine_with(EngineKind::Standard, desired, Some(udp_light()));
        let sent = backend.sent.clone();
        dispatcher.register(backend);

        let t0 = Instant::now();
        engine.reset_sync(true, t0);
        for step in 1..=10 {
            engine.on_timer(&store, &mut dispatcher, t0 + Duration::from_millis(33 * step));
        }
        // 330 ms is inside the 400 ms UDP window
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_converged_session_schedules_cleanup() {
        let state = udp_light().with_on(true).with_brightness(30);
        let (mut engine, store, mut dispatcher, backend) =
            engine_with(EngineKind::Standard, state.clone(), Some(state));
        dispatcher.register(backend);

        let t0 = Instant::now();
        engine.reset_sync(true, t0);
        let t1 = t0 + Duration::from_millis(33);
        engine.on_timer(&store, &mut dispatcher, t1);
        assert_eq!(engine.status(), SyncStatus::Converged);
        assert!(engine.session().is_none());
        assert_eq!(engine.next_deadline(), Some(t1 + Duration::from_millis(500)));

        engine.on_timer(&store, &mut dispatcher, t1 + Duration::from_millis(500));
        assert_eq!(engine.status(), SyncStatus::Idle);
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn test_unresolved_light_hits_fail_safe() {
        let (mut engine, store, mut dispatcher, backend) =
            engine_with(EngineKind::Standard, udp_light().with_on(true), None);
        dispatcher.register(backend);

        let t0 = Instant::now();
        engine.reset_sync(true, t0);
        let mut now = t0;
        while engine.status() == SyncStatus::Syncing {
            now = engine.next_deadline().unwrap();
            engine.on_timer(&store, &mut dispatcher, now);

            let interval = engine.session().map(|s| s.interval());
            if now - t0 < Duration::from_secs(15) {
                assert_eq!(interval, Some(Duration::from_millis(33)));
            } else if now - t0 < Duration::from_secs(30) {
                assert_eq!(interval, Some(Duration::from_millis(2000)));
            }
        }
        assert!(now - t0 >= Duration::from_secs(30));
        assert!(now - t0 < Duration::from_secs(32));
        assert_eq!(engine.status(), SyncStatus::Converged);
    }

    #[test]
    fn test_reset_keeps_running_session() {
        let (mut engine, _store, _dispatcher, _backend) =
            engine_with(EngineKind::Standard, udp_light(), None);
        let t0 = Instant::now();
        engine.reset_sync(true, t0);
        let first = *engine.session().unwrap();

        engine.reset_sync(true, t0 + Duration::from_secs(5));
        assert_eq!(engine.session().unwrap().started(), first.started());
        assert_eq!(engine.session().unwrap().id(), first.id());
    }

    #[test]
    fn test_reset_without_lights_stays_idle() {
        let mut engine = SyncEngine::new(EngineKind::Hue, &SyncConfig::default());
        engine.reset_sync(false, Instant::now());
        assert_eq!(engine.status(), SyncStatus::Idle);
        assert_eq!(engine.next_deadline(), None);
    }

    #[test]
    fn test_cancel_forces_convergence() {
        let (mut engine, _store, _dispatcher, _backend) =
            engine_with(EngineKind::Standard, udp_light(), None);
        let t0 = Instant::now();

        // nothing running: a no-op
        engine.cancel_sync(t0);
        assert_eq!(engine.status(), SyncStatus::Idle);

        engine.reset_sync(true, t0);
        engine.cancel_sync(t0 + Duration::from_millis(10));
        assert_eq!(engine.status(), SyncStatus::Converged);
        assert!(engine.is_in_sync());
        assert_eq!(
            engine.next_deadline(),
            Some(t0 + Duration::from_millis(510))
        );
    }

    #[test]
    fn test_packet_received_ignored_once_converged() {
        let (mut engine, _store, _dispatcher, _backend) =
            engine_with(EngineKind::Standard, udp_light(), None);
        let t0 = Instant::now();
        engine.reset_sync(true, t0);
        engine.cancel_sync(t0);

        engine.packet_received(true, t0 + Duration::from_millis(100));
        assert_eq!(engine.status(), SyncStatus::Converged);

        // a real change still cancels cleanup and restarts syncing
        engine.reset_sync(true, t0 + Duration::from_millis(200));
        assert_eq!(engine.status(), SyncStatus::Syncing);
    }

    #[test]
    fn test_cleanup_enables_disabled_timeout_schedule() {
        let bridge = Controller::new("C1", TransportKind::Hue);
        let state = LightState::new(LightId::new(bridge.clone(), 7))
            .with_on(true)
            .with_color(Color::rgb(255, 255, 255))
            .with_color_mode(ColorMode::Hsv)
            .with_brightness(100)
            .with_timeout(30);
        let (mut engine, store, mut dispatcher, backend) =
            engine_with(EngineKind::Hue, state.clone(), Some(state));
        backend.schedules.lock().unwrap().insert(
            bridge.clone(),
            vec![HueSchedule::new("5", "Corluma_timeout_7", false, Some("PT00:29:45"))],
        );
        let schedules = backend.schedules.clone();
        let calls = backend.schedule_calls.clone();
        let sent = backend.sent.clone();
        dispatcher.register(backend);

        let t0 = Instant::now();
        engine.reset_sync(true, t0);
        let t1 = t0 + Duration::from_millis(100);
        engine.on_timer(&store, &mut dispatcher, t1);
        assert_eq!(engine.status(), SyncStatus::Converged);
        assert!(sent.lock().unwrap().is_empty());

        let t2 = t1 + Duration::from_millis(500);
        engine.on_timer(&store, &mut dispatcher, t2);
        assert_eq!(engine.status(), SyncStatus::CleaningUp);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![ScheduleCall::Update {
                id: "5".into(),
                enabled: true,
                minutes: 30
            }]
        );

        // the bridge now reports the schedule enabled
        schedules.lock().unwrap().insert(
            bridge,
            vec![HueSchedule::new("5", "Corluma_timeout_7", true, Some("PT00:29:45"))],
        );
        engine.on_timer(&store, &mut dispatcher, t2 + Duration::from_millis(100));
        assert_eq!(engine.status(), SyncStatus::Idle);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}
