//! The single task that owns all reconciliation state.
//!
//! Everything that mutates the store, the engines, or a backend's cache runs
//! on [`SyncService::run`]. Other tasks talk to it through a [`SyncHandle`].

use std::time::Instant;

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::{FutureExt, StreamExt, future, pin_mut, select};
use log::{debug, info};

use crate::backend::BackendReport;
use crate::config::SyncConfig;
use crate::dispatch::Dispatcher;
use crate::errors::Error;
use crate::light::{LightId, LightState, TransportKind};
use crate::runtime;
use crate::store::DesiredStateStore;
use crate::sync::{EngineKind, SyncEngine};

type Result<T> = std::result::Result<T, Error>;

/// Callback told when an engine flips between in sync and not in sync.
pub type StatusListener = Box<dyn Fn(EngineKind, bool) + Send + 'static>;

/// Input to the sync service.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Set the desired state of a light.
    Upsert(LightState),
    /// Stop managing a light.
    Remove(LightId),
    /// A backend's I/O task received something.
    Received {
        transport: TransportKind,
        report: BackendReport,
    },
    /// Force both engines to converge.
    Cancel,
    /// Cancel, then stop the service loop.
    Shutdown,
}

/// Cloneable sender for [`SyncEvent`]s.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    events: UnboundedSender<SyncEvent>,
}

impl SyncHandle {
    pub fn send(&self, event: SyncEvent) -> Result<()> {
        self.events
            .unbounded_send(event)
            .map_err(|_| Error::ChannelClosed)
    }

    pub fn upsert(&self, state: LightState) -> Result<()> {
        self.send(SyncEvent::Upsert(state))
    }

    pub fn remove(&self, id: LightId) -> Result<()> {
        self.send(SyncEvent::Remove(id))
    }

    pub fn report(&self, transport: TransportKind, report: BackendReport) -> Result<()> {
        self.send(SyncEvent::Received { transport, report })
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(SyncEvent::Cancel)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(SyncEvent::Shutdown)
    }
}

/// Owns the desired store, the backends, and both engines.
///
/// # Example
///
/// ```no_run
/// use lightsync_rs::{SyncConfig, SyncService, UdpBackend};
///
/// # async fn example() -> Result<(), lightsync_rs::Error> {
/// let config = SyncConfig::default();
/// let mut service = SyncService::new(config.clone())?;
/// let udp = UdpBackend::bind("0.0.0.0:10008", service.handle(), config.watchdog()).await?;
/// service.dispatcher_mut().register(udp);
/// service.on_status(|engine, in_sync| println!("{engine:?} in sync: {in_sync}"));
/// service.run().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncService {
    store: DesiredStateStore,
    dispatcher: Dispatcher,
    standard: SyncEngine,
    hue: SyncEngine,
    config: SyncConfig,
    events: UnboundedReceiver<SyncEvent>,
    handle: SyncHandle,
    next_poll: Option<Instant>,
    listener: Option<StatusListener>,
    published: [bool; 2],
}

impl SyncService {
    /// Fails with [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let (sender, events) = unbounded();
        Ok(SyncService {
            store: DesiredStateStore::new(),
            dispatcher: Dispatcher::new(),
            standard: SyncEngine::new(EngineKind::Standard, &config),
            hue: SyncEngine::new(EngineKind::Hue, &config),
            config,
            events,
            handle: SyncHandle { events: sender },
            next_poll: None,
            listener: None,
            published: [true, true],
        })
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    pub fn store(&self) -> &DesiredStateStore {
        &self.store
    }

    /// Register change listeners on the desired store.
    pub fn store_mut(&mut self) -> &mut DesiredStateStore {
        &mut self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn engine(&self, kind: EngineKind) -> &SyncEngine {
        match kind {
            EngineKind::Standard => &self.standard,
            EngineKind::Hue => &self.hue,
        }
    }

    /// Subscribe to in-sync flips. Replaces any previous listener.
    pub fn on_status<F: Fn(EngineKind, bool) + Send + 'static>(&mut self, listener: F) {
        self.listener = Some(Box::new(listener));
    }

    /// Apply one event. Returns `false` once the service should stop.
    pub fn handle_event(&mut self, event: SyncEvent, now: Instant) -> bool {
        let running = match event {
            SyncEvent::Upsert(state) => {
                let transport = state.id().transport();
                if self.store.upsert(state) {
                    self.reset_owner(transport, now);
                }
                true
            }
            SyncEvent::Remove(id) => {
                if self.store.remove(&id) {
                    self.reset_owner(id.transport(), now);
                }
                true
            }
            SyncEvent::Received { transport, report } => {
                if self.dispatcher.ingest(transport, report, now) {
                    let engine = self.engine_for(transport);
                    let has_lights = engine.has_lights(&self.store);
                    self.engine_for_mut(transport).packet_received(has_lights, now);
                }
                true
            }
            SyncEvent::Cancel => {
                self.cancel(now);
                true
            }
            SyncEvent::Shutdown => {
                info!("Sync service shutting down");
                self.cancel(now);
                false
            }
        };
        self.publish_status();
        running
    }

    /// Run every timer that is due at `now`.
    pub fn on_timer(&mut self, now: Instant) {
        self.standard.on_timer(&self.store, &mut self.dispatcher, now);
        self.hue.on_timer(&self.store, &mut self.dispatcher, now);

        match self.next_poll {
            Some(due) if due > now => {}
            _ => {
                self.dispatcher.poll_states(now);
                self.next_poll = Some(now + self.config.state_poll_interval());
            }
        }
        self.publish_status();
    }

    /// Earliest instant at which [`SyncService::on_timer`] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.standard.next_deadline(),
            self.hue.next_deadline(),
            self.next_poll,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Drive the service until a shutdown event arrives.
    pub async fn run(mut self) {
        info!("Sync service started");
        loop {
            self.on_timer(Instant::now());

            let wait = self
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()));
            let timer = async {
                match wait {
                    Some(duration) => runtime::sleep(duration).await,
                    None => future::pending::<()>().await,
                }
            }
            .fuse();
            pin_mut!(timer);

            let event = select! {
                event = self.events.next() => Some(event),
                () = timer => None,
            };
            let Some(event) = event else {
                continue;
            };
            match event {
                Some(event) => {
                    if !self.handle_event(event, Instant::now()) {
                        break;
                    }
                }
                None => break,
            }
        }
        info!("Sync service stopped");
    }

    fn cancel(&mut self, now: Instant) {
        self.standard.cancel_sync(now);
        self.hue.cancel_sync(now);
    }

    fn engine_for(&self, transport: TransportKind) -> &SyncEngine {
        if transport.is_hue() { &self.hue } else { &self.standard }
    }

    fn engine_for_mut(&mut self, transport: TransportKind) -> &mut SyncEngine {
        if transport.is_hue() {
            &mut self.hue
        } else {
            &mut self.standard
        }
    }

    fn reset_owner(&mut self, transport: TransportKind, now: Instant) {
        let has_lights = self.engine_for(transport).has_lights(&self.store);
        self.engine_for_mut(transport).reset_sync(has_lights, now);
    }

    fn publish_status(&mut self) {
        for (slot, engine) in [&self.standard, &self.hue].into_iter().enumerate() {
            let in_sync = engine.is_in_sync();
            if self.published[slot] != in_sync {
                self.published[slot] = in_sync;
                debug!("{:?} in sync: {in_sync}", engine.kind());
                if let Some(listener) = &self.listener {
                    listener(engine.kind(), in_sync);
                }
            }
        }
    }
}
