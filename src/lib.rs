//! # lightsync_rs
//!
//! A state-reconciliation engine for heterogeneous smart lights.
//!
//! The application declares what every light should look like in a
//! [`DesiredStateStore`]. Transport backends keep a [`DeviceStateCache`] of
//! what the hardware last reported. Two [`SyncEngine`]s, one for ArduCor
//! controllers (HTTP, UDP, serial) and one for Hue bridges, diff the two views
//! on a timer and dispatch throttled directives until they agree, giving up
//! after a bounded time so unreachable hardware cannot keep a session alive.
//!
//! [`UdpBackend`] owns its socket. [`HttpBackend`], [`SerialBackend`] and
//! [`HueBridgeBackend`] queue requests for I/O the application performs and
//! take the replies back through [`SyncHandle::report`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use lightsync_rs::{Color, LightId, LightState, SyncConfig, SyncService, UdpBackend};
//!
//! async fn sync() -> Result<(), lightsync_rs::Error> {
//!     let config = SyncConfig::default();
//!     let mut service = SyncService::new(config.clone())?;
//!     let udp = UdpBackend::bind("0.0.0.0:10008", service.handle(), config.watchdog()).await?;
//!     service.dispatcher_mut().register(udp);
//!
//!     let handle = service.handle();
//!     let id = LightId::new(lightsync_rs::Controller::new("192.168.1.40", lightsync_rs::TransportKind::Udp), 1);
//!     handle.upsert(LightState::new(id).with_on(true).with_color(Color::rgb(255, 0, 0)))?;
//!
//!     service.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Sync policy
//!
//! - Sessions poll every 33 ms (100 ms for Hue), slow to 2 s after 15 s and
//!   are forced to converge after 30 s.
//! - Each light is throttled per transport: serial 50 ms, HTTP 2 s, UDP and
//!   Hue 400 ms.
//! - A Hue bridge receives at most one light request per tick.
//! - After convergence a cleanup pass keeps the bridge's
//!   `Corluma_timeout_<index>` schedules aligned with each light's idle
//!   timeout.
//!
//! All timings live in [`SyncConfig`].
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! lightsync-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! lightsync-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! lightsync-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```

mod arducor;
mod backend;
mod cache;
mod config;
mod dispatch;
mod errors;
mod history;
mod hue;
mod light;
pub mod runtime;
mod service;
mod store;
pub mod sync;
mod throttle;
mod types;
mod watchdog;

// Re-export public API
pub use arducor::{ArduCorMessage, ArduCorPacket, Command, Header, StateReport};
pub use backend::{
    ArduinoRequest, BackendReport, Datagram, HttpBackend, HttpMethod, HueBridgeBackend,
    HueRequest, Packet, SERIAL_DELIMITER, SerialBackend, SerialWrite, TransportBackend, UDP_PORT,
    UdpBackend,
};
pub use cache::DeviceStateCache;
pub use config::SyncConfig;
pub use dispatch::Dispatcher;
pub use errors::Error;
pub use history::{HistoryEntry, HistorySummary, PacketHistory, PacketOutcome};
pub use hue::{
    HueSchedule, HueStateRequest, TIMEOUT_SCHEDULE_PREFIX, bri_to_brightness, brightness_to_bri,
    format_timeout, parse_lights, parse_schedules, parse_timeout, timeout_schedule_name,
};
pub use light::{CUSTOM_COLOR_CAPACITY, ColorMode, Controller, LightId, LightState, TransportKind};
pub use service::{StatusListener, SyncEvent, SyncHandle, SyncService};
pub use store::{ChangeListener, DesiredStateStore};
pub use sync::{EngineKind, SyncEngine, SyncSession, SyncStatus};
pub use throttle::{ThrottleTracker, default_interval};
pub use types::{Color, Palette, Routine};
pub use watchdog::StateUpdateWatchdog;
