//! Light identity and the state record shared by desired and actual views.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Color, Palette, Routine};

/// Number of slots in a light's custom color array.
pub const CUSTOM_COLOR_CAPACITY: usize = 10;

/// How packets reach a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransportKind {
    Http,
    Udp,
    Serial,
    Hue,
}

impl TransportKind {
    pub fn is_hue(&self) -> bool {
        matches!(self, TransportKind::Hue)
    }
}

/// A controller: an IP address, serial port, or bridge id plus its transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Controller {
    name: String,
    transport: TransportKind,
}

impl Controller {
    pub fn new(name: &str, transport: TransportKind) -> Self {
        Controller {
            name: name.to_string(),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.transport, self.name)
    }
}

/// Identity of one light: its controller and its index on that controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LightId {
    controller: Controller,
    index: u32,
}

impl LightId {
    pub fn new(controller: Controller, index: u32) -> Self {
        LightId { controller, index }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn transport(&self) -> TransportKind {
        self.controller.transport
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.controller, self.index)
    }
}

/// How a light interprets its color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorMode {
    #[default]
    Rgb,
    Hsv,
    /// Color temperature
    Ct,
    Dimmable,
}

/// Desired or actual state of a single light.
///
/// The same record describes what the user wants (held by the
/// [`DesiredStateStore`](crate::DesiredStateStore)) and what the hardware last
/// reported (held by a backend's [`DeviceStateCache`](crate::DeviceStateCache)).
///
/// # Example
///
/// ```
/// use lightsync_rs::{Color, Controller, LightId, LightState, TransportKind};
///
/// let id = LightId::new(Controller::new("192.168.0.20", TransportKind::Udp), 1);
/// let state = LightState::new(id)
///     .with_on(true)
///     .with_color(Color::rgb(255, 0, 0))
///     .with_brightness(140);
/// assert_eq!(state.brightness(), 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LightStateRecord")]
pub struct LightState {
    id: LightId,
    pub(crate) on: bool,
    pub(crate) reachable: bool,
    pub(crate) color: Color,
    pub(crate) color_mode: ColorMode,
    pub(crate) brightness: u8,
    pub(crate) routine: Routine,
    pub(crate) palette: Palette,
    pub(crate) speed: u16,
    pub(crate) timeout: u32,
    pub(crate) custom_count: u8,
    pub(crate) custom_colors: [Color; CUSTOM_COLOR_CAPACITY],
}

/// Wire form of [`LightState`]. Converting clamps the same fields the
/// builder setters do.
#[derive(Deserialize)]
struct LightStateRecord {
    id: LightId,
    on: bool,
    reachable: bool,
    color: Color,
    color_mode: ColorMode,
    brightness: u8,
    routine: Routine,
    palette: Palette,
    speed: u16,
    timeout: u32,
    custom_count: u8,
    custom_colors: [Color; CUSTOM_COLOR_CAPACITY],
}

impl From<LightStateRecord> for LightState {
    fn from(record: LightStateRecord) -> Self {
        let mut state = LightState {
            id: record.id,
            on: record.on,
            reachable: record.reachable,
            color: record.color,
            color_mode: record.color_mode,
            brightness: 0,
            routine: record.routine,
            palette: record.palette,
            speed: record.speed,
            timeout: record.timeout,
            custom_count: 0,
            custom_colors: record.custom_colors,
        };
        state.set_brightness(record.brightness);
        state.set_custom_count(record.custom_count);
        state
    }
}

impl LightState {
    const MAX_BRIGHTNESS: u8 = 100;

    pub fn new(id: LightId) -> Self {
        LightState {
            id,
            on: false,
            reachable: true,
            color: Color::new(),
            color_mode: ColorMode::default(),
            brightness: 0,
            routine: Routine::default(),
            palette: Palette::default(),
            speed: 0,
            timeout: 0,
            custom_count: 0,
            custom_colors: [Color::new(); CUSTOM_COLOR_CAPACITY],
        }
    }

    pub fn id(&self) -> &LightId {
        &self.id
    }

    pub fn on(&self) -> bool {
        self.on
    }

    pub fn reachable(&self) -> bool {
        self.reachable
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn routine(&self) -> Routine {
        self.routine
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn speed(&self) -> u16 {
        self.speed
    }

    /// Idle timeout in minutes; 0 disables it.
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn custom_count(&self) -> u8 {
        self.custom_count
    }

    /// The custom colors currently in use.
    pub fn custom_colors(&self) -> &[Color] {
        &self.custom_colors[..self.custom_count as usize]
    }

    pub fn custom_color(&self, slot: usize) -> Option<Color> {
        self.custom_colors.get(slot).copied()
    }

    pub fn with_on(mut self, on: bool) -> Self {
        self.on = on;
        self
    }

    pub fn with_reachable(mut self, reachable: bool) -> Self {
        self.reachable = reachable;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_color_mode(mut self, mode: ColorMode) -> Self {
        self.color_mode = mode;
        self
    }

    /// Values above 100 are clamped.
    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.set_brightness(brightness);
        self
    }

    pub fn with_routine(mut self, routine: Routine) -> Self {
        self.routine = routine;
        self
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_speed(mut self, speed: u16) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_timeout(mut self, minutes: u32) -> Self {
        self.timeout = minutes;
        self
    }

    /// Replaces the custom color array. Colors past the capacity are dropped
    /// and the in-use count follows the number of colors kept.
    pub fn with_custom_colors(mut self, colors: &[Color]) -> Self {
        let kept = colors.len().min(CUSTOM_COLOR_CAPACITY);
        self.custom_colors[..kept].copy_from_slice(&colors[..kept]);
        self.custom_count = kept as u8;
        self
    }

    pub(crate) fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness.min(Self::MAX_BRIGHTNESS);
    }

    pub(crate) fn set_custom_count(&mut self, count: u8) {
        self.custom_count = count.min(CUSTOM_COLOR_CAPACITY as u8);
    }

    pub(crate) fn set_custom_color(&mut self, slot: usize, color: Color) {
        if let Some(entry) = self.custom_colors.get_mut(slot) {
            *entry = color;
        }
    }
}
