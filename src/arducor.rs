//! ArduCor command packets used by the HTTP, UDP, and serial transports.
//!
//! A packet is plain ASCII: every command is a comma separated list of
//! integers terminated by `&`. The first integer is the [`Header`], the second
//! is the light index on the controller, the rest are the command's
//! parameters.
//!
//! ```
//! use lightsync_rs::{ArduCorPacket, Command};
//!
//! let mut packet = ArduCorPacket::new();
//! packet.push(1, Command::OnOff(true));
//! packet.push(1, Command::Brightness(80));
//! assert_eq!(packet.encode(), "0,1,1&3,1,80&");
//! assert_eq!(ArduCorPacket::decode("0,1,1&3,1,80&").unwrap(), packet);
//! ```

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::errors::Error;
use crate::light::{CUSTOM_COLOR_CAPACITY, LightState};
use crate::types::{Color, Palette, Routine};

type Result<T> = std::result::Result<T, Error>;

/// Leading integer of every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Header {
    OnOff = 0,
    SingleRoutine = 1,
    CustomArrayColor = 2,
    Brightness = 3,
    CustomColorCount = 4,
    IdleTimeout = 5,
    StateUpdateRequest = 6,
    MainColor = 7,
    MultiRoutine = 8,
    Speed = 9,
    StateReport = 10,
}

impl Header {
    pub fn create(value: u32) -> Option<Self> {
        Header::iter().find(|h| h.id() == value)
    }

    pub fn id(&self) -> u32 {
        *self as u32
    }

    /// Number of parameters after the light index.
    fn arity(&self) -> usize {
        match self {
            Header::StateUpdateRequest => 0,
            Header::OnOff
            | Header::SingleRoutine
            | Header::Brightness
            | Header::CustomColorCount
            | Header::IdleTimeout
            | Header::Speed => 1,
            Header::MultiRoutine => 2,
            Header::MainColor => 3,
            Header::CustomArrayColor => 4,
            Header::StateReport => 11,
        }
    }
}

/// Full state of a light as reported by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateReport {
    pub on: bool,
    pub reachable: bool,
    pub color: Color,
    pub routine: Routine,
    pub palette: Palette,
    pub brightness: u8,
    pub speed: u16,
    pub timeout: u32,
    pub custom_count: u8,
}

impl From<&LightState> for StateReport {
    fn from(state: &LightState) -> Self {
        StateReport {
            on: state.on,
            reachable: state.reachable,
            color: state.color,
            routine: state.routine,
            palette: state.palette,
            brightness: state.brightness,
            speed: state.speed,
            timeout: state.timeout,
            custom_count: state.custom_count,
        }
    }
}

/// One field-level instruction for a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    OnOff(bool),
    SingleRoutine(Routine),
    CustomArrayColor { slot: u8, color: Color },
    Brightness(u8),
    CustomColorCount(u8),
    /// Minutes of inactivity before the light turns itself off; 0 disables.
    IdleTimeout(u32),
    StateUpdateRequest,
    MainColor(Color),
    MultiRoutine { routine: Routine, palette: Palette },
    Speed(u16),
    StateReport(StateReport),
}

impl Command {
    pub fn header(&self) -> Header {
        match self {
            Command::OnOff(_) => Header::OnOff,
            Command::SingleRoutine(_) => Header::SingleRoutine,
            Command::CustomArrayColor { .. } => Header::CustomArrayColor,
            Command::Brightness(_) => Header::Brightness,
            Command::CustomColorCount(_) => Header::CustomColorCount,
            Command::IdleTimeout(_) => Header::IdleTimeout,
            Command::StateUpdateRequest => Header::StateUpdateRequest,
            Command::MainColor(_) => Header::MainColor,
            Command::MultiRoutine { .. } => Header::MultiRoutine,
            Command::Speed(_) => Header::Speed,
            Command::StateReport(_) => Header::StateReport,
        }
    }

    fn params(&self) -> Vec<u32> {
        let rgb = |c: &Color| [c.red as u32, c.green as u32, c.blue as u32];
        match self {
            Command::OnOff(on) => vec![*on as u32],
            Command::SingleRoutine(routine) => vec![routine.id() as u32],
            Command::CustomArrayColor { slot, color } => {
                let [r, g, b] = rgb(color);
                vec![*slot as u32, r, g, b]
            }
            Command::Brightness(value) => vec![*value as u32],
            Command::CustomColorCount(count) => vec![*count as u32],
            Command::IdleTimeout(minutes) => vec![*minutes],
            Command::StateUpdateRequest => Vec::new(),
            Command::MainColor(color) => rgb(color).to_vec(),
            Command::MultiRoutine { routine, palette } => {
                vec![routine.id() as u32, palette.id() as u32]
            }
            Command::Speed(speed) => vec![*speed as u32],
            Command::StateReport(report) => {
                let [r, g, b] = rgb(&report.color);
                vec![
                    report.on as u32,
                    report.reachable as u32,
                    r,
                    g,
                    b,
                    report.routine.id() as u32,
                    report.palette.id() as u32,
                    report.brightness as u32,
                    report.speed as u32,
                    report.timeout,
                    report.custom_count as u32,
                ]
            }
        }
    }

    fn from_params(header: Header, p: &[u32], raw: &str) -> Result<Self> {
        let flag = |v: u32| match v {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::malformed(raw, "flag must be 0 or 1")),
        };
        let channel =
            |v: u32| u8::try_from(v).map_err(|_| Error::malformed(raw, "channel above 255"));
        let color = |r: u32, g: u32, b: u32| -> Result<Color> {
            Ok(Color::rgb(channel(r)?, channel(g)?, channel(b)?))
        };
        let brightness = |v: u32| match v {
            0..=100 => Ok(v as u8),
            _ => Err(Error::malformed(raw, "brightness above 100")),
        };
        let count = |v: u32| match v {
            v if v as usize <= CUSTOM_COLOR_CAPACITY => Ok(v as u8),
            _ => Err(Error::malformed(raw, "custom color count above capacity")),
        };
        let routine = |v: u32| {
            u8::try_from(v)
                .ok()
                .and_then(Routine::create)
                .ok_or_else(|| Error::malformed(raw, "unknown routine"))
        };
        let single = |v: u32| match routine(v)? {
            r if r.is_single_color() => Ok(r),
            _ => Err(Error::malformed(raw, "multi color routine under single routine header")),
        };
        let multi = |v: u32| match routine(v)? {
            r if !r.is_single_color() => Ok(r),
            _ => Err(Error::malformed(raw, "single color routine under multi routine header")),
        };
        let palette = |v: u32| {
            u8::try_from(v)
                .ok()
                .and_then(Palette::create)
                .ok_or_else(|| Error::malformed(raw, "unknown palette"))
        };
        let speed = |v: u32| u16::try_from(v).map_err(|_| Error::malformed(raw, "speed too large"));

        let command = match header {
            Header::OnOff => Command::OnOff(flag(p[0])?),
            Header::SingleRoutine => Command::SingleRoutine(single(p[0])?),
            Header::CustomArrayColor => {
                if p[0] as usize >= CUSTOM_COLOR_CAPACITY {
                    return Err(Error::malformed(raw, "custom color slot out of range"));
                }
                Command::CustomArrayColor {
                    slot: p[0] as u8,
                    color: color(p[1], p[2], p[3])?,
                }
            }
            Header::Brightness => Command::Brightness(brightness(p[0])?),
            Header::CustomColorCount => Command::CustomColorCount(count(p[0])?),
            Header::IdleTimeout => Command::IdleTimeout(p[0]),
            Header::StateUpdateRequest => Command::StateUpdateRequest,
            Header::MainColor => Command::MainColor(color(p[0], p[1], p[2])?),
            Header::MultiRoutine => Command::MultiRoutine {
                routine: multi(p[0])?,
                palette: palette(p[1])?,
            },
            Header::Speed => Command::Speed(speed(p[0])?),
            Header::StateReport => Command::StateReport(StateReport {
                on: flag(p[0])?,
                reachable: flag(p[1])?,
                color: color(p[2], p[3], p[4])?,
                routine: routine(p[5])?,
                palette: palette(p[6])?,
                brightness: brightness(p[7])?,
                speed: speed(p[8])?,
                timeout: p[9],
                custom_count: count(p[10])?,
            }),
        };
        Ok(command)
    }
}

/// A command addressed to one light on a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArduCorMessage {
    pub index: u32,
    pub command: Command,
}

impl ArduCorMessage {
    fn encode(&self) -> String {
        let mut out = format!("{},{}", self.command.header().id(), self.index);
        for param in self.command.params() {
            out.push(',');
            out.push_str(&param.to_string());
        }
        out.push('&');
        out
    }
}

/// An ordered batch of commands sent to one controller in a single write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArduCorPacket {
    messages: Vec<ArduCorMessage>,
}

impl ArduCorPacket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: u32, command: Command) {
        self.messages.push(ArduCorMessage { index, command });
    }

    pub fn messages(&self) -> &[ArduCorMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn encode(&self) -> String {
        self.messages.iter().map(ArduCorMessage::encode).collect()
    }

    /// The messages whose encoding stays below `limit` bytes, in order. A
    /// message that would cross the limit is dropped; later, shorter ones
    /// may still fit.
    ///
    /// ```
    /// use lightsync_rs::{ArduCorPacket, Command};
    ///
    /// let mut packet = ArduCorPacket::new();
    /// packet.push(1, Command::OnOff(true));
    /// packet.push(1, Command::IdleTimeout(120));
    /// packet.push(1, Command::Brightness(5));
    /// assert_eq!(packet.fit(14).encode(), "0,1,1&3,1,5&");
    /// ```
    pub fn fit(&self, limit: usize) -> ArduCorPacket {
        let mut kept = ArduCorPacket::new();
        let mut size = 0;
        for message in &self.messages {
            let added = message.encode().len();
            if size + added < limit {
                size += added;
                kept.messages.push(*message);
            }
        }
        kept
    }

    /// Parse a packet. Any malformed command rejects the whole packet.
    pub fn decode(text: &str) -> Result<Self> {
        let mut packet = ArduCorPacket::new();
        for raw in text.split('&').map(str::trim).filter(|s| !s.is_empty()) {
            let ints = raw
                .split(',')
                .map(|field| field.trim().parse::<u32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::malformed(raw, &e.to_string()))?;

            let [header, index, params @ ..] = ints.as_slice() else {
                return Err(Error::malformed(raw, "missing header or index"));
            };
            let header = Header::create(*header).ok_or(Error::UnknownHeader(*header))?;
            if params.len() != header.arity() {
                return Err(Error::malformed(
                    raw,
                    &format!("expected {} parameters, got {}", header.arity(), params.len()),
                ));
            }
            packet.push(*index, Command::from_params(header, params, raw)?);
        }
        Ok(packet)
    }
}

impl LightState {
    /// Fold a command reported by a controller into this state.
    pub fn apply(&mut self, command: &Command) {
        match *command {
            Command::OnOff(on) => self.on = on,
            Command::SingleRoutine(routine) => self.routine = routine,
            Command::CustomArrayColor { slot, color } => self.set_custom_color(slot as usize, color),
            Command::Brightness(value) => self.set_brightness(value),
            Command::CustomColorCount(count) => self.set_custom_count(count),
            Command::IdleTimeout(minutes) => self.timeout = minutes,
            Command::StateUpdateRequest => {}
            Command::MainColor(color) => self.color = color,
            Command::MultiRoutine { routine, palette } => {
                self.routine = routine;
                self.palette = palette;
            }
            Command::Speed(speed) => self.speed = speed,
            Command::StateReport(report) => {
                self.on = report.on;
                self.reachable = report.reachable;
                self.color = report.color;
                self.routine = report.routine;
                self.palette = report.palette;
                self.set_brightness(report.brightness);
                self.speed = report.speed;
                self.timeout = report.timeout;
                self.set_custom_count(report.custom_count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{Controller, LightId, TransportKind};

    #[test]
    fn test_encode_every_header() {
        let mut packet = ArduCorPacket::new();
        packet.push(2, Command::MainColor(Color::rgb(255, 0, 10)));
        packet.push(
            2,
            Command::CustomArrayColor {
                slot: 3,
                color: Color::rgb(1, 2, 3),
            },
        );
        packet.push(
            2,
            Command::MultiRoutine {
                routine: Routine::MultiFade,
                palette: Palette::Fire,
            },
        );
        packet.push(0, Command::StateUpdateRequest);
        assert_eq!(packet.encode(), "7,2,255,0,10&2,2,3,1,2,3&8,2,8,6&6,0&");
    }

    #[test]
    fn test_decode_state_report() {
        let packet = ArduCorPacket::decode("10,1,1,1,255,0,0,0,0,80,100,15,2&").unwrap();
        let Command::StateReport(report) = packet.messages()[0].command else {
            panic!("expected state report");
        };
        assert!(report.on);
        assert_eq!(report.color, Color::rgb(255, 0, 0));
        assert_eq!(report.brightness, 80);
        assert_eq!(report.timeout, 15);
        assert_eq!(report.custom_count, 2);
    }

    #[test]
    fn test_decode_rejects_bad_arity() {
        assert!(matches!(
            ArduCorPacket::decode("3,1&"),
            Err(Error::MalformedPacket { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        assert!(ArduCorPacket::decode("3,1,101&").is_err());
        assert!(ArduCorPacket::decode("2,1,10,0,0,0&").is_err());
        assert!(ArduCorPacket::decode("7,1,256,0,0&").is_err());
        assert!(ArduCorPacket::decode("0,1,2&").is_err());
        assert!(ArduCorPacket::decode("1,1,12&").is_err());
    }

    #[test]
    fn test_decode_checks_routine_class() {
        assert!(ArduCorPacket::decode("1,1,6&").is_ok());
        assert!(ArduCorPacket::decode("1,1,7&").is_err());
        assert!(ArduCorPacket::decode("8,1,7,2&").is_ok());
        assert!(ArduCorPacket::decode("8,1,3,2&").is_err());
    }

    #[test]
    fn test_decode_unknown_header() {
        assert_eq!(
            ArduCorPacket::decode("42,1,1&").unwrap_err(),
            Error::UnknownHeader(42)
        );
    }

    #[test]
    fn test_decode_ignores_empty_segments() {
        let packet = ArduCorPacket::decode(" 0,4,0& &").unwrap();
        assert_eq!(packet.len(), 1);
        assert_eq!(packet.messages()[0].index, 4);
    }

    #[test]
    fn test_apply_commands() {
        let id = LightId::new(Controller::new("10.0.0.9", TransportKind::Udp), 1);
        let mut state = LightState::new(id);
        state.apply(&Command::OnOff(true));
        state.apply(&Command::MultiRoutine {
            routine: Routine::MultiBarsMoving,
            palette: Palette::Snow,
        });
        state.apply(&Command::CustomArrayColor {
            slot: 9,
            color: Color::rgb(9, 9, 9),
        });
        state.apply(&Command::CustomArrayColor {
            slot: 12,
            color: Color::rgb(1, 1, 1),
        });

        assert!(state.on());
        assert_eq!(state.routine(), Routine::MultiBarsMoving);
        assert_eq!(state.palette(), Palette::Snow);
        assert_eq!(state.custom_color(9), Some(Color::rgb(9, 9, 9)));
    }
}
