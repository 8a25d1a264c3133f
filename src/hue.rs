//! Hue bridge JSON: light state requests, `/lights` replies, and schedules.

use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::Error;
use crate::light::{ColorMode, Controller, LightId, LightState};
use crate::types::Color;

type Result<T> = std::result::Result<T, Error>;

/// Prefix of the schedules this crate keeps on a bridge, one per light.
pub const TIMEOUT_SCHEDULE_PREFIX: &str = "Corluma_timeout_";

/// Seconds past the minute at which idle-timeout schedules fire.
const TIMEOUT_SECONDS: u32 = 45;

/// Name of the idle-timeout schedule for a light index.
///
/// ```
/// assert_eq!(lightsync_rs::timeout_schedule_name(7), "Corluma_timeout_7");
/// ```
pub fn timeout_schedule_name(index: u32) -> String {
    format!("{TIMEOUT_SCHEDULE_PREFIX}{index}")
}

/// Render an idle timeout in the bridge's timer format.
///
/// ```
/// use lightsync_rs::{format_timeout, parse_timeout};
///
/// assert_eq!(format_timeout(30), "PT00:29:45");
/// assert_eq!(format_timeout(125), "PT02:04:45");
/// assert_eq!(parse_timeout("PT00:29:45"), Some(30));
/// ```
pub fn format_timeout(minutes: u32) -> String {
    let (hours, minutes) = if minutes > 1 {
        let total = minutes - 1;
        (total / 60, total % 60)
    } else {
        (0, 0)
    };
    format!("PT{hours:02}:{minutes:02}:{TIMEOUT_SECONDS:02}")
}

/// Recover the idle timeout in minutes from a bridge timer string.
pub fn parse_timeout(localtime: &str) -> Option<u32> {
    let start = localtime.find("PT")? + 2;
    let mut fields = localtime[start..].splitn(3, ':');
    let hours: u32 = fields.next()?.parse().ok()?;
    let minutes: u32 = fields.next()?.parse().ok()?;
    let seconds: u32 = fields.next()?.get(..2)?.parse().ok()?;
    hours
        .checked_mul(60)?
        .checked_add(minutes)?
        .checked_add(u32::from(seconds > 0))
}

/// Convert a 0-100 brightness to the bridge's 0-254 scale.
pub fn brightness_to_bri(brightness: u8) -> u8 {
    (brightness.min(100) as f32 * 2.54).round() as u8
}

/// Convert the bridge's 0-254 brightness to 0-100.
pub fn bri_to_brightness(bri: u8) -> u8 {
    (bri.min(254) as f32 / 2.54).round() as u8
}

/// Body of a `PUT /lights/<index>/state` request.
///
/// Directives for one light merge into a single request:
///
/// ```
/// use lightsync_rs::HueStateRequest;
///
/// let mut request = HueStateRequest::new();
/// request.on(true);
/// request.brightness(50);
/// assert_eq!(
///     serde_json::to_string(&request).unwrap(),
///     r#"{"on":true,"bri":127}"#
/// );
/// ```
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HueStateRequest {
    pub(crate) on: Option<bool>,
    pub(crate) hue: Option<u16>,
    pub(crate) sat: Option<u8>,
    pub(crate) bri: Option<u8>,
    pub(crate) ct: Option<u16>,
    pub(crate) colormode: Option<String>,
}

impl HueStateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn on(&mut self, on: bool) {
        self.on = Some(on);
    }

    /// Set hue and saturation from an RGB color, with brightness given
    /// separately on the 0-100 scale.
    pub fn color(&mut self, color: &Color, brightness: u8) {
        let (hue, saturation, _) = color.to_hsv();
        self.hue = Some((hue / 360.0 * 65535.0).round() as u16);
        self.sat = Some((saturation * 254.0).round() as u8);
        self.bri = Some(brightness_to_bri(brightness));
        self.colormode = Some("hs".into());
    }

    /// Set the color temperature in mireds, clamped to the Hue range.
    pub fn color_temperature(&mut self, mireds: u16, brightness: u8) {
        self.ct = Some(mireds.clamp(Color::MIREDS_MIN, Color::MIREDS_MAX));
        self.bri = Some(brightness_to_bri(brightness));
        self.colormode = Some("ct".into());
    }

    pub fn brightness(&mut self, brightness: u8) {
        self.bri = Some(brightness_to_bri(brightness));
    }

    /// Copy every key set in `other` into this request.
    pub fn merge(&mut self, other: &HueStateRequest) {
        if other.on.is_some() {
            self.on = other.on;
        }
        if other.hue.is_some() {
            self.hue = other.hue;
        }
        if other.sat.is_some() {
            self.sat = other.sat;
        }
        if other.bri.is_some() {
            self.bri = other.bri;
        }
        if other.ct.is_some() {
            self.ct = other.ct;
        }
        if other.colormode.is_some() {
            self.colormode.clone_from(&other.colormode);
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeLight {
    state: BridgeLightState,
}

#[derive(Debug, Deserialize)]
struct BridgeLightState {
    on: bool,
    #[serde(default)]
    bri: Option<u8>,
    #[serde(default)]
    hue: Option<u16>,
    #[serde(default)]
    sat: Option<u8>,
    #[serde(default)]
    ct: Option<u16>,
    #[serde(default)]
    colormode: Option<String>,
    reachable: bool,
}

impl BridgeLightState {
    fn into_light_state(self, id: LightId) -> Option<LightState> {
        let brightness = bri_to_brightness(self.bri.unwrap_or(0));
        let (mode, color) = match self.colormode.as_deref() {
            Some("hs") | Some("xy") => {
                let hue = self.hue? as f32 / 65535.0 * 360.0;
                let sat = self.sat? as f32 / 254.0;
                (ColorMode::Hsv, Color::from_hsv(hue, sat, 1.0))
            }
            Some("ct") => (ColorMode::Ct, Color::from_mireds(self.ct?)),
            Some(_) => return None,
            None => (ColorMode::Dimmable, Color::rgb(255, 255, 255)),
        };

        Some(
            LightState::new(id)
                .with_on(self.on)
                .with_reachable(self.reachable)
                .with_color_mode(mode)
                .with_color(color)
                .with_brightness(brightness),
        )
    }
}

/// Parse a bridge's `GET /lights` reply into actual light states.
///
/// Entries that do not look like a light are logged and skipped; only a
/// body that is not a JSON object fails as a whole.
pub fn parse_lights(bridge: &Controller, body: &str) -> Result<Vec<LightState>> {
    let entries: HashMap<String, Value> = serde_json::from_str(body).map_err(Error::JsonLoad)?;

    let mut lights = Vec::new();
    for (key, entry) in entries {
        let Ok(index) = key.parse::<u32>() else {
            warn!("Ignoring bridge light with non-numeric id {key:?}");
            continue;
        };
        let light = match serde_json::from_value::<BridgeLight>(entry) {
            Ok(light) => light,
            Err(e) => {
                warn!("Discarding malformed light {index} from bridge {bridge}: {e}");
                continue;
            }
        };
        let id = LightId::new(bridge.clone(), index);
        match light.state.into_light_state(id) {
            Some(state) => lights.push(state),
            None => warn!("Discarding light {index} from bridge {bridge}: incomplete color state"),
        }
    }
    lights.sort_by_key(|l| l.id().index());
    Ok(lights)
}

/// A schedule stored on a Hue bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HueSchedule {
    #[serde(skip)]
    id: String,
    name: String,
    status: String,
    #[serde(default)]
    localtime: Option<String>,
}

impl HueSchedule {
    pub fn new(id: &str, name: &str, enabled: bool, localtime: Option<&str>) -> Self {
        HueSchedule {
            id: id.to_string(),
            name: name.to_string(),
            status: if enabled { "enabled" } else { "disabled" }.to_string(),
            localtime: localtime.map(String::from),
        }
    }

    /// Bridge-assigned schedule id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.status == "enabled"
    }

    /// Light index if this is one of our idle-timeout schedules.
    pub fn light_index(&self) -> Option<u32> {
        self.name.strip_prefix(TIMEOUT_SCHEDULE_PREFIX)?.parse().ok()
    }

    /// Configured timeout in minutes, when the timer string is readable.
    pub fn timeout_minutes(&self) -> Option<u32> {
        parse_timeout(self.localtime.as_deref()?)
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.status = if enabled { "enabled" } else { "disabled" }.to_string();
    }

    pub(crate) fn set_timeout(&mut self, minutes: u32) {
        self.localtime = Some(format_timeout(minutes));
    }
}

/// Parse a bridge's `GET /schedules` reply. Malformed entries are skipped.
pub fn parse_schedules(body: &str) -> Result<Vec<HueSchedule>> {
    let entries: HashMap<String, Value> = serde_json::from_str(body).map_err(Error::JsonLoad)?;

    let mut schedules = Vec::new();
    for (id, entry) in entries {
        match serde_json::from_value::<HueSchedule>(entry) {
            Ok(mut schedule) => {
                schedule.id = id;
                schedules.push(schedule);
            }
            Err(e) => warn!("Discarding malformed schedule {id}: {e}"),
        }
    }
    schedules.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(schedules)
}

/// Body enabling or disabling an idle-timeout schedule.
pub fn schedule_update_body(enabled: bool, minutes: u32) -> Value {
    json!({
        "localtime": format_timeout(minutes),
        "status": if enabled { "enabled" } else { "disabled" },
    })
}

/// Body creating the idle-timeout schedule for a light.
pub fn schedule_create_body(username: &str, index: u32, minutes: u32) -> Value {
    json!({
        "name": timeout_schedule_name(index),
        "description": "idle timeout",
        "command": {
            "address": format!("/api/{username}/lights/{index}/state"),
            "method": "PUT",
            "body": { "on": false },
        },
        "localtime": format_timeout(minutes),
        "status": "enabled",
        "autodelete": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::TransportKind;

    fn bridge() -> Controller {
        Controller::new("001788fffe123456", TransportKind::Hue)
    }

    #[test]
    fn test_timeout_format_edges() {
        assert_eq!(format_timeout(0), "PT00:00:45");
        assert_eq!(format_timeout(1), "PT00:00:45");
        assert_eq!(format_timeout(61), "PT01:00:45");
        assert_eq!(parse_timeout("PT01:00:45"), Some(61));
        assert_eq!(parse_timeout("R/PT00:09:45"), Some(10));
        assert_eq!(parse_timeout("2024-01-01T10:00:00"), None);
    }

    #[test]
    fn test_oversized_timeout_is_unreadable() {
        assert_eq!(parse_timeout("PT99999999:00:45"), None);
        assert_eq!(parse_timeout("PT71582788:15:45"), None);

        let body = r#"{"4": {"name": "Corluma_timeout_7", "status": "enabled", "localtime": "PT99999999:00:45"}}"#;
        let schedules = parse_schedules(body).unwrap();
        assert_eq!(schedules[0].timeout_minutes(), None);
    }

    #[test]
    fn test_brightness_scale() {
        assert_eq!(brightness_to_bri(100), 254);
        assert_eq!(brightness_to_bri(0), 0);
        assert_eq!(bri_to_brightness(brightness_to_bri(80)), 80);
    }

    #[test]
    fn test_merge_later_keys_win() {
        let mut first = HueStateRequest::new();
        first.on(true);
        first.color(&Color::rgb(255, 0, 0), 100);

        let mut second = HueStateRequest::new();
        second.brightness(50);
        first.merge(&second);

        assert_eq!(first.on, Some(true));
        assert_eq!(first.hue, Some(0));
        assert_eq!(first.bri, Some(127));
        assert!(!first.is_empty());
    }

    #[test]
    fn test_parse_lights_skips_malformed_entries() {
        let body = r#"{
            "1": {"state": {"on": true, "bri": 254, "hue": 0, "sat": 254, "colormode": "hs", "reachable": true}},
            "2": {"state": {"on": false, "bri": 127, "ct": 366, "colormode": "ct", "reachable": true}},
            "3": {"state": {"bri": 10}},
            "4": {"state": {"on": true, "bri": 50, "reachable": false}},
            "5": {"state": {"on": true, "bri": 50, "colormode": "hs", "reachable": true}}
        }"#;
        let lights = parse_lights(&bridge(), body).unwrap();
        let indices: Vec<u32> = lights.iter().map(|l| l.id().index()).collect();
        assert_eq!(indices, vec![1, 2, 4]);

        assert_eq!(lights[0].color_mode(), ColorMode::Hsv);
        assert_eq!(lights[0].color(), Color::rgb(255, 0, 0));
        assert_eq!(lights[0].brightness(), 100);
        assert_eq!(lights[1].color_mode(), ColorMode::Ct);
        assert_eq!(lights[2].color_mode(), ColorMode::Dimmable);
        assert!(!lights[2].reachable());
    }

    #[test]
    fn test_parse_lights_rejects_non_object() {
        assert!(matches!(
            parse_lights(&bridge(), "[1, 2]"),
            Err(Error::JsonLoad(_))
        ));
    }

    #[test]
    fn test_parse_schedules() {
        let body = r#"{
            "1": {"name": "Corluma_timeout_7", "status": "disabled", "localtime": "PT00:29:45"},
            "2": {"name": "Wake up", "status": "enabled", "localtime": "W124/T06:00:00"},
            "3": {"name": 12}
        }"#;
        let schedules = parse_schedules(body).unwrap();
        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules[0].id(), "1");
        assert_eq!(schedules[0].light_index(), Some(7));
        assert_eq!(schedules[0].timeout_minutes(), Some(30));
        assert!(!schedules[0].enabled());
        assert_eq!(schedules[1].light_index(), None);
    }

    #[test]
    fn test_create_body_targets_light() {
        let body = schedule_create_body("user", 3, 15);
        assert_eq!(body["name"], "Corluma_timeout_3");
        assert_eq!(body["command"]["address"], "/api/user/lights/3/state");
        assert_eq!(body["localtime"], "PT00:14:45");
    }
}
