//! RGB colors and the conversions the diff step relies on.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An RGB color with red, green, and blue components (0-255 each).
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub(crate) red: u8,
    pub(crate) green: u8,
    pub(crate) blue: u8,
}

impl Color {
    /// Coolest color temperature a Hue bulb accepts, in mireds.
    pub const MIREDS_MIN: u16 = 153;
    /// Warmest color temperature a Hue bulb accepts, in mireds.
    pub const MIREDS_MAX: u16 = 500;

    /// Create a color with the given RGB values.
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Create a default color (black: 0,0,0).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    /// Perceptual distance between two colors: the mean absolute channel
    /// difference, normalized to `[0, 1]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lightsync_rs::Color;
    ///
    /// let black = Color::rgb(0, 0, 0);
    /// assert_eq!(black.difference(&Color::rgb(255, 255, 255)), 1.0);
    /// assert_eq!(black.difference(&black), 0.0);
    /// ```
    pub fn difference(&self, other: &Color) -> f32 {
        let channel = |a: u8, b: u8| (a as f32 - b as f32).abs() / 255.0;
        (channel(self.red, other.red)
            + channel(self.green, other.green)
            + channel(self.blue, other.blue))
            / 3.0
    }

    /// Build a color from hue in degrees and saturation/value in `[0, 1]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lightsync_rs::Color;
    ///
    /// assert_eq!(Color::from_hsv(0.0, 1.0, 1.0), Color::rgb(255, 0, 0));
    /// assert_eq!(Color::from_hsv(120.0, 0.0, 1.0), Color::rgb(255, 255, 255));
    /// ```
    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let s = saturation.clamp(0.0, 1.0);
        let v = value.clamp(0.0, 1.0);

        if s == 0.0 {
            let gray = (v * 255.0).round() as u8;
            return Color::rgb(gray, gray, gray);
        }

        let h = hue.rem_euclid(360.0) / 60.0;
        let i = h.floor() as i32;
        let f = h - i as f32;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match i % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };

        Color::rgb(
            (r * 255.0).round() as u8,
            (g * 255.0).round() as u8,
            (b * 255.0).round() as u8,
        )
    }

    /// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
    pub fn to_hsv(&self) -> (f32, f32, f32) {
        let r = self.red as f32 / 255.0;
        let g = self.green as f32 / 255.0;
        let b = self.blue as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let saturation = if max == 0.0 { 0.0 } else { delta / max };
        (hue, saturation, max)
    }

    /// Same hue and saturation at full value. Hue bulbs carry brightness
    /// separately, so colors are compared at this normalized intensity.
    pub fn at_full_value(&self) -> Self {
        let (hue, saturation, _) = self.to_hsv();
        Color::from_hsv(hue, saturation, 1.0)
    }

    /// Approximate RGB rendering of a color temperature given in mireds.
    pub fn from_mireds(mireds: u16) -> Self {
        let kelvin = 1_000_000.0 / mireds.max(1) as f32;
        let temp = kelvin / 100.0;

        let (red, green, blue) = if temp <= 66.0 {
            let green = 99.470_8 * temp.ln() - 161.119_57;
            let blue = if temp <= 19.0 {
                0.0
            } else {
                138.517_73 * (temp - 10.0).ln() - 305.044_8
            };
            (255.0, green, blue)
        } else {
            (
                329.698_73 * (temp - 60.0).powf(-0.133_204_76),
                288.122_16 * (temp - 60.0).powf(-0.075_514_85),
                255.0,
            )
        };

        Color::rgb(
            red.clamp(0.0, 255.0) as u8,
            green.clamp(0.0, 255.0) as u8,
            blue.clamp(0.0, 255.0) as u8,
        )
    }

    /// Closest color temperature in the Hue range for this color, in mireds.
    ///
    /// # Examples
    ///
    /// ```
    /// use lightsync_rs::Color;
    ///
    /// let warm = Color::from_mireds(400);
    /// let mireds = warm.to_mireds();
    /// assert!(Color::from_mireds(mireds).difference(&warm) < 0.01);
    /// ```
    pub fn to_mireds(&self) -> u16 {
        (Self::MIREDS_MIN..=Self::MIREDS_MAX)
            .min_by(|a, b| {
                let da = Color::from_mireds(*a).difference(self);
                let db = Color::from_mireds(*b).difference(self);
                da.total_cmp(&db)
            })
            .unwrap_or(Self::MIREDS_MIN)
    }
}

impl FromStr for Color {
    type Err = String;

    /// Parse from comma-separated string (e.g., "255,128,0").
    fn from_str(s: &str) -> Result<Self, String> {
        let parts: Vec<u8> = s
            .split(',')
            .map(|c| c.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?;
        match parts.as_slice() {
            [r, g, b] => Ok(Self::rgb(*r, *g, *b)),
            _ => Err("Expected format: r,g,b".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difference_is_symmetric() {
        let a = Color::rgb(10, 200, 30);
        let b = Color::rgb(40, 100, 0);
        assert_eq!(a.difference(&b), b.difference(&a));
        assert!((a.difference(&b) - 160.0 / 765.0).abs() < 1e-6);
    }

    #[test]
    fn test_hsv_round_trip_primary() {
        let (h, s, v) = Color::rgb(0, 0, 255).to_hsv();
        assert_eq!(h, 240.0);
        assert_eq!(s, 1.0);
        assert_eq!(v, 1.0);
    }

    #[test]
    fn test_full_value_normalizes_dim_color() {
        assert_eq!(Color::rgb(128, 0, 0).at_full_value(), Color::rgb(255, 0, 0));
    }

    #[test]
    fn test_mireds_are_clamped_to_hue_range() {
        let blue_white = Color::rgb(150, 180, 255);
        let mireds = blue_white.to_mireds();
        assert!((Color::MIREDS_MIN..=Color::MIREDS_MAX).contains(&mireds));
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(Color::from_str("256,0,0").is_err());
        assert!(Color::from_str("1,2").is_err());
        assert_eq!(Color::from_str("1, 2, 3").unwrap(), Color::rgb(1, 2, 3));
    }
}
