use std::fmt;

use serde::{Deserialize, Serialize};

/// RGBA color with 8-bit channels, the runtime representation of the `Color`
/// type. Parsed from hex or CSS keyword strings, interpolated per channel by
/// curve evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// CSS keyword colors accepted by `parse_color` alongside hex notation.
static NAMED: &[(&str, Color)] = &[
    ("black", Color::rgb(0, 0, 0)),
    ("white", Color::rgb(255, 255, 255)),
    ("red", Color::rgb(255, 0, 0)),
    ("green", Color::rgb(0, 128, 0)),
    ("blue", Color::rgb(0, 0, 255)),
    ("yellow", Color::rgb(255, 255, 0)),
    ("cyan", Color::rgb(0, 255, 255)),
    ("magenta", Color::rgb(255, 0, 255)),
    ("gray", Color::rgb(128, 128, 128)),
    ("grey", Color::rgb(128, 128, 128)),
    ("orange", Color::rgb(255, 165, 0)),
    ("purple", Color::rgb(128, 0, 128)),
    ("pink", Color::rgb(255, 192, 203)),
    ("brown", Color::rgb(165, 42, 42)),
    ("transparent", Color::TRANSPARENT),
];

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Build from runtime channel values: r/g/b in [0, 255], alpha in [0, 1].
    /// Returns `None` when any channel is out of range or not finite.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_channels(r: f64, g: f64, b: f64, a: f64) -> Option<Self> {
        let channel_ok = |c: f64| c.is_finite() && (0.0..=255.0).contains(&c);
        if !(channel_ok(r) && channel_ok(g) && channel_ok(b)) {
            return None;
        }
        if !(a.is_finite() && (0.0..=1.0).contains(&a)) {
            return None;
        }
        Some(Self {
            r: r.round() as u8,
            g: g.round() as u8,
            b: b.round() as u8,
            a: (a * 255.0).round() as u8,
        })
    }

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, or a CSS keyword color.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().to_ascii_lowercase();
        if let Some(hex) = input.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        NAMED
            .iter()
            .find(|(name, _)| *name == input)
            .map(|(_, color)| *color)
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        let nibble = |c: u8| char::from(c).to_digit(16).map(|d| d as u8);
        let bytes = hex.as_bytes();
        match bytes.len() {
            3 => {
                let r = nibble(bytes[0])?;
                let g = nibble(bytes[1])?;
                let b = nibble(bytes[2])?;
                Some(Self::rgb(r * 17, g * 17, b * 17))
            }
            6 | 8 => {
                let byte = |i: usize| Some(nibble(bytes[i])? * 16 + nibble(bytes[i + 1])?);
                let r = byte(0)?;
                let g = byte(2)?;
                let b = byte(4)?;
                let a = if bytes.len() == 8 { byte(6)? } else { 255 };
                Some(Self::rgba(r, g, b, a))
            }
            _ => None,
        }
    }

    /// Alpha as a fraction in [0, 1].
    #[must_use]
    pub fn alpha(self) -> f64 {
        f64::from(self.a) / 255.0
    }

    /// Channels as `[r, g, b, a]` with r/g/b in 0–255 and a in 0–1, the
    /// layout produced by the `to_rgba` coercion.
    #[must_use]
    pub fn channels(self) -> [f64; 4] {
        [
            f64::from(self.r),
            f64::from(self.g),
            f64::from(self.b),
            self.alpha(),
        ]
    }

}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alpha = (self.alpha() * 100.0).round() / 100.0;
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, alpha)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_hex() {
        assert_eq!(Color::parse("#f00"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::parse("#fff"), Some(Color::WHITE));
    }

    #[test]
    fn parses_long_hex() {
        assert_eq!(Color::parse("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(Color::parse("#ff800080"), Some(Color::rgba(255, 128, 0, 128)));
    }

    #[test]
    fn parses_keywords_case_insensitively() {
        assert_eq!(Color::parse("RED"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::parse(" transparent "), Some(Color::TRANSPARENT));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Color::parse("#12"), None);
        assert_eq!(Color::parse("#gggggg"), None);
        assert_eq!(Color::parse("not-a-color"), None);
    }

    #[test]
    fn from_channels_validates_ranges() {
        assert_eq!(
            Color::from_channels(255.0, 0.0, 0.0, 1.0),
            Some(Color::rgb(255, 0, 0))
        );
        assert_eq!(Color::from_channels(256.0, 0.0, 0.0, 1.0), None);
        assert_eq!(Color::from_channels(0.0, -1.0, 0.0, 1.0), None);
        assert_eq!(Color::from_channels(0.0, 0.0, 0.0, 1.5), None);
        assert_eq!(Color::from_channels(f64::NAN, 0.0, 0.0, 1.0), None);
    }

    #[test]
    fn display_is_css_rgba() {
        assert_eq!(Color::rgb(255, 0, 0).to_string(), "rgba(255, 0, 0, 1)");
        assert_eq!(Color::TRANSPARENT.to_string(), "rgba(0, 0, 0, 0)");
    }

    #[test]
    fn channels_layout() {
        let c = Color::rgba(255, 128, 0, 255);
        assert_eq!(c.channels(), [255.0, 128.0, 0.0, 1.0]);
    }
}
