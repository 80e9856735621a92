//! Color identifiers and their RGBA form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host color identifier.
///
/// Negative values mean "unset" wherever a color appears as a setting value.
/// Identifiers with the `0x40000000` tag carry a packed `0xRRGGBB` custom color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorId(pub i32);

impl ColorId {
    const PACKED_TAG: i32 = 0x4000_0000;
    const TAG_MASK: i32 = 0x7F00_0000;

    /// Wrap a raw identifier.
    pub fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw identifier.
    pub fn raw(&self) -> i32 {
        self.0
    }

    /// Whether the value counts as a set color (`>= 0`).
    pub fn is_set(&self) -> bool {
        self.0 >= 0
    }

    /// Build a packed custom color identifier.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(Self::PACKED_TAG | (r as i32) << 16 | (g as i32) << 8 | b as i32)
    }

    /// Explicit RGB carried by a packed custom color identifier.
    pub fn packed_rgb(&self) -> Option<[u8; 3]> {
        if self.0 & Self::TAG_MASK != Self::PACKED_TAG {
            return None;
        }
        let rgb = self.0 & 0x00FF_FFFF;
        Some([(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8])
    }
}

impl fmt::Display for ColorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ColorId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// 8-bit RGBA color, serialized as `[r, g, b, a]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    /// Create from components.
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Floor-scale a normalized triple to 0–255 and append opaque alpha.
    ///
    /// Components are clamped to `[0, 1]` first; NaN maps to 0.
    pub fn from_normalized(rgb: [f32; 3]) -> Self {
        let scale = |c: f32| {
            let c = if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) };
            (c * 255.0).floor() as u8
        };
        Self([scale(rgb[0]), scale(rgb[1]), scale(rgb[2]), 255])
    }

    /// Components as an array.
    pub fn to_array(&self) -> [u8; 4] {
        self.0
    }
}

/// Color as reported by the host's color table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostColor {
    /// Normalized RGB triple in `[0, 1]`.
    Normalized([f32; 3]),
    /// Explicit RGBA, passed through unchanged.
    Rgba(Rgba),
}

impl HostColor {
    /// Convert to the RGBA written into color libraries.
    pub fn to_rgba(&self) -> Rgba {
        match self {
            Self::Normalized(rgb) => Rgba::from_normalized(*rgb),
            Self::Rgba(rgba) => *rgba,
        }
    }
}
