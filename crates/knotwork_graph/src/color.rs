// SPDX-License-Identifier: MIT OR Apache-2.0
//! sRGB colors and the default item palette.
//!
//! Colors are stored as 8-bit sRGB with alpha and serialize as
//! `"#rrggbbaa"` strings. Arrays of four linear floats are accepted on input.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// 8-bit sRGB color with alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

/// Default fill of nodes and routers
pub const NODE_DEFAULT_COLOR: Color = Color::from_rgba_u32(0xddddddff);
/// Default background of group boxes
pub const GROUP_BOX_BACKGROUND: Color = Color::from_rgba_u32(0x44444466);
/// Default text color of comment boxes
pub const COMMENT_COLOR: Color = Color::from_rgba_u32(0x4caf50ff);
/// Default background of comment boxes
pub const COMMENT_BACKGROUND: Color = Color::from_rgba_u32(0x004d4066);
/// Default arrow color
pub const ARROW_DEFAULT_COLOR: Color = Color::from_rgba_u32(0xff0000ff);
/// Radius of a router dot
pub const ROUTER_RADIUS: f32 = 6.0;
/// Height of the clickable header strip of a group box
pub const GROUP_BOX_HEADER_HEIGHT: f32 = 16.0;
/// Margin around comment text
pub const COMMENT_BOX_MARGIN: f32 = 8.0;

impl Color {
    /// Create a color from components
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create a color from a packed `0xRRGGBBAA` value
    pub const fn from_rgba_u32(v: u32) -> Self {
        Self {
            r: (v >> 24) as u8,
            g: (v >> 16) as u8,
            b: (v >> 8) as u8,
            a: v as u8,
        }
    }

    /// Pack into `0xRRGGBBAA`
    pub const fn to_rgba_u32(self) -> u32 {
        (self.r as u32) << 24 | (self.g as u32) << 16 | (self.b as u32) << 8 | self.a as u32
    }

    /// Format as `#rrggbbaa`
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }

    /// Parse `#rrggbbaa`
    pub fn from_hex(code: &str) -> Option<Self> {
        let digits = code.strip_prefix('#')?;
        if digits.len() != 8 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?))
    }

    /// Convert linear float components (0..1) to sRGB
    pub fn from_linear(r: f32, g: f32, b: f32, a: f32) -> Self {
        fn encode(c: f32) -> u8 {
            let c = c.clamp(0.0, 1.0);
            let s = if c <= 0.003_130_8 {
                c * 12.92
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            };
            (s * 255.0).round() as u8
        }
        Self::new(
            encode(r),
            encode(g),
            encode(b),
            (a.clamp(0.0, 1.0) * 255.0).round() as u8,
        )
    }

    /// Halve the color channels and divide alpha by three, used for derived backgrounds
    pub fn dimmed(self) -> Self {
        Self::new(self.r / 2, self.g / 2, self.b / 2, self.a / 3)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ColorVisitor;

        impl<'de> Visitor<'de> for ColorVisitor {
            type Value = Color;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a \"#rrggbbaa\" string or an array of 4 linear floats")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Color, E> {
                Color::from_hex(v).ok_or_else(|| {
                    E::custom(format!("color string should be formatted like #RRGGBBAA, got {v:?}"))
                })
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Color, A::Error> {
                let mut vals = [0f32; 4];
                for (i, slot) in vals.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                if seq.next_element::<f32>()?.is_some() {
                    return Err(de::Error::invalid_length(5, &self));
                }
                Ok(Color::from_linear(vals[0], vals[1], vals[2], vals[3]))
            }
        }

        deserializer.deserialize_any(ColorVisitor)
    }
}
