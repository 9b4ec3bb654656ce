/// Garment base colors and sRGB transfer functions
use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::take_while_m_n,
    character::complete::char,
    combinator::{all_consuming, map, map_res, opt},
    sequence::{preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::ColorError;

/// An 8-bit sRGB color as authored in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Studio swatches offered next to the free color picker.
pub const COLOR_PRESETS: [(&str, Rgb); 10] = [
    ("Noir", Rgb::new(0x11, 0x11, 0x11)),
    ("Blanc", Rgb::new(0xEE, 0xEE, 0xEE)),
    ("Rouge", Rgb::new(0xE6, 0x39, 0x46)),
    ("Bleu Royal", Rgb::new(0x1D, 0x35, 0x57)),
    ("Vert Forêt", Rgb::new(0x2D, 0x6A, 0x4F)),
    ("Or", Rgb::new(0xD4, 0xAF, 0x37)),
    ("Violet", Rgb::new(0x7B, 0x2D, 0x8E)),
    ("Orange", Rgb::new(0xF7, 0x7F, 0x00)),
    ("Rose", Rgb::new(0xFF, 0x6B, 0x9D)),
    ("Gris", Rgb::new(0x6B, 0x72, 0x80)),
];

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` or `#RGB`; the `#` is optional.
    pub fn from_hex(input: &str) -> Result<Self, ColorError> {
        all_consuming(hex_color)(input.trim())
            .map(|(_, rgb)| rgb)
            .map_err(|_| ColorError(input.to_string()))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Linear-light components for shading.
    pub fn to_linear(&self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|c| srgb_to_linear(c as f32 / 255.0))
    }

    pub fn from_linear(linear: [f32; 3]) -> Self {
        let [r, g, b] = linear.map(|c| (linear_to_srgb(c) * 255.0).round() as u8);
        Self { r, g, b }
    }
}

impl Default for Rgb {
    fn default() -> Self {
        COLOR_PRESETS[0].1
    }
}

impl FromStr for Rgb {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// sRGB electro-optical transfer function
pub fn srgb_to_linear(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn hex_color(input: &str) -> IResult<&str, Rgb> {
    preceded(opt(char('#')), alt((long_form, short_form)))(input)
}

fn long_form(input: &str) -> IResult<&str, Rgb> {
    map(tuple((hex_digits(2), hex_digits(2), hex_digits(2))), |(r, g, b)| {
        Rgb { r, g, b }
    })(input)
}

fn short_form(input: &str) -> IResult<&str, Rgb> {
    map(tuple((hex_digits(1), hex_digits(1), hex_digits(1))), |(r, g, b)| {
        Rgb {
            r: r * 17,
            g: g * 17,
            b: b * 17,
        }
    })(input)
}

fn hex_digits(count: usize) -> impl FnMut(&str) -> IResult<&str, u8> {
    move |input| {
        map_res(
            take_while_m_n(count, count, |c: char| c.is_ascii_hexdigit()),
            |digits| u8::from_str_radix(digits, 16),
        )(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_long_and_short_forms() {
        assert_eq!(Rgb::from_hex("#111111").unwrap(), Rgb::new(0x11, 0x11, 0x11));
        assert_eq!(Rgb::from_hex("e63946").unwrap(), Rgb::new(0xE6, 0x39, 0x46));
        assert_eq!(Rgb::from_hex("#fA0").unwrap(), Rgb::new(0xFF, 0xAA, 0x00));
        assert_eq!(Rgb::from_hex("  #D4AF37 ").unwrap().to_hex(), "#D4AF37");
    }

    #[test]
    fn test_reject_malformed() {
        for bad in ["", "#", "#12", "#1234", "#12345g", "#1234567", "red"] {
            assert!(Rgb::from_hex(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_serde_uses_hex_strings() {
        let color: Rgb = serde_json::from_str("\"#2D6A4F\"").unwrap();
        assert_eq!(color, Rgb::new(0x2D, 0x6A, 0x4F));
        assert_eq!(serde_json::to_string(&color).unwrap(), "\"#2D6A4F\"");
        assert!(serde_json::from_str::<Rgb>("\"nope\"").is_err());
    }

    #[test]
    fn test_transfer_functions_invert() {
        for value in [0u8, 1, 17, 128, 200, 255] {
            let c = value as f32 / 255.0;
            let back = linear_to_srgb(srgb_to_linear(c));
            assert!((back - c).abs() < 1e-4);
        }
        // Mid grey is darker in linear light
        assert!(srgb_to_linear(0.5) < 0.25);
    }

    #[test]
    fn test_linear_round_trip_preserves_presets() {
        for (_, preset) in COLOR_PRESETS {
            assert_eq!(Rgb::from_linear(preset.to_linear()), preset);
        }
    }
}
