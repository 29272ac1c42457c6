//! Brush color parsing.

use peniko::Color;
use peniko::color::{Srgb, parse_color};

/// Parse a CSS color string such as `#1a1a2e`, `#f00`, `#ff000080` or `red`.
pub fn parse_css_color(s: &str) -> Option<Color> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    parse_color(s).ok().map(|c| c.to_alpha_color::<Srgb>())
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let short = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    match hex.len() {
        3 => Some(Color::from_rgba8(short(0)?, short(1)?, short(2)?, 255)),
        6 => Some(Color::from_rgba8(channel(0)?, channel(2)?, channel(4)?, 255)),
        8 => Some(Color::from_rgba8(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
        _ => None,
    }
}

/// Parse a brush color, falling back to black.
pub fn brush_color(s: &str) -> Color {
    parse_css_color(s).unwrap_or_else(|| {
        log::warn!("Unrecognized color '{}', drawing in black", s);
        Color::from_rgba8(0, 0, 0, 255)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(c: Color) -> [u8; 4] {
        let c = c.to_rgba8();
        [c.r, c.g, c.b, c.a]
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(rgba(parse_css_color("#1a1a2e").unwrap()), [0x1a, 0x1a, 0x2e, 255]);
        assert_eq!(rgba(parse_css_color("#f00").unwrap()), [255, 0, 0, 255]);
        assert_eq!(rgba(parse_css_color("#00ff0080").unwrap()), [0, 255, 0, 0x80]);
    }

    #[test]
    fn test_parse_named() {
        assert_eq!(rgba(parse_css_color("red").unwrap()), [255, 0, 0, 255]);
    }

    #[test]
    fn test_invalid_falls_back() {
        assert!(parse_css_color("#12345").is_none());
        assert!(parse_css_color("#gggggg").is_none());
        assert_eq!(rgba(brush_color("not-a-color")), [0, 0, 0, 255]);
    }

    #[test]
    fn test_palette_parses() {
        for color in paintroom_core::stroke::DEFAULT_PALETTE {
            assert!(parse_css_color(color).is_some(), "{} should parse", color);
        }
    }
}
