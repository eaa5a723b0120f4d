//! Colour palette used to highlight a rendered query.

use std::fmt;
use std::str::FromStr;

use crossterm::style::Color;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 24-bit colour, written as `#rrggbb` in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid colour {0:?}, expected #rrggbb")]
pub struct ColourError(String);

impl FromStr for Rgb {
    type Err = ColourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix('#')
            .filter(|hex| hex.len() == 6 && hex.is_ascii())
            .ok_or_else(|| ColourError(s.to_string()))?;
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ColourError(s.to_string()))
        };
        Ok(Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColourError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(rgb: Rgb) -> Self {
        rgb.to_string()
    }
}

impl From<Rgb> for Color {
    fn from(Rgb(r, g, b): Rgb) -> Self {
        Color::Rgb { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Visual state of a filter chip: whether it is shown as invalid and whether
/// the cursor is inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipState {
    Valid,
    ValidActive,
    Invalid,
    InvalidActive,
}

impl ChipState {
    pub fn new(invalid: bool, active: bool) -> Self {
        match (invalid, active) {
            (false, false) => ChipState::Valid,
            (false, true) => ChipState::ValidActive,
            (true, false) => ChipState::Invalid,
            (true, true) => ChipState::InvalidActive,
        }
    }
}

/// One colour per chip state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChipPalette {
    pub valid: Rgb,
    pub valid_active: Rgb,
    pub invalid: Rgb,
    pub invalid_active: Rgb,
}

impl ChipPalette {
    pub fn get(&self, state: ChipState) -> Rgb {
        match state {
            ChipState::Valid => self.valid,
            ChipState::ValidActive => self.valid_active,
            ChipState::Invalid => self.invalid,
            ChipState::InvalidActive => self.invalid_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Theme {
    pub search_token_background: ChipPalette,
    pub search_token_border: ChipPalette,
    pub sub_text: Rgb,
    pub gray300: Rgb,
    pub red300: Rgb,
    pub blue300: Rgb,
    pub purple300: Rgb,
    pub pink300: Rgb,
    pub green300: Rgb,
    pub orange400: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            search_token_background: ChipPalette {
                valid: Rgb(0xe8, 0xf1, 0xfd),
                valid_active: Rgb(0xd2, 0xe3, 0xfb),
                invalid: Rgb(0xfc, 0xe9, 0xec),
                invalid_active: Rgb(0xf9, 0xd2, 0xd9),
            },
            search_token_border: ChipPalette {
                valid: Rgb(0xa5, 0xc4, 0xf1),
                valid_active: Rgb(0x6c, 0x9a, 0xe6),
                invalid: Rgb(0xf2, 0xa7, 0xb4),
                invalid_active: Rgb(0xe8, 0x6c, 0x82),
            },
            sub_text: Rgb(0x80, 0x70, 0x8f),
            gray300: Rgb(0x80, 0x70, 0x8f),
            red300: Rgb(0xf5, 0x54, 0x59),
            blue300: Rgb(0x3d, 0x74, 0xdb),
            purple300: Rgb(0x6c, 0x5f, 0xc7),
            pink300: Rgb(0xf1, 0x44, 0x99),
            green300: Rgb(0x2b, 0xa1, 0x85),
            orange400: Rgb(0xe7, 0x6a, 0x2a),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_colour() {
        assert_eq!("#3d74db".parse::<Rgb>(), Ok(Rgb(0x3d, 0x74, 0xdb)));
        assert_eq!("#FFFFFF".parse::<Rgb>(), Ok(Rgb(255, 255, 255)));
        assert!("3d74db".parse::<Rgb>().is_err());
        assert!("#3d74d".parse::<Rgb>().is_err());
        assert!("#3d74dz".parse::<Rgb>().is_err());
        assert!("#ééé".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_colour_display_round_trips() {
        let rgb = Rgb(1, 2, 255);
        assert_eq!(rgb.to_string(), "#0102ff");
    }

    #[test]
    fn test_chip_state_matrix() {
        assert_eq!(ChipState::new(false, false), ChipState::Valid);
        assert_eq!(ChipState::new(false, true), ChipState::ValidActive);
        assert_eq!(ChipState::new(true, false), ChipState::Invalid);
        assert_eq!(ChipState::new(true, true), ChipState::InvalidActive);

        let palette = Theme::default().search_token_background;
        assert_eq!(palette.get(ChipState::Invalid), palette.invalid);
        assert_eq!(palette.get(ChipState::ValidActive), palette.valid_active);
    }

    #[test]
    fn test_partial_theme_uses_defaults() {
        let theme: Theme = serde_json::from_str(r##"{"red300": "#ff0000"}"##).unwrap();
        assert_eq!(theme.red300, Rgb(255, 0, 0));
        assert_eq!(theme.blue300, Theme::default().blue300);
    }
}
