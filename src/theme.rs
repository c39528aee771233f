//! UI colours: btop-style `theme[key]="value"` files mapped onto ratatui colours.

use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Colours for everything around the tokens (tokens carry their own sprites).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    /// Playfield background.
    pub bg: Color,
    /// Borders and the drop guide.
    pub div_line: Color,
    /// Body text (score, counts).
    pub main_fg: Color,
    /// Titles and labels.
    pub title: Color,
    /// Key hints and greyed-out tiers.
    pub inactive_fg: Color,
    /// Highlight for the hanging tier and merge flashes.
    pub hi_fg: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl Default for Theme {
    fn default() -> Self {
        Self::onedark()
    }
}

impl Theme {
    /// One Dark values from onedark.theme.
    pub const fn onedark() -> Self {
        Self {
            bg: Color::Rgb(0x31, 0x35, 0x3F),
            div_line: Color::Rgb(0x3F, 0x44, 0x4F),
            main_fg: Color::Rgb(0xAB, 0xB2, 0xBF),
            title: Color::Rgb(0xE5, 0xC0, 0x7B),
            inactive_fg: Color::Rgb(0x5C, 0x63, 0x70),
            hi_fg: Color::Rgb(0x56, 0xB6, 0xC2),
        }
    }

    /// Load from a btop-style file; keys missing from the file keep One Dark values.
    /// A `None` or nonexistent path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ThemeError> {
        let path = match path {
            Some(p) if p.exists() => p,
            Some(p) => {
                log::warn!("theme {} not found, using defaults", p.display());
                return Ok(Self::default());
            }
            None => return Ok(Self::default()),
        };
        let s = std::fs::read_to_string(path)?;
        Ok(Self::from_map(&parse_theme_file(&s)))
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let base = Self::onedark();
        let get = |keys: &[&str], fallback: Color| {
            keys.iter()
                .find_map(|k| map.get(*k).and_then(|v| parse_hex(v).ok()))
                .unwrap_or(fallback)
        };
        Self {
            bg: get(&["meter_bg", "main_bg"], base.bg),
            div_line: get(&["div_line"], base.div_line),
            main_fg: get(&["main_fg"], base.main_fg),
            title: get(&["title"], base.title),
            inactive_fg: get(&["inactive_fg"], base.inactive_fg),
            hi_fg: get(&["hi_fg", "proc_misc"], base.hi_fg),
        }
    }
}

/// Parse btop-style theme file into key -> value map.
fn parse_theme_file(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in s.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(rest) = line.strip_prefix("theme[") else {
            continue;
        };
        let Some((key, value)) = rest.split_once(']') else {
            continue;
        };
        let Some((_, value)) = value.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        if !value.is_empty() {
            map.insert(key.trim().to_string(), value.to_string());
        }
    }
    map
}

/// Parse hex colour "#RRGGBB" or "#RGB" into ratatui Color.
pub fn parse_hex(s: &str) -> Result<Color, ThemeError> {
    let s = s.trim().trim_start_matches('#');
    let invalid = || ThemeError::InvalidHex(s.to_string());
    if !s.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize, len: usize| u8::from_str_radix(&s[i..i + len], 16).map_err(|_| invalid());
    let (r, g, b) = match s.len() {
        6 => (channel(0, 2)?, channel(2, 2)?, channel(4, 2)?),
        3 => (channel(0, 1)? * 17, channel(1, 1)? * 17, channel(2, 1)? * 17),
        _ => return Err(invalid()),
    };
    Ok(Color::Rgb(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_6() {
        let c = parse_hex("#98C379").unwrap();
        assert!(matches!(c, Color::Rgb(0x98, 0xC3, 0x79)));
    }

    #[test]
    fn test_parse_hex_3() {
        let c = parse_hex("#FFF").unwrap();
        assert!(matches!(c, Color::Rgb(255, 255, 255)));
    }

    #[test]
    fn test_parse_hex_rejects_garbage() {
        assert!(parse_hex("#12345").is_err());
        assert!(parse_hex("#GGGGGG").is_err());
    }

    #[test]
    fn test_non_ascii_value_falls_back() {
        assert!(parse_hex("#aé123").is_err());
        assert!(parse_hex("#éa").is_err());
        let map = parse_theme_file("theme[title]=\"#aé123\"");
        let t = Theme::from_map(&map);
        assert_eq!(t.title, Theme::onedark().title);
    }

    #[test]
    fn test_parse_theme_line() {
        let map = parse_theme_file(r##"theme[meter_bg]="#31353F""##);
        assert_eq!(map.get("meter_bg"), Some(&"#31353F".to_string()));
    }

    #[test]
    fn test_partial_theme_keeps_defaults() {
        let map = parse_theme_file("theme[title]='#FF0000'\n# comment\ntheme[bogus]=\"zz\"");
        let t = Theme::from_map(&map);
        assert_eq!(t.title, Color::Rgb(255, 0, 0));
        assert_eq!(t.bg, Theme::onedark().bg);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let t = Theme::load(Some(Path::new("/nonexistent/x.theme"))).unwrap();
        assert_eq!(t, Theme::default());
    }
}
