use std::collections::HashMap;

use crate::language::HighlightKind;

pub const DEFAULT_THEME: &str = "upl-dark";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// 解析 `#RRGGBB` 或 `#RRGGBBAA`。 / Parses `#RRGGBB` or `#RRGGBBAA`.
    pub fn parse(input: &str) -> Result<Self, ColorParseError> {
        let hex = input
            .trim()
            .strip_prefix('#')
            .ok_or(ColorParseError::MissingHash)?;
        if hex.len() != 6 && hex.len() != 8 {
            return Err(ColorParseError::InvalidLength);
        }
        if !hex.is_ascii() {
            return Err(ColorParseError::InvalidHex);
        }
        let mut components = [255u8; 4];
        for (index, component) in components.iter_mut().take(hex.len() / 2).enumerate() {
            *component = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16)
                .map_err(|_| ColorParseError::InvalidHex)?;
        }
        let [r, g, b, a] = components;
        Ok(Self { r, g, b, a })
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightStyle {
    pub foreground: Color,
    pub background: Option<Color>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl HighlightStyle {
    pub fn plain(foreground: Color) -> Self {
        Self {
            foreground,
            background: None,
            bold: false,
            italic: false,
            underline: false,
        }
    }
}

/// Token class to style mapping.
#[derive(Debug, Default, Clone)]
pub struct HighlightPalette {
    styles: HashMap<HighlightKind, HighlightStyle>,
}

impl HighlightPalette {
    pub fn style_for(&self, kind: &HighlightKind) -> Option<&HighlightStyle> {
        self.styles.get(kind)
    }

    pub fn insert(&mut self, kind: HighlightKind, style: HighlightStyle) {
        self.styles.insert(kind, style);
    }

    /// Inserts a style under its token class name. Returns `false` for names
    /// that are not a known token class.
    pub fn insert_named(&mut self, key: &str, style: HighlightStyle) -> bool {
        match HighlightKind::from_name(key) {
            Some(kind) => {
                self.insert(kind, style);
                true
            }
            None => false,
        }
    }

    /// 以 `overrides` 覆蓋同名樣式。 / Replaces styles with those in `overrides`.
    pub fn merge(&mut self, overrides: HighlightPalette) {
        self.styles.extend(overrides.styles);
    }
}

/// Editor colour scheme: base colours plus per-token styles.
#[derive(Debug, Clone)]
pub struct Theme {
    pub name: String,
    pub base: String,
    pub background: Color,
    pub foreground: Color,
    pub palette: HighlightPalette,
}

impl Theme {
    /// Applies a user palette (see [`parse_highlight_palette`]) on top of the
    /// theme's own styles.
    pub fn with_palette_overrides(
        mut self,
        syntax_value: &serde_json::Value,
    ) -> Result<Self, ThemeParseError> {
        let overrides = parse_highlight_palette(syntax_value)?;
        self.palette.merge(overrides);
        Ok(self)
    }

    pub fn style_for(&self, kind: &HighlightKind) -> HighlightStyle {
        self.palette
            .style_for(kind)
            .cloned()
            .unwrap_or_else(|| HighlightStyle::plain(self.foreground))
    }
}

pub mod builtin {
    use super::*;

    pub fn themes() -> Vec<Theme> {
        vec![upl_dark()]
    }

    pub fn theme(name: &str) -> Option<Theme> {
        themes().into_iter().find(|theme| theme.name == name)
    }

    pub fn upl_dark() -> Theme {
        let mut palette = HighlightPalette::default();
        let entries = [
            (HighlightKind::Keyword, Color::rgb(0xC5, 0x86, 0xC0)),
            (HighlightKind::Function, Color::rgb(0xDC, 0xDC, 0xAA)),
            (HighlightKind::Number, Color::rgb(0xB5, 0xCE, 0xA8)),
            (HighlightKind::String, Color::rgb(0xCE, 0x91, 0x78)),
            (HighlightKind::Comment, Color::rgb(0x6A, 0x99, 0x55)),
            (HighlightKind::Constant, Color::rgb(0x56, 0x9C, 0xD6)),
            (HighlightKind::Operator, Color::rgb(0xD4, 0xD4, 0xD4)),
            (HighlightKind::Bracket, Color::rgb(0xD4, 0xD4, 0xD4)),
        ];
        for (kind, color) in entries {
            palette.insert(kind, HighlightStyle::plain(color));
        }
        Theme {
            name: DEFAULT_THEME.to_string(),
            base: "vs-dark".to_string(),
            background: Color::rgb(0x15, 0x1B, 0x2B),
            foreground: Color::rgb(0xD4, 0xD4, 0xD4),
            palette,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThemeParseError {
    #[error("syntax entries must be objects")]
    InvalidSyntax,
    #[error("unknown token class '{0}'")]
    UnknownTokenClass(String),
    #[error("invalid color '{value}': {reason}")]
    InvalidColor {
        value: String,
        reason: ColorParseError,
    },
    #[error("entries must contain foreground color")]
    MissingForeground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ColorParseError {
    #[error("missing leading '#'")]
    MissingHash,
    #[error("expected 6 or 8 hex digits")]
    InvalidLength,
    #[error("contains non-hex digits")]
    InvalidHex,
}

/// Parses a `{ "<token class>": { "foreground": "#RRGGBB", ... } }` object.
pub fn parse_highlight_palette(
    syntax_value: &serde_json::Value,
) -> Result<HighlightPalette, ThemeParseError> {
    let map = syntax_value
        .as_object()
        .ok_or(ThemeParseError::InvalidSyntax)?;
    let mut palette = HighlightPalette::default();
    for (name, entry) in map {
        let style = parse_style(entry)?;
        if !palette.insert_named(name, style) {
            return Err(ThemeParseError::UnknownTokenClass(name.clone()));
        }
    }
    Ok(palette)
}

fn parse_style(value: &serde_json::Value) -> Result<HighlightStyle, ThemeParseError> {
    let map = value.as_object().ok_or(ThemeParseError::InvalidSyntax)?;

    let foreground = map
        .get("foreground")
        .and_then(|value| value.as_str())
        .ok_or(ThemeParseError::MissingForeground)?;
    let foreground = Color::parse(foreground).map_err(|reason| ThemeParseError::InvalidColor {
        value: foreground.to_string(),
        reason,
    })?;

    let background = map
        .get("background")
        .and_then(|value| value.as_str())
        .map(|value| {
            Color::parse(value).map_err(|reason| ThemeParseError::InvalidColor {
                value: value.to_string(),
                reason,
            })
        })
        .transpose()?;

    let flag = |key: &str| map.get(key).and_then(|value| value.as_bool()).unwrap_or(false);

    Ok(HighlightStyle {
        foreground,
        background,
        bold: flag("bold"),
        italic: flag("italic"),
        underline: flag("underline"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_palette() {
        let value = json!({
            "keyword": {
                "foreground": "#FFAA00",
                "bold": true
            },
            "brackets": {
                "foreground": "#11AAFF",
                "italic": true
            }
        });

        let palette = parse_highlight_palette(&value).unwrap();
        let keyword = palette.style_for(&HighlightKind::Keyword).unwrap();
        assert!(keyword.bold);
        assert_eq!(keyword.foreground.to_hex(), "#FFAA00");
        assert!(palette.style_for(&HighlightKind::Bracket).unwrap().italic);
        assert!(palette.style_for(&HighlightKind::String).is_none());
    }

    #[test]
    fn rejects_unknown_token_class_and_bad_colors() {
        let unknown = json!({ "custom.debug": { "foreground": "#CCCCCC" } });
        assert!(matches!(
            parse_highlight_palette(&unknown),
            Err(ThemeParseError::UnknownTokenClass(name)) if name == "custom.debug"
        ));

        let bad = json!({ "keyword": { "foreground": "C586C0" } });
        assert!(matches!(
            parse_highlight_palette(&bad),
            Err(ThemeParseError::InvalidColor {
                reason: ColorParseError::MissingHash,
                ..
            })
        ));
    }

    #[test]
    fn parses_colors_with_and_without_alpha() {
        assert_eq!(Color::parse(" #c586c0 ").unwrap(), Color::rgb(0xC5, 0x86, 0xC0));
        let translucent = Color::parse("#151B2B80").unwrap();
        assert_eq!(translucent.a, 0x80);
        assert_eq!(translucent.to_hex(), "#151B2B80");
        assert_eq!(Color::parse("#12345"), Err(ColorParseError::InvalidLength));
        assert_eq!(Color::parse("#GG0000"), Err(ColorParseError::InvalidHex));
        assert_eq!(
            ColorParseError::MissingHash.to_string(),
            "missing leading '#'"
        );
    }

    #[test]
    fn palette_overrides_replace_only_named_classes() {
        let theme = builtin::upl_dark()
            .with_palette_overrides(&json!({
                "keyword": { "foreground": "#FF0000", "underline": true }
            }))
            .unwrap();
        let keyword = theme.style_for(&HighlightKind::Keyword);
        assert_eq!(keyword.foreground, Color::rgb(0xFF, 0, 0));
        assert!(keyword.underline);
        assert_eq!(theme.style_for(&HighlightKind::Comment).foreground.to_hex(), "#6A9955");

        assert!(builtin::upl_dark()
            .with_palette_overrides(&json!(["keyword"]))
            .is_err());
    }

    #[test]
    fn upl_dark_matches_editor_colors() {
        let theme = builtin::theme(DEFAULT_THEME).unwrap();
        assert_eq!(theme.background.to_hex(), "#151B2B");
        assert_eq!(theme.style_for(&HighlightKind::Keyword).foreground.to_hex(), "#C586C0");
        assert_eq!(theme.style_for(&HighlightKind::Comment).foreground.to_hex(), "#6A9955");
        // identifiers fall back to the editor foreground
        assert_eq!(
            theme.style_for(&HighlightKind::Identifier).foreground,
            theme.foreground
        );
    }
}
