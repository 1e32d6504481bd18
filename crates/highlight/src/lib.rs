//! UPL token rules, the tokenizer that applies them, and editor colour themes.

mod language;
mod rules;
mod theme;

pub use language::{
    builtin, HighlightError, HighlightKind, HighlightToken, LanguageDefinition, LanguageId,
    LanguageRegistry, LexState, TokenizedText,
};
pub use rules::LanguageRules;
pub use theme::{
    builtin as themes, parse_highlight_palette, Color, ColorParseError, HighlightPalette,
    HighlightStyle, Theme, ThemeParseError, DEFAULT_THEME,
};
