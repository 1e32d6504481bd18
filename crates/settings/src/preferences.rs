use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uplstudio_highlight::{themes, Theme, ThemeParseError, DEFAULT_THEME};

use crate::storage::write_atomic;

const PREFERENCES_VERSION: u32 = 1;
const MIN_FONT_SIZE: u32 = 6;
const MAX_FONT_SIZE: u32 = 72;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to read preferences {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse preferences {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid palette in preferences {path}: {source}")]
    Palette {
        path: PathBuf,
        #[source]
        source: ThemeParseError,
    },
    #[error("failed to serialize preferences {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write preferences {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unknown preference '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub editor: EditorPreferences,
    #[serde(default)]
    pub ui: UiPreferences,
    #[serde(default)]
    pub workspace: WorkspacePreferences,
}

fn default_version() -> u32 {
    PREFERENCES_VERSION
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            editor: EditorPreferences::default(),
            ui: UiPreferences::default(),
            workspace: WorkspacePreferences::default(),
        }
    }
}

impl Preferences {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = PREFERENCES_VERSION;
        }
        self.editor.sanitize();
        self.ui.sanitize();
        self.workspace.sanitize();
    }

    /// 解析主題並套用 `ui.palette` 覆寫。 / Resolves the configured theme
    /// (unknown names fall back to `upl-dark`) and applies `ui.palette`.
    pub fn theme(&self) -> Result<Theme, ThemeParseError> {
        let base = themes::theme(&self.ui.theme).unwrap_or_else(themes::upl_dark);
        match &self.ui.palette {
            Some(palette) => base.with_palette_overrides(palette),
            None => Ok(base),
        }
    }

    /// Assigns a single scalar preference from its textual form.
    pub fn assign(&mut self, key: PreferenceKey, raw: &str) -> Result<(), PreferencesError> {
        match key {
            PreferenceKey::FontSize => self.editor.font_size = parse_number(key, raw)?,
            PreferenceKey::LineNumbers => self.editor.line_numbers = parse_flag(key, raw)?,
            PreferenceKey::Minimap => self.editor.minimap = parse_flag(key, raw)?,
            PreferenceKey::ScrollBeyondLastLine => {
                self.editor.scroll_beyond_last_line = parse_flag(key, raw)?
            }
            PreferenceKey::ReadOnly => self.editor.read_only = parse_flag(key, raw)?,
            PreferenceKey::PaddingTop => self.editor.padding_top = parse_number(key, raw)?,
            PreferenceKey::PaddingBottom => self.editor.padding_bottom = parse_number(key, raw)?,
            PreferenceKey::Theme => self.ui.theme = raw.to_string(),
            PreferenceKey::DefaultFile => self.workspace.default_file = raw.to_string(),
            PreferenceKey::Placeholder => self.workspace.placeholder = raw.to_string(),
        }
        Ok(())
    }
}

/// 可由命令列設定的偏好鍵。 / Preference keys settable one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceKey {
    FontSize,
    LineNumbers,
    Minimap,
    ScrollBeyondLastLine,
    ReadOnly,
    PaddingTop,
    PaddingBottom,
    Theme,
    DefaultFile,
    Placeholder,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 10] = [
        PreferenceKey::FontSize,
        PreferenceKey::LineNumbers,
        PreferenceKey::Minimap,
        PreferenceKey::ScrollBeyondLastLine,
        PreferenceKey::ReadOnly,
        PreferenceKey::PaddingTop,
        PreferenceKey::PaddingBottom,
        PreferenceKey::Theme,
        PreferenceKey::DefaultFile,
        PreferenceKey::Placeholder,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PreferenceKey::FontSize => "editor.font_size",
            PreferenceKey::LineNumbers => "editor.line_numbers",
            PreferenceKey::Minimap => "editor.minimap",
            PreferenceKey::ScrollBeyondLastLine => "editor.scroll_beyond_last_line",
            PreferenceKey::ReadOnly => "editor.read_only",
            PreferenceKey::PaddingTop => "editor.padding_top",
            PreferenceKey::PaddingBottom => "editor.padding_bottom",
            PreferenceKey::Theme => "ui.theme",
            PreferenceKey::DefaultFile => "workspace.default_file",
            PreferenceKey::Placeholder => "workspace.placeholder",
        }
    }
}

impl FromStr for PreferenceKey {
    type Err = PreferencesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.name() == value)
            .ok_or_else(|| PreferencesError::UnknownKey(value.to_string()))
    }
}

fn parse_flag(key: PreferenceKey, raw: &str) -> Result<bool, PreferencesError> {
    raw.trim().parse().map_err(|_| PreferencesError::InvalidValue {
        key: key.name(),
        value: raw.to_string(),
        expected: "true or false",
    })
}

fn parse_number(key: PreferenceKey, raw: &str) -> Result<u32, PreferencesError> {
    raw.trim().parse().map_err(|_| PreferencesError::InvalidValue {
        key: key.name(),
        value: raw.to_string(),
        expected: "a non-negative integer",
    })
}

/// 編輯器元件選項。 / Options forwarded to the embedded editor widget.
///
/// Apart from `read_only`, which makes front ends refuse content writes, these
/// are stored and handed on unchanged; nothing in the workspace core reads
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorPreferences {
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_true")]
    pub line_numbers: bool,
    #[serde(default)]
    pub minimap: bool,
    #[serde(default)]
    pub scroll_beyond_last_line: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_padding")]
    pub padding_top: u32,
    #[serde(default = "default_padding")]
    pub padding_bottom: u32,
}

fn default_true() -> bool {
    true
}

fn default_font_size() -> u32 {
    14
}

fn default_padding() -> u32 {
    16
}

impl Default for EditorPreferences {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            line_numbers: true,
            minimap: false,
            scroll_beyond_last_line: false,
            read_only: false,
            padding_top: default_padding(),
            padding_bottom: default_padding(),
        }
    }
}

impl EditorPreferences {
    fn sanitize(&mut self) {
        if self.font_size == 0 {
            self.font_size = default_font_size();
        }
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiPreferences {
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Per-token-class overrides, e.g. `{"keyword": {"foreground": "#FF0000"}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<serde_json::Value>,
}

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            palette: None,
        }
    }
}

impl UiPreferences {
    fn sanitize(&mut self) {
        if self.theme.trim().is_empty() {
            self.theme = default_theme();
        }
    }
}

/// Seeds used when a workspace has nothing stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspacePreferences {
    #[serde(default = "default_file")]
    pub default_file: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

fn default_file() -> String {
    "main.upl".to_string()
}

fn default_placeholder() -> String {
    "// Write your UPL code here".to_string()
}

impl Default for WorkspacePreferences {
    fn default() -> Self {
        Self {
            default_file: default_file(),
            placeholder: default_placeholder(),
        }
    }
}

impl WorkspacePreferences {
    fn sanitize(&mut self) {
        let trimmed = self.default_file.trim();
        if trimmed.is_empty() {
            self.default_file = default_file();
        } else if trimmed.len() != self.default_file.len() {
            self.default_file = trimmed.to_string();
        }
    }
}

/// 偏好設定檔。 / Preferences bound to their JSON file.
///
/// Every accepted change is sanitised, checked (the palette must parse) and
/// written back immediately.
#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    data: Preferences,
}

impl PreferencesStore {
    /// 載入偏好設定；檔案不存在時使用預設值。 / Loads preferences, using
    /// defaults when the file does not exist yet (nothing is written).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            read_preferences(&path)?
        } else {
            validated(Preferences::default(), &path)?
        };
        Ok(Self { path, data })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 設定單一偏好並儲存。 / Sets one preference and saves. Invalid values
    /// leave the stored preferences untouched.
    pub fn set(&mut self, key: PreferenceKey, raw: &str) -> Result<(), PreferencesError> {
        let mut next = self.data.clone();
        next.assign(key, raw)?;
        self.overwrite(next)
    }

    /// 取代全部偏好並儲存。 / Replaces all preferences and saves.
    pub fn overwrite(&mut self, preferences: Preferences) -> Result<(), PreferencesError> {
        self.data = validated(preferences, &self.path)?;
        self.save()
    }

    pub fn save(&self) -> Result<(), PreferencesError> {
        write_json(&self.data, &self.path)
    }

    pub fn to_json(&self) -> Result<String, PreferencesError> {
        serialize(&self.data, &self.path)
    }

    /// 匯出目前偏好設定。 / Writes the current preferences to `path`.
    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), PreferencesError> {
        write_json(&self.data, path.as_ref())
    }

    /// 匯入偏好設定，原檔備份為 `.bak`。 / Imports preferences from
    /// `source`, keeping the replaced file as `.bak`.
    pub fn import_from(&mut self, source: impl AsRef<Path>) -> Result<(), PreferencesError> {
        let data = read_preferences(source.as_ref())?;
        self.backup_existing()?;
        self.data = data;
        self.save()
    }

    fn backup_existing(&self) -> Result<(), PreferencesError> {
        if self.path.exists() {
            let backup = self.path.with_extension("bak");
            fs::copy(&self.path, &backup)
                .map_err(|source| PreferencesError::Write { path: backup, source })?;
        }
        Ok(())
    }
}

fn read_preferences(path: &Path) -> Result<Preferences, PreferencesError> {
    let contents = fs::read_to_string(path).map_err(|source| PreferencesError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let data = serde_json::from_str(&contents).map_err(|source| PreferencesError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validated(data, path)
}

fn validated(mut data: Preferences, path: &Path) -> Result<Preferences, PreferencesError> {
    data.sanitize();
    data.theme().map_err(|source| PreferencesError::Palette {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(data)
}

fn serialize(data: &Preferences, path: &Path) -> Result<String, PreferencesError> {
    serde_json::to_string_pretty(data).map_err(|source| PreferencesError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json(data: &Preferences, path: &Path) -> Result<(), PreferencesError> {
    let payload = serialize(data, path)?;
    write_atomic(path, payload.as_bytes()).map_err(|source| PreferencesError::Write {
        path: path.to_path_buf(),
        source,
    })
}
