//! Persistence port and user preferences for UPL Studio.
//! UPL Studio 的儲存介面與使用者偏好設定。

pub mod preferences;
pub mod storage;

pub use preferences::{
    EditorPreferences, PreferenceKey, Preferences, PreferencesError, PreferencesStore,
    UiPreferences, WorkspacePreferences,
};
pub use storage::{DirectoryStore, KeyValueStore, MemoryStore, StorageError};
