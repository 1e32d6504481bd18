//! Multi-file workspace state for UPL Studio: file order, active selection
//! and per-file content, persisted through a [`uplstudio_settings::KeyValueStore`].
//! 管理 UPL Studio 多檔案工作區（順序、選取與內容）的核心模組。

pub mod content;
pub mod studio;
pub mod workspace;

pub use content::{content_key, FileContentStore, CONTENT_KEY_PREFIX};
pub use studio::Studio;
pub use workspace::{
    move_item, DragEnd, FileId, PreconditionViolation, WorkspaceState, ACTIVE_FILE_KEY, FILES_KEY,
};
