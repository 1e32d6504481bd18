use std::collections::HashMap;

use tracing::warn;
use uplstudio_settings::{KeyValueStore, StorageError};

use crate::workspace::{FileId, WorkspaceState};

/// Prefix of the per-file content keys.
pub const CONTENT_KEY_PREFIX: &str = "upl-file-";

/// 檔案內容的儲存鍵。 / Storage key of a file's content.
pub fn content_key(id: &FileId) -> String {
    format!("{CONTENT_KEY_PREFIX}{}", id.as_str())
}

/// Ids of every file whose content is present in `store`, sorted.
pub(crate) fn stored_content_ids(
    store: &dyn KeyValueStore,
) -> Result<Vec<FileId>, StorageError> {
    let mut ids: Vec<FileId> = store
        .keys()?
        .iter()
        .filter_map(|key| key.strip_prefix(CONTENT_KEY_PREFIX))
        .map(FileId::from)
        .collect();
    ids.sort();
    Ok(ids)
}

/// Per-file text, loaded lazily from the store and written through on change.
#[derive(Debug, Clone)]
pub struct FileContentStore {
    placeholder: String,
    entries: HashMap<FileId, String>,
}

impl FileContentStore {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            entries: HashMap::new(),
        }
    }

    /// 取得內容，必要時使用預設文字。 / Returns the text of `id`.
    ///
    /// Files with nothing stored read as the placeholder; the placeholder is
    /// kept in memory only and never written.
    pub fn content(&mut self, store: &dyn KeyValueStore, id: &FileId) -> &str {
        if !self.entries.contains_key(id) {
            let loaded = match store.read(&content_key(id)) {
                Ok(Some(text)) => text,
                Ok(None) => self.placeholder.clone(),
                Err(err) => {
                    warn!(file = %id, error = %err, "could not read file content");
                    self.placeholder.clone()
                }
            };
            self.entries.insert(id.clone(), loaded);
        }
        self.entries
            .get(id)
            .map(String::as_str)
            .unwrap_or(self.placeholder.as_str())
    }

    /// 更新內容並立即寫入儲存。 / Replaces the text of `id` and writes it
    /// through to `store` at once. A failed write is logged; the edit is kept
    /// in memory.
    pub fn set_content(
        &mut self,
        store: &mut dyn KeyValueStore,
        id: &FileId,
        text: impl Into<String>,
    ) {
        let text = text.into();
        if let Err(err) = store.write(&content_key(id), &text) {
            warn!(file = %id, error = %err, "file content not persisted");
        }
        self.entries.insert(id.clone(), text);
    }

    /// 丟棄快取的內容；儲存不受影響。 / Drops the cached text of `id`,
    /// leaving the store untouched.
    pub fn evict(&mut self, id: &FileId) {
        self.entries.remove(id);
    }

    /// 列出孤立內容。 / Lists files whose content is still stored although
    /// they are no longer part of the workspace.
    pub fn orphans(&self, store: &dyn KeyValueStore, workspace: &WorkspaceState) -> Vec<FileId> {
        match stored_content_ids(store) {
            Ok(ids) => ids.into_iter().filter(|id| !workspace.contains(id)).collect(),
            Err(err) => {
                warn!(error = %err, "could not list stored content");
                Vec::new()
            }
        }
    }

    /// 刪除孤立內容。 / Removes orphaned content from the store and the
    /// cache. Returns the ids that were removed.
    pub fn prune_orphans(
        &mut self,
        store: &mut dyn KeyValueStore,
        workspace: &WorkspaceState,
    ) -> Vec<FileId> {
        let mut removed = Vec::new();
        for id in self.orphans(store, workspace) {
            match store.remove(&content_key(&id)) {
                Ok(_) => {
                    self.entries.remove(&id);
                    removed.push(id);
                }
                Err(err) => warn!(file = %id, error = %err, "orphaned content not removed"),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplstudio_settings::MemoryStore;

    const PLACEHOLDER: &str = "// Write your UPL code here";

    #[test]
    fn missing_content_reads_as_placeholder_without_writing() {
        let store = MemoryStore::new();
        let mut contents = FileContentStore::new(PLACEHOLDER);
        assert_eq!(contents.content(&store, &FileId::from("main.upl")), PLACEHOLDER);
        assert!(store.is_empty());
    }

    #[test]
    fn set_then_get_round_trips_and_persists() {
        let mut store = MemoryStore::new();
        let mut contents = FileContentStore::new(PLACEHOLDER);
        let id = FileId::from("main.upl");
        contents.content(&store, &id);
        contents.set_content(&mut store, &id, "X");
        assert_eq!(contents.content(&store, &id), "X");
        assert_eq!(store.get("upl-file-main.upl"), Some("X"));

        let mut fresh = FileContentStore::new(PLACEHOLDER);
        assert_eq!(fresh.content(&store, &id), "X");
    }

    #[test]
    fn empty_text_is_stored_verbatim() {
        let mut store = MemoryStore::new();
        let mut contents = FileContentStore::new(PLACEHOLDER);
        let id = FileId::from("main.upl");
        contents.set_content(&mut store, &id, "");
        let mut fresh = FileContentStore::new(PLACEHOLDER);
        assert_eq!(fresh.content(&store, &id), "");
    }

    #[test]
    fn unreadable_store_falls_back_to_placeholder_and_keeps_edits() {
        let mut store = MemoryStore::with_entries([("upl-file-a.upl", "saved")]);
        store.set_available(false);
        let mut contents = FileContentStore::new(PLACEHOLDER);
        let id = FileId::from("a.upl");
        assert_eq!(contents.content(&store, &id), PLACEHOLDER);

        contents.set_content(&mut store, &id, "edited");
        assert_eq!(contents.content(&store, &id), "edited");

        store.set_available(true);
        assert_eq!(store.get("upl-file-a.upl"), Some("saved"));
    }

    #[test]
    fn orphans_are_listed_and_pruned_on_request() {
        let mut store = MemoryStore::with_entries([
            ("upl-file-a", "kept"),
            ("upl-file-b", "orphan"),
            ("upl-files", r#"["a"]"#),
        ]);
        let workspace =
            WorkspaceState::from_parts(vec![FileId::from("a")], FileId::from("a")).unwrap();
        let mut contents = FileContentStore::new(PLACEHOLDER);
        assert_eq!(contents.content(&store, &FileId::from("b")), "orphan");

        assert_eq!(contents.orphans(&store, &workspace), vec![FileId::from("b")]);
        assert_eq!(
            contents.prune_orphans(&mut store, &workspace),
            vec![FileId::from("b")]
        );
        assert_eq!(store.get("upl-file-b"), None);
        assert_eq!(store.get("upl-file-a"), Some("kept"));
        assert_eq!(contents.content(&store, &FileId::from("b")), PLACEHOLDER);
    }
}
