use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uplstudio_settings::{KeyValueStore, WorkspacePreferences};

use crate::content::stored_content_ids;

/// Storage key holding the JSON-encoded file order.
pub const FILES_KEY: &str = "upl-files";
/// Storage key holding the active file identifier.
pub const ACTIVE_FILE_KEY: &str = "upl-active-file";

/// Identifier of a file inside the workspace.
/// 工作區內檔案的識別名稱。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// 建立識別名稱。 / Wraps a file name.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 檔名字串。 / The file name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FileId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Rejected workspace mutation. State is left untouched whenever one is
/// returned.
/// 被拒絕的工作區操作；回傳時狀態保持不變。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionViolation {
    #[error("cannot delete '{0}': it is the last file in the workspace")]
    LastFile(FileId),
    #[error("file '{0}' is not part of the workspace")]
    UnknownFile(FileId),
    #[error("new order is not a permutation of the current files (expected {expected} entries, got {found})")]
    NotAPermutation { expected: usize, found: usize },
}

/// "Drag ended" notification from a sortable file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragEnd {
    pub dragged: FileId,
    pub over: Option<FileId>,
}

impl DragEnd {
    /// `over` 為 `None` 表示放在清單外。 / `over` is `None` for a drop
    /// outside the list.
    pub fn new(dragged: impl Into<FileId>, over: Option<FileId>) -> Self {
        Self {
            dragged: dragged.into(),
            over,
        }
    }
}

/// Ordered file list plus the active selection.
///
/// `order` is never empty and `active` is always one of its entries. Every
/// mutation writes the affected keys through to the store; write failures are
/// logged and the in-memory state stays authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceState {
    order: Vec<FileId>,
    active: FileId,
}

impl WorkspaceState {
    /// 由儲存還原工作區。 / Restores the workspace from `store`, seeding it
    /// with `prefs.default_file` when nothing usable is stored.
    pub fn initialize(store: &mut dyn KeyValueStore, prefs: &WorkspacePreferences) -> Self {
        let order = load_order(store).unwrap_or_else(|| vec![seed_file(prefs)]);
        let active = match store.read(ACTIVE_FILE_KEY) {
            Ok(Some(saved)) if order.iter().any(|id| id.as_str() == saved) => FileId::new(saved),
            Ok(_) => order[0].clone(),
            Err(err) => {
                warn!(key = ACTIVE_FILE_KEY, error = %err, "could not read active file");
                order[0].clone()
            }
        };

        let state = Self { order, active };
        debug!(files = state.order.len(), active = %state.active, "workspace initialized");
        state.persist_order(store);
        state.persist_active(store);
        state
    }

    /// Builds a workspace from explicit parts without touching storage.
    /// Returns `None` when the parts would break the workspace invariants.
    pub fn from_parts(order: Vec<FileId>, active: FileId) -> Option<Self> {
        if order.is_empty() || !order.contains(&active) || has_duplicates(&order) {
            return None;
        }
        Some(Self { order, active })
    }

    /// 依顯示順序的檔案。 / Files in display order.
    pub fn files(&self) -> &[FileId] {
        &self.order
    }

    /// 目前編輯中的檔案。 / The file being edited.
    pub fn active(&self) -> &FileId {
        &self.active
    }

    /// 檔案是否屬於工作區。 / Whether `id` is part of the workspace.
    pub fn contains(&self, id: &FileId) -> bool {
        self.order.contains(id)
    }

    /// 檔案數量（至少為一）。 / Number of files, never zero.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Always `false`; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 新增檔案並設為目前檔案。 / Appends a freshly named file and makes it
    /// active.
    ///
    /// The name is `file<N>.upl`, starting at `N = len + 1` and counting up
    /// past names already in the workspace or still holding stored content.
    pub fn add_file(&mut self, store: &mut dyn KeyValueStore) -> FileId {
        let id = self.next_file_id(store);
        self.order.push(id.clone());
        self.active = id.clone();
        debug!(file = %id, "file added");
        self.persist_order(store);
        self.persist_active(store);
        id
    }

    /// 移除檔案。 / Removes `id` from the order; the first remaining file
    /// becomes active if `id` was. The file's stored content is left in place.
    pub fn delete_file(
        &mut self,
        store: &mut dyn KeyValueStore,
        id: &FileId,
    ) -> Result<(), PreconditionViolation> {
        if self.order.len() == 1 {
            return Err(PreconditionViolation::LastFile(id.clone()));
        }
        let index = self.index_of(id)?;
        self.order.remove(index);
        debug!(file = %id, "file deleted");
        self.persist_order(store);

        if self.active == *id {
            self.active = self.order[0].clone();
            self.persist_active(store);
        }
        Ok(())
    }

    /// 選取檔案；重複選取無影響。 / Makes `id` the active file. Idempotent.
    pub fn select_file(
        &mut self,
        store: &mut dyn KeyValueStore,
        id: &FileId,
    ) -> Result<(), PreconditionViolation> {
        self.index_of(id)?;
        self.active = id.clone();
        self.persist_active(store);
        Ok(())
    }

    /// 重新排序。 / Replaces the order with `new_order`, which must be a
    /// permutation of it. The active file is unchanged.
    pub fn reorder(
        &mut self,
        store: &mut dyn KeyValueStore,
        new_order: Vec<FileId>,
    ) -> Result<(), PreconditionViolation> {
        if !is_permutation(&self.order, &new_order) {
            return Err(PreconditionViolation::NotAPermutation {
                expected: self.order.len(),
                found: new_order.len(),
            });
        }
        self.order = new_order;
        debug!(order = ?self.order, "files reordered");
        self.persist_order(store);
        Ok(())
    }

    /// 套用拖放結果。 / Moves the dragged file to the drop target's position.
    /// Drops outside any target, or onto the dragged file itself, change
    /// nothing.
    pub fn apply_drag(
        &mut self,
        store: &mut dyn KeyValueStore,
        drag: &DragEnd,
    ) -> Result<(), PreconditionViolation> {
        let Some(over) = &drag.over else {
            return Ok(());
        };
        if *over == drag.dragged {
            return Ok(());
        }
        let from = self.index_of(&drag.dragged)?;
        let to = self.index_of(over)?;
        let new_order = move_item(&self.order, from, to);
        self.reorder(store, new_order)
    }

    fn index_of(&self, id: &FileId) -> Result<usize, PreconditionViolation> {
        self.order
            .iter()
            .position(|candidate| candidate == id)
            .ok_or_else(|| PreconditionViolation::UnknownFile(id.clone()))
    }

    fn next_file_id(&self, store: &dyn KeyValueStore) -> FileId {
        let stored = stored_content_ids(store).unwrap_or_else(|err| {
            warn!(error = %err, "could not list stored content; naming from the file list only");
            Vec::new()
        });
        let mut number = self.order.len() + 1;
        loop {
            let candidate = FileId::new(format!("file{number}.upl"));
            if !self.order.contains(&candidate) && stored.binary_search(&candidate).is_err() {
                return candidate;
            }
            number += 1;
        }
    }

    fn persist_order(&self, store: &mut dyn KeyValueStore) {
        let payload = match serde_json::to_string(&self.order) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "could not encode file order");
                return;
            }
        };
        if let Err(err) = store.write(FILES_KEY, &payload) {
            warn!(key = FILES_KEY, error = %err, "file order not persisted");
        }
    }

    fn persist_active(&self, store: &mut dyn KeyValueStore) {
        if let Err(err) = store.write(ACTIVE_FILE_KEY, self.active.as_str()) {
            warn!(key = ACTIVE_FILE_KEY, error = %err, "active file not persisted");
        }
    }
}

/// Returns `items` with the element at `from` moved to index `to`.
pub fn move_item<T: Clone>(items: &[T], from: usize, to: usize) -> Vec<T> {
    let mut moved = items.to_vec();
    if from >= moved.len() || to >= moved.len() {
        return moved;
    }
    let item = moved.remove(from);
    moved.insert(to, item);
    moved
}

fn load_order(store: &dyn KeyValueStore) -> Option<Vec<FileId>> {
    let raw = match store.read(FILES_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(key = FILES_KEY, error = %err, "could not read file order");
            return None;
        }
    };
    let stored: Vec<String> = match serde_json::from_str(&raw) {
        Ok(stored) => stored,
        Err(err) => {
            warn!(key = FILES_KEY, error = %err, "ignoring malformed file order");
            return None;
        }
    };

    let mut seen = HashSet::new();
    let order: Vec<FileId> = stored
        .into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .map(FileId::from)
        .collect();
    (!order.is_empty()).then_some(order)
}

fn seed_file(prefs: &WorkspacePreferences) -> FileId {
    match prefs.default_file.trim() {
        "" => FileId::new(WorkspacePreferences::default().default_file),
        name => FileId::new(name),
    }
}

fn has_duplicates(order: &[FileId]) -> bool {
    let mut seen = HashSet::new();
    !order.iter().all(|id| seen.insert(id))
}

fn is_permutation(current: &[FileId], candidate: &[FileId]) -> bool {
    if current.len() != candidate.len() || has_duplicates(candidate) {
        return false;
    }
    let current: HashSet<&FileId> = current.iter().collect();
    candidate.iter().all(|id| current.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplstudio_settings::MemoryStore;

    fn ids(values: &[&str]) -> Vec<FileId> {
        values.iter().map(|value| FileId::from(*value)).collect()
    }

    fn workspace(order: &[&str], active: &str) -> WorkspaceState {
        WorkspaceState::from_parts(ids(order), FileId::from(active)).unwrap()
    }

    fn stored_order(store: &MemoryStore) -> Vec<String> {
        serde_json::from_str(store.get(FILES_KEY).unwrap()).unwrap()
    }

    #[test]
    fn initialize_seeds_default_file() {
        let mut store = MemoryStore::new();
        let state = WorkspaceState::initialize(&mut store, &WorkspacePreferences::default());
        assert_eq!(state.files(), ids(&["main.upl"]).as_slice());
        assert_eq!(state.active().as_str(), "main.upl");
        assert_eq!(stored_order(&store), vec!["main.upl"]);
        assert_eq!(store.get(ACTIVE_FILE_KEY), Some("main.upl"));
    }

    #[test]
    fn initialize_restores_stored_state() {
        let mut store = MemoryStore::with_entries([
            (FILES_KEY, r#"["a.upl","b.upl"]"#),
            (ACTIVE_FILE_KEY, "b.upl"),
        ]);
        let state = WorkspaceState::initialize(&mut store, &WorkspacePreferences::default());
        assert_eq!(state.files(), ids(&["a.upl", "b.upl"]).as_slice());
        assert_eq!(state.active().as_str(), "b.upl");
    }

    #[test]
    fn initialize_repairs_inconsistent_storage() {
        let mut store = MemoryStore::with_entries([
            (FILES_KEY, r#"["a.upl","","a.upl","c.upl"]"#),
            (ACTIVE_FILE_KEY, "gone.upl"),
        ]);
        let state = WorkspaceState::initialize(&mut store, &WorkspacePreferences::default());
        assert_eq!(state.files(), ids(&["a.upl", "c.upl"]).as_slice());
        assert_eq!(state.active().as_str(), "a.upl");
        assert_eq!(stored_order(&store), vec!["a.upl", "c.upl"]);
        assert_eq!(store.get(ACTIVE_FILE_KEY), Some("a.upl"));
    }

    #[test]
    fn initialize_ignores_malformed_or_empty_order() {
        for raw in ["not json", "[]", r#"{"files":1}"#] {
            let mut store = MemoryStore::with_entries([(FILES_KEY, raw)]);
            let state = WorkspaceState::initialize(&mut store, &WorkspacePreferences::default());
            assert_eq!(state.files(), ids(&["main.upl"]).as_slice(), "input {raw}");
        }
    }

    #[test]
    fn blank_default_file_falls_back_to_main() {
        let mut store = MemoryStore::new();
        let prefs = WorkspacePreferences {
            default_file: "   ".to_string(),
            ..WorkspacePreferences::default()
        };
        let state = WorkspaceState::initialize(&mut store, &prefs);
        assert_eq!(state.files(), ids(&["main.upl"]).as_slice());
    }

    #[test]
    fn add_file_appends_and_activates() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["main.upl"], "main.upl");
        let added = state.add_file(&mut store);
        assert_eq!(added.as_str(), "file2.upl");
        assert_eq!(state.files(), ids(&["main.upl", "file2.upl"]).as_slice());
        assert_eq!(state.active(), &added);
        assert_eq!(stored_order(&store), vec!["main.upl", "file2.upl"]);
        assert_eq!(store.get(ACTIVE_FILE_KEY), Some("file2.upl"));
    }

    #[test]
    fn add_file_skips_names_already_taken() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["file3.upl", "file2.upl"], "file2.upl");
        let added = state.add_file(&mut store);
        assert_eq!(added.as_str(), "file4.upl");
    }

    #[test]
    fn add_file_skips_names_with_leftover_content() {
        let mut store = MemoryStore::with_entries([
            ("upl-file-file2.upl", "deleted earlier"),
            ("upl-file-main.upl", "kept"),
        ]);
        let mut state = workspace(&["main.upl"], "main.upl");
        let added = state.add_file(&mut store);
        assert_eq!(added.as_str(), "file3.upl");
    }

    #[test]
    fn delete_active_file_selects_first_remaining() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["a", "b", "c"], "b");
        state.delete_file(&mut store, &FileId::from("b")).unwrap();
        assert_eq!(state.files(), ids(&["a", "c"]).as_slice());
        assert_eq!(state.active().as_str(), "a");
        assert_eq!(store.get(ACTIVE_FILE_KEY), Some("a"));
    }

    #[test]
    fn delete_inactive_file_keeps_selection() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["a", "b", "c"], "c");
        state.delete_file(&mut store, &FileId::from("a")).unwrap();
        assert_eq!(state.files(), ids(&["b", "c"]).as_slice());
        assert_eq!(state.active().as_str(), "c");
        assert_eq!(store.get(ACTIVE_FILE_KEY), None);
    }

    #[test]
    fn delete_last_file_is_rejected() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["a"], "a");
        let before = state.clone();
        assert_eq!(
            state.delete_file(&mut store, &FileId::from("a")),
            Err(PreconditionViolation::LastFile(FileId::from("a")))
        );
        assert_eq!(state, before);
        assert!(store.is_empty());
    }

    #[test]
    fn delete_unknown_file_is_rejected() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["a", "b"], "a");
        assert_eq!(
            state.delete_file(&mut store, &FileId::from("zzz")),
            Err(PreconditionViolation::UnknownFile(FileId::from("zzz")))
        );
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn select_is_idempotent_and_checks_membership() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["a", "b"], "a");
        state.select_file(&mut store, &FileId::from("b")).unwrap();
        let once = state.clone();
        state.select_file(&mut store, &FileId::from("b")).unwrap();
        assert_eq!(state, once);
        assert_eq!(store.get(ACTIVE_FILE_KEY), Some("b"));

        assert!(state.select_file(&mut store, &FileId::from("x")).is_err());
        assert_eq!(state.active().as_str(), "b");
    }

    #[test]
    fn reorder_applies_permutation_only() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["a", "b", "c"], "b");
        state.reorder(&mut store, ids(&["b", "c", "a"])).unwrap();
        assert_eq!(state.files(), ids(&["b", "c", "a"]).as_slice());
        assert_eq!(state.active().as_str(), "b");
        assert_eq!(stored_order(&store), vec!["b", "c", "a"]);

        for bad in [
            ids(&["a", "b"]),
            ids(&["a", "a", "b"]),
            ids(&["a", "b", "d"]),
            ids(&["a", "b", "c", "d"]),
        ] {
            assert!(matches!(
                state.reorder(&mut store, bad),
                Err(PreconditionViolation::NotAPermutation { expected: 3, .. })
            ));
            assert_eq!(state.files(), ids(&["b", "c", "a"]).as_slice());
        }
    }

    #[test]
    fn drag_moves_item_to_target_position() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["a", "b", "c", "d"], "a");

        state
            .apply_drag(&mut store, &DragEnd::new("a", Some(FileId::from("c"))))
            .unwrap();
        assert_eq!(state.files(), ids(&["b", "c", "a", "d"]).as_slice());

        state
            .apply_drag(&mut store, &DragEnd::new("d", Some(FileId::from("b"))))
            .unwrap();
        assert_eq!(state.files(), ids(&["d", "b", "c", "a"]).as_slice());
        assert_eq!(state.active().as_str(), "a");
    }

    #[test]
    fn drag_without_target_changes_nothing() {
        let mut store = MemoryStore::new();
        let mut state = workspace(&["a", "b"], "a");
        state.apply_drag(&mut store, &DragEnd::new("a", None)).unwrap();
        state
            .apply_drag(&mut store, &DragEnd::new("a", Some(FileId::from("a"))))
            .unwrap();
        assert_eq!(state.files(), ids(&["a", "b"]).as_slice());
        assert!(store.is_empty());

        assert_eq!(
            state.apply_drag(&mut store, &DragEnd::new("a", Some(FileId::from("q")))),
            Err(PreconditionViolation::UnknownFile(FileId::from("q")))
        );
    }

    #[test]
    fn unavailable_storage_keeps_state_in_memory() {
        let mut store = MemoryStore::new();
        store.set_available(false);
        let mut state = WorkspaceState::initialize(&mut store, &WorkspacePreferences::default());
        let added = state.add_file(&mut store);
        state.select_file(&mut store, &FileId::from("main.upl")).unwrap();
        state.delete_file(&mut store, &added).unwrap();
        assert_eq!(state.files(), ids(&["main.upl"]).as_slice());

        store.set_available(true);
        assert!(store.is_empty());
    }

    #[test]
    fn from_parts_rejects_broken_invariants() {
        assert!(WorkspaceState::from_parts(Vec::new(), FileId::from("a")).is_none());
        assert!(WorkspaceState::from_parts(ids(&["a"]), FileId::from("b")).is_none());
        assert!(WorkspaceState::from_parts(ids(&["a", "a"]), FileId::from("a")).is_none());
    }

    #[test]
    fn move_item_matches_array_move() {
        assert_eq!(move_item(&[1, 2, 3, 4], 0, 2), vec![2, 3, 1, 4]);
        assert_eq!(move_item(&[1, 2, 3, 4], 3, 0), vec![4, 1, 2, 3]);
        assert_eq!(move_item(&[1, 2, 3], 1, 1), vec![1, 2, 3]);
        assert_eq!(move_item(&[1, 2, 3], 5, 0), vec![1, 2, 3]);
    }
}
