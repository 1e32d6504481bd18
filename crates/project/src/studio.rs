use uplstudio_settings::{KeyValueStore, WorkspacePreferences};

use crate::content::FileContentStore;
use crate::workspace::{DragEnd, FileId, PreconditionViolation, WorkspaceState};

/// A workspace and its file contents bound to one store.
/// 將工作區與檔案內容綁定到同一個儲存。
#[derive(Debug)]
pub struct Studio<S: KeyValueStore> {
    store: S,
    workspace: WorkspaceState,
    contents: FileContentStore,
}

impl<S: KeyValueStore> Studio<S> {
    /// 開啟工作區。 / Restores (or seeds) the workspace held in `store`.
    pub fn open(mut store: S, prefs: &WorkspacePreferences) -> Self {
        let workspace = WorkspaceState::initialize(&mut store, prefs);
        Self {
            store,
            workspace,
            contents: FileContentStore::new(prefs.placeholder.clone()),
        }
    }

    /// 工作區狀態。 / The file list and selection.
    pub fn workspace(&self) -> &WorkspaceState {
        &self.workspace
    }

    /// 依顯示順序的檔案。 / Files in display order.
    pub fn files(&self) -> &[FileId] {
        self.workspace.files()
    }

    /// 目前編輯中的檔案。 / The file being edited.
    pub fn active(&self) -> &FileId {
        self.workspace.active()
    }

    /// 底層儲存。 / The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// 關閉並取回儲存。 / Closes the studio and hands back its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// 新增檔案。 / Adds a file, makes it active and returns its id.
    pub fn add_file(&mut self) -> FileId {
        self.workspace.add_file(&mut self.store)
    }

    /// 刪除檔案；已儲存的內容保留。 / Removes a file from the workspace. Its
    /// stored content stays behind as an orphan.
    pub fn delete_file(&mut self, id: &FileId) -> Result<(), PreconditionViolation> {
        self.workspace.delete_file(&mut self.store, id)?;
        self.contents.evict(id);
        Ok(())
    }

    /// 選取檔案。 / Makes `id` the active file.
    pub fn select_file(&mut self, id: &FileId) -> Result<(), PreconditionViolation> {
        self.workspace.select_file(&mut self.store, id)
    }

    /// 重新排序。 / Applies an explicit permutation of the file list.
    pub fn reorder(&mut self, new_order: Vec<FileId>) -> Result<(), PreconditionViolation> {
        self.workspace.reorder(&mut self.store, new_order)
    }

    /// 套用拖放結果。 / Applies a drag-end notification.
    pub fn apply_drag(&mut self, drag: &DragEnd) -> Result<(), PreconditionViolation> {
        self.workspace.apply_drag(&mut self.store, drag)
    }

    /// 取得檔案內容。 / Text of `id`, or the placeholder if nothing is stored.
    pub fn content(&mut self, id: &FileId) -> &str {
        self.contents.content(&self.store, id)
    }

    /// 目前檔案的內容。 / Text of the active file.
    pub fn active_content(&mut self) -> &str {
        let active = self.workspace.active().clone();
        self.contents.content(&self.store, &active)
    }

    /// 寫入檔案內容。 / Replaces the text of `id` and persists it.
    pub fn set_content(&mut self, id: &FileId, text: impl Into<String>) {
        self.contents.set_content(&mut self.store, id, text);
    }

    /// 孤立內容。 / Stored content of files no longer in the workspace.
    pub fn orphans(&self) -> Vec<FileId> {
        self.contents.orphans(&self.store, &self.workspace)
    }

    /// 刪除孤立內容。 / Removes orphaned content and returns the ids.
    pub fn prune_orphans(&mut self) -> Vec<FileId> {
        self.contents.prune_orphans(&mut self.store, &self.workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplstudio_settings::MemoryStore;

    #[test]
    fn reopening_restores_files_selection_and_content() {
        let prefs = WorkspacePreferences::default();
        let mut studio = Studio::open(MemoryStore::new(), &prefs);
        let second = studio.add_file();
        studio.set_content(&second, "print(\"hi\")");
        studio.select_file(&FileId::from("main.upl")).unwrap();

        let mut reopened = Studio::open(studio.into_store(), &prefs);
        assert_eq!(
            reopened.files(),
            &[FileId::from("main.upl"), FileId::from("file2.upl")]
        );
        assert_eq!(reopened.active().as_str(), "main.upl");
        assert_eq!(reopened.active_content(), "// Write your UPL code here");
        assert_eq!(reopened.content(&second), "print(\"hi\")");
    }

    #[test]
    fn readded_file_starts_from_placeholder() {
        let prefs = WorkspacePreferences::default();
        let mut studio = Studio::open(MemoryStore::new(), &prefs);
        let first = studio.add_file();
        studio.set_content(&first, "secret");
        studio.delete_file(&first).unwrap();

        let second = studio.add_file();
        assert_ne!(second, first);
        assert_eq!(studio.content(&second), "// Write your UPL code here");
        assert_eq!(studio.store().get("upl-file-file2.upl"), Some("secret"));
    }

    #[test]
    fn unsaved_edit_of_deleted_file_is_not_inherited() {
        let prefs = WorkspacePreferences::default();
        let mut store = MemoryStore::new();
        store.set_available(false);
        let mut studio = Studio::open(store, &prefs);
        let first = studio.add_file();
        studio.set_content(&first, "unsaved");
        studio.delete_file(&first).unwrap();

        let second = studio.add_file();
        assert_eq!(second, first);
        assert_eq!(studio.content(&second), "// Write your UPL code here");
    }

    #[test]
    fn deleted_file_content_stays_until_pruned() {
        let prefs = WorkspacePreferences::default();
        let mut studio = Studio::open(MemoryStore::new(), &prefs);
        let extra = studio.add_file();
        studio.set_content(&extra, "let a = 1;");
        studio.delete_file(&extra).unwrap();

        assert_eq!(studio.store().get("upl-file-file2.upl"), Some("let a = 1;"));
        assert_eq!(studio.orphans(), vec![extra.clone()]);
        assert_eq!(studio.prune_orphans(), vec![extra]);
        assert!(studio.orphans().is_empty());
    }
}
