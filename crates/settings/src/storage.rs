use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use base64::Engine;
use thiserror::Error;

const ENTRY_EXTENSION: &str = "txt";

/// 鍵值儲存的錯誤。 / Errors raised by a key-value store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable for key '{key}': {source}")]
    Unavailable {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

impl StorageError {
    fn unavailable(key: &str, source: io::Error) -> Self {
        StorageError::Unavailable {
            key: key.to_string(),
            source,
        }
    }
}

/// 以字串為鍵值的持久化儲存介面。 / Durable string-to-string storage.
///
/// Every call is synchronous. Callers decide whether a failure is fatal.
pub trait KeyValueStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Returns whether an entry existed.
    fn remove(&mut self, key: &str) -> Result<bool, StorageError>;

    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).write(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }
}

/// 記憶體內的儲存，主要供測試使用。 / In-process store, mainly for tests.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    available: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            available: true,
        }
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            available: true,
        }
    }

    /// Simulates a medium that rejects every read and write.
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check(&self, key: &str) -> Result<(), StorageError> {
        if self.available {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                key,
                io::Error::new(ErrorKind::Other, "memory store disabled"),
            ))
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check(key)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        self.check(key)?;
        Ok(self.entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.check("*")?;
        Ok(self.entries.keys().cloned().collect())
    }
}

/// 以資料夾儲存每個鍵的檔案。 / Stores one file per key under a directory.
///
/// File names are the URL-safe base64 of the key, so any key string is
/// accepted.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let name = format!("{}.{ENTRY_EXTENSION}", BASE64.encode(key.as_bytes()));
        Ok(self.root.join(name))
    }
}

impl KeyValueStore for DirectoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::unavailable(key, err)),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key)?;
        write_atomic(&path, value.as_bytes()).map_err(|err| StorageError::unavailable(key, err))
    }

    fn remove(&mut self, key: &str) -> Result<bool, StorageError> {
        let path = self.entry_path(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::unavailable(key, err)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::unavailable("*", err)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::unavailable("*", err))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            // Foreign files in the directory are skipped rather than rejected.
            if let Some(key) = decode_key(stem) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = BASE64.decode(encoded.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}

pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn directory_store_persists_entries() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("storage");

        {
            let mut store = DirectoryStore::new(&root);
            assert_eq!(store.read("upl-files").unwrap(), None);
            store.write("upl-files", r#"["main.upl"]"#).unwrap();
            store.write("upl-file-main.upl", "print(1)\n").unwrap();
            store.write("upl-file-a/b c.upl", "odd name").unwrap();
        }

        let mut store = DirectoryStore::new(&root);
        assert_eq!(
            store.read("upl-files").unwrap().as_deref(),
            Some(r#"["main.upl"]"#)
        );
        assert_eq!(
            store.read("upl-file-a/b c.upl").unwrap().as_deref(),
            Some("odd name")
        );
        assert_eq!(
            store.keys().unwrap(),
            vec!["upl-file-a/b c.upl", "upl-file-main.upl", "upl-files"]
        );

        assert!(store.remove("upl-file-main.upl").unwrap());
        assert!(!store.remove("upl-file-main.upl").unwrap());
        assert_eq!(store.read("upl-file-main.upl").unwrap(), None);
    }

    #[test]
    fn directory_store_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.md"), "hello").unwrap();
        fs::write(dir.path().join("!!!.txt"), "not base64").unwrap();

        let mut store = DirectoryStore::new(dir.path());
        store.write("upl-active-file", "main.upl").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["upl-active-file"]);
    }

    #[test]
    fn directory_store_rejects_empty_key() {
        let dir = tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path());
        assert!(matches!(
            store.write("", "value"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn missing_directory_has_no_keys() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("absent"));
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn memory_store_can_be_made_unavailable() {
        let mut store = MemoryStore::with_entries([("k", "v")]);
        store.set_available(false);
        assert!(matches!(
            store.read("k"),
            Err(StorageError::Unavailable { key, .. }) if key == "k"
        ));
        assert!(store.write("k", "w").is_err());

        store.set_available(true);
        assert_eq!(store.read("k").unwrap().as_deref(), Some("v"));
    }
}
