//! Durable metadata cache keyed by package identity.
//!
//! The cache maps (mod name, package file name) to the metadata record
//! extracted for that file, persisted as a single JSON document inside the
//! profile directory. Reads, modifications, and writes of the backing file
//! are not atomic in isolation, so every operation holds one store-wide
//! lock; the document itself is rewritten atomically (temp file + rename)
//! on every update.
//!
//! Failure policy follows availability over correctness: an unreadable or
//! corrupt backing document behaves like an empty cache, and only write
//! failures surface to the caller (who logs and carries on).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::meta::PakRecord;

/// Errors surfaced by cache mutations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing document could not be written.
    #[error("failed to write cache {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// The updated document could not be serialized.
    #[error("failed to serialize cache document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Cached records for one mod: a map from package file name to record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModCacheEntry {
    #[serde(rename = "Files")]
    pub files: BTreeMap<String, PakRecord>,
}

/// The whole persisted document: mod name to its file records.
pub type CacheDocument = BTreeMap<String, ModCacheEntry>;

/// Durable, lock-serialized metadata cache store.
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CacheStore {
    /// Create a store backed by the document at `path`.
    ///
    /// The file is created lazily on the first `put`; a missing file is an
    /// empty cache.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the record cached for one package file.
    pub fn get(&self, mod_name: &str, file_name: &str) -> Option<PakRecord> {
        let _guard = self.lock.lock();
        self.load_unlocked()
            .get(mod_name)
            .and_then(|entry| entry.files.get(file_name))
            .cloned()
    }

    /// Insert or replace the record for one package file.
    pub fn put(&self, mod_name: &str, file_name: &str, record: PakRecord) -> Result<(), CacheError> {
        let _guard = self.lock.lock();
        let mut document = self.load_unlocked();
        document
            .entry(mod_name.to_string())
            .or_default()
            .files
            .insert(file_name.to_string(), record);
        self.save_unlocked(&document)
    }

    /// Restore the cache invariants against the current install state.
    ///
    /// Removes every mod key absent from `installed`, then every file key
    /// not present in that mod's current package file set, then every mod
    /// left with zero files. A no-op when nothing changed.
    pub fn prune_stale(
        &self,
        installed: &BTreeSet<String>,
        files_by_mod: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<(), CacheError> {
        let _guard = self.lock.lock();
        let mut document = self.load_unlocked();
        let before: usize = document.values().map(|entry| entry.files.len()).sum();

        document.retain(|mod_name, _| installed.contains(mod_name));
        for (mod_name, entry) in document.iter_mut() {
            match files_by_mod.get(mod_name) {
                Some(current) => entry.files.retain(|file_name, _| current.contains(file_name)),
                None => entry.files.clear(),
            }
        }
        document.retain(|_, entry| !entry.files.is_empty());

        let after: usize = document.values().map(|entry| entry.files.len()).sum();
        if after == before {
            return Ok(());
        }

        debug!(removed = before - after, "pruned stale cache entries");
        self.save_unlocked(&document)
    }

    /// A point-in-time copy of the whole document.
    pub fn snapshot(&self) -> CacheDocument {
        let _guard = self.lock.lock();
        self.load_unlocked()
    }

    /// Read the backing document, degrading to an empty cache when the
    /// file is missing, unreadable, or not valid JSON.
    fn load_unlocked(&self) -> CacheDocument {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return CacheDocument::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e,
                    "cache unreadable, proceeding with empty cache");
                return CacheDocument::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e,
                    "cache document corrupt, proceeding with empty cache");
                CacheDocument::new()
            }
        }
    }

    /// Rewrite the whole backing document atomically.
    fn save_unlocked(&self, document: &CacheDocument) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(document)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &bytes).map_err(|e| CacheError::Write {
            path: temp_path.clone(),
            source: e,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| CacheError::Write {
            path: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Attribute;
    use tempfile::TempDir;

    fn record_with_folder(folder: &str) -> PakRecord {
        let mut record = PakRecord::empty();
        record
            .attributes
            .insert("Folder".to_string(), Attribute::new(folder, "LSString"));
        record
    }

    fn store_in(temp: &TempDir) -> CacheStore {
        CacheStore::new(temp.path().join("modsCache.json"))
    }

    #[test]
    fn test_get_missing_file_is_empty_cache() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        assert!(store.get("MyMod", "mod.pak").is_none());
    }

    #[test]
    fn test_put_then_get() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        store
            .put("MyMod", "mod.pak", record_with_folder("MyMod"))
            .unwrap();

        let record = store.get("MyMod", "mod.pak").unwrap();
        assert_eq!(record.attributes["Folder"].value, "MyMod");
    }

    #[test]
    fn test_put_persists_document_format() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        store.put("MyMod", "mod.pak", PakRecord::empty()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json["MyMod"]["Files"]["mod.pak"].is_object());
    }

    #[test]
    fn test_corrupt_document_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        fs::write(store.path(), b"{ not json").unwrap();

        assert!(store.get("MyMod", "mod.pak").is_none());

        // A put after corruption starts fresh rather than failing.
        store.put("MyMod", "mod.pak", PakRecord::empty()).unwrap();
        assert!(store.get("MyMod", "mod.pak").is_some());
    }

    #[test]
    fn test_prune_removes_uninstalled_mods() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.put("Kept", "a.pak", PakRecord::empty()).unwrap();
        store.put("Removed", "b.pak", PakRecord::empty()).unwrap();

        let installed = BTreeSet::from(["Kept".to_string()]);
        let files_by_mod = BTreeMap::from([(
            "Kept".to_string(),
            BTreeSet::from(["a.pak".to_string()]),
        )]);
        store.prune_stale(&installed, &files_by_mod).unwrap();

        assert!(store.get("Kept", "a.pak").is_some());
        assert!(store.get("Removed", "b.pak").is_none());
    }

    #[test]
    fn test_prune_removes_vanished_files() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.put("MyMod", "kept.pak", PakRecord::empty()).unwrap();
        store.put("MyMod", "gone.pak", PakRecord::empty()).unwrap();

        let installed = BTreeSet::from(["MyMod".to_string()]);
        let files_by_mod = BTreeMap::from([(
            "MyMod".to_string(),
            BTreeSet::from(["kept.pak".to_string()]),
        )]);
        store.prune_stale(&installed, &files_by_mod).unwrap();

        assert!(store.get("MyMod", "kept.pak").is_some());
        assert!(store.get("MyMod", "gone.pak").is_none());
    }

    #[test]
    fn test_prune_drops_mod_with_no_files_left() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.put("MyMod", "only.pak", PakRecord::empty()).unwrap();

        let installed = BTreeSet::from(["MyMod".to_string()]);
        let files_by_mod = BTreeMap::from([("MyMod".to_string(), BTreeSet::new())]);
        store.prune_stale(&installed, &files_by_mod).unwrap();

        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_prune_noop_leaves_document_untouched() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store.put("MyMod", "a.pak", PakRecord::empty()).unwrap();
        let before = fs::read(store.path()).unwrap();

        let installed = BTreeSet::from(["MyMod".to_string()]);
        let files_by_mod = BTreeMap::from([(
            "MyMod".to_string(),
            BTreeSet::from(["a.pak".to_string()]),
        )]);
        store.prune_stale(&installed, &files_by_mod).unwrap();

        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_concurrent_puts_do_not_drop_records() {
        use std::sync::Arc;

        let temp = TempDir::new().unwrap();
        let store = Arc::new(store_in(&temp));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .put("MyMod", &format!("file{i}.pak"), PakRecord::empty())
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot["MyMod"].files.len(), 8);
    }
}
