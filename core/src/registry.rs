//! Unified id registry.
//!
//! A single JSON document maps monotonically increasing unified ids to
//! storage keys:
//!
//! ```text
//! {
//!   "next_id": 124,
//!   "index": {
//!     "1": "github-evcraddock_todu-11.json",
//!     "5": "todoist-6c4gPG4FgV6W82Gp.json"
//!   }
//! }
//! ```
//!
//! Every mutation holds an exclusive advisory lock on `<registry>.lock`
//! for the full read-modify-write span, then replaces the document through
//! a temp file + atomic rename. The lock serializes concurrent writers;
//! the rename keeps a crash from ever leaving a half-written file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RegistryDoc {
    next_id: u64,
    #[serde(default)]
    index: BTreeMap<String, String>,
}

impl Default for RegistryDoc {
    fn default() -> Self {
        Self {
            next_id: 1,
            index: BTreeMap::new(),
        }
    }
}

/// Registry counters, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub next_id: u64,
    pub total_entries: usize,
}

/// Held for the duration of one read-modify-write cycle; released on drop.
struct RegistryLock {
    file: File,
}

impl RegistryLock {
    fn acquire(registry_path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = registry_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut lock_path = registry_path.as_os_str().to_owned();
        lock_path.push(".lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(PathBuf::from(lock_path))?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Durable mapping from unified ids to storage keys.
pub struct IdRegistry {
    path: PathBuf,
}

impl IdRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RegistryDoc, CoreError> {
        if !self.path.exists() {
            return Ok(RegistryDoc::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, doc: &RegistryDoc) -> Result<(), CoreError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::with_prefix_in(".id_registry_", parent)?;
        serde_json::to_writer_pretty(&mut tmp, doc)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }

    /// Mint the next unified id for `storage_key` and persist the mapping.
    pub fn assign_id(&self, storage_key: &str) -> Result<u64, CoreError> {
        let _lock = RegistryLock::acquire(&self.path)?;
        let mut doc = self.read()?;
        let id = doc.next_id;
        doc.next_id += 1;
        doc.index.insert(id.to_string(), storage_key.to_string());
        self.write(&doc)?;
        Ok(id)
    }

    /// Storage key for a unified id, if that id was ever issued.
    pub fn lookup_filename(&self, id: u64) -> Result<Option<String>, CoreError> {
        Ok(self.read()?.index.get(&id.to_string()).cloned())
    }

    /// Reverse scan: unified id currently mapped to `storage_key`.
    pub fn lookup_id(&self, storage_key: &str) -> Result<Option<u64>, CoreError> {
        let doc = self.read()?;
        for (id, key) in &doc.index {
            if key == storage_key {
                let id = id
                    .parse::<u64>()
                    .map_err(|_| CoreError::CorruptRegistry(format!("non-integer index key {id:?}")))?;
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Re-point an existing unified id at a new storage key.
    pub fn update_filename(&self, id: u64, new_key: &str) -> Result<(), CoreError> {
        let _lock = RegistryLock::acquire(&self.path)?;
        let mut doc = self.read()?;
        let entry = doc
            .index
            .get_mut(&id.to_string())
            .ok_or(CoreError::IdNotFound(id))?;
        *entry = new_key.to_string();
        self.write(&doc)
    }

    /// Drop a unified id from the index. No-op when the id is absent.
    pub fn remove_id(&self, id: u64) -> Result<(), CoreError> {
        let _lock = RegistryLock::acquire(&self.path)?;
        let mut doc = self.read()?;
        if doc.index.remove(&id.to_string()).is_some() {
            self.write(&doc)?;
        }
        Ok(())
    }

    /// Reset to `{next_id: 1, index: {}}`. Destructive; only for full
    /// cache resets.
    pub fn clear(&self) -> Result<(), CoreError> {
        let _lock = RegistryLock::acquire(&self.path)?;
        self.write(&RegistryDoc::default())
    }

    pub fn stats(&self) -> Result<RegistryStats, CoreError> {
        let doc = self.read()?;
        Ok(RegistryStats {
            next_id: doc.next_id,
            total_entries: doc.index.len(),
        })
    }
}
