//! Per-record JSON store.
//!
//! One file per known external item under the items directory. The
//! filename doubles as the natural-key encoding (the "storage key"):
//!
//! ```text
//! github-evcraddock_todu-11.json                      issue systems
//! todoist-6c4gPG4FgV6W82Gp.json                       personal-task systems
//! github-test_repo-1-completion-20251108143000.json   completion records
//! ```
//!
//! Writes are whole-record overwrites through a `.tmp` sibling and an
//! atomic rename; there are no partial updates.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::StorageConfig;
use crate::error::CoreError;
use crate::record::{System, SystemData, TaskRecord};

/// Components decoded from an issue-style storage key. Personal-task keys
/// carry an opaque id and do not decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub system: System,
    pub repo: String,
    pub number: u64,
}

pub struct RecordStore {
    items_dir: PathBuf,
}

impl RecordStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            items_dir: config.items_dir(),
        }
    }

    pub fn items_dir(&self) -> &Path {
        &self.items_dir
    }

    /// Canonical storage key for a record's natural key.
    pub fn storage_key(system: System, data: &SystemData) -> String {
        match data {
            SystemData::Issue { repo, number, .. } => {
                format!("{system}-{}-{number}.json", repo.replace('/', "_"))
            }
            SystemData::ExternalTask { task_id, .. } => format!("{system}-{task_id}.json"),
        }
    }

    /// Storage key for a completion record. The timestamp component keeps
    /// repeated completions of the same series from colliding.
    pub fn completion_key(
        system: System,
        data: &SystemData,
        completed_at: DateTime<Utc>,
    ) -> String {
        let encoded = match data {
            SystemData::Issue { repo, number, .. } => {
                format!("{}-{number}", repo.replace('/', "_"))
            }
            SystemData::ExternalTask { task_id, .. } => task_id.clone(),
        };
        let timestamp = completed_at.format("%Y%m%d%H%M%S");
        format!("{system}-{encoded}-completion-{timestamp}.json")
    }

    /// Decode an issue-style storage key back into (system, repo, number).
    pub fn parse_key(filename: &str) -> Option<ParsedKey> {
        let name = filename.strip_suffix(".json")?;
        let (prefix, number_str) = name.rsplit_once('-')?;
        let (system_str, repo_encoded) = prefix.split_once('-')?;
        let system = System::parse(system_str)?;
        let number = number_str.parse().ok()?;
        Some(ParsedKey {
            system,
            repo: repo_encoded.replace('_', "/"),
            number,
        })
    }

    pub fn record_path(&self, key: &str) -> PathBuf {
        self.items_dir.join(key)
    }

    /// Load the record stored under `key`. Absent file reads as `None`;
    /// corrupt JSON on a direct load is a hard error.
    pub fn load(&self, key: &str) -> Result<Option<TaskRecord>, CoreError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Whole-record overwrite of whatever is stored under `key`.
    pub fn save(&self, key: &str, record: &TaskRecord) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.items_dir)?;
        let path = self.record_path(key);
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// All records for one system, as (storage key, record) pairs.
    pub fn scan_system(&self, system: System) -> Result<Vec<(String, TaskRecord)>, CoreError> {
        self.scan(Some(system))
    }

    /// Every record in the store.
    pub fn scan_all(&self) -> Result<Vec<(String, TaskRecord)>, CoreError> {
        self.scan(None)
    }

    fn scan(&self, system: Option<System>) -> Result<Vec<(String, TaskRecord)>, CoreError> {
        let mut records = Vec::new();
        if !self.items_dir.exists() {
            return Ok(records);
        }
        let prefix = system.map(|s| format!("{s}-"));
        for entry in std::fs::read_dir(&self.items_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".json") {
                continue;
            }
            if let Some(prefix) = &prefix
                && !name.starts_with(prefix.as_str())
            {
                continue;
            }
            // Scans tolerate individual unreadable or foreign files.
            let Ok(contents) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<TaskRecord>(&contents) else {
                continue;
            };
            records.push((name.to_string(), record));
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }
}
