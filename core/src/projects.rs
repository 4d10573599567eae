//! Project registry and sync-metadata side-channel.
//!
//! `projects.json` maps user-chosen nicknames to `(system, repo)` pairs
//! and carries per-project sync metadata. The reconciliation engine
//! notifies it after each sync; nothing in the core depends on its
//! contents, and an unreadable file degrades to empty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::SyncMode;
use crate::error::CoreError;
use crate::reconcile::SyncStats;
use crate::record::System;

/// One registered project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    pub system: System,
    /// Repository (`owner/name`) for issue systems, provider project id
    /// for personal-task systems.
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<SyncStats>,
}

pub struct ProjectRegistry {
    path: PathBuf,
}

impl ProjectRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All registered projects, keyed by nickname. Missing or unreadable
    /// file reads as empty; this registry is advisory.
    pub fn all(&self) -> BTreeMap<String, ProjectEntry> {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&contents).unwrap_or_default()
    }

    fn write(&self, projects: &BTreeMap<String, ProjectEntry>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(projects)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Register (or replace) a project under `nickname`.
    pub fn add(&self, nickname: &str, entry: ProjectEntry) -> Result<(), CoreError> {
        let mut projects = self.all();
        projects.insert(nickname.to_string(), entry);
        self.write(&projects)
    }

    /// Drop a registered project. Returns whether it existed.
    pub fn remove(&self, nickname: &str) -> Result<bool, CoreError> {
        let mut projects = self.all();
        let existed = projects.remove(nickname).is_some();
        if existed {
            self.write(&projects)?;
        }
        Ok(existed)
    }

    pub fn get(&self, nickname: &str) -> Option<ProjectEntry> {
        self.all().get(nickname).cloned()
    }

    /// Nickname registered for a `(system, repo)` pair.
    pub fn find_by_repo(&self, system: System, repo: &str) -> Option<String> {
        self.all()
            .into_iter()
            .find(|(_, entry)| entry.system == system && entry.repo == repo)
            .map(|(nickname, _)| nickname)
    }

    /// Record the outcome of a sync run against the matching project.
    /// Unregistered projects are skipped silently.
    pub fn update_sync_metadata(
        &self,
        system: System,
        mode: SyncMode,
        task_count: usize,
        stats: Option<SyncStats>,
        repo: &str,
    ) -> Result<(), CoreError> {
        let Some(nickname) = self.find_by_repo(system, repo) else {
            return Ok(());
        };
        let mut projects = self.all();
        if let Some(entry) = projects.get_mut(&nickname) {
            entry.last_sync = Some(Utc::now());
            entry.last_sync_mode = Some(mode.as_str().to_string());
            entry.task_count = Some(task_count);
            if let Some(stats) = stats {
                entry.stats = Some(stats);
            }
        }
        self.write(&projects)
    }
}
