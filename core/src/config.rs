//! Storage-root configuration.
//!
//! Every component takes a [`StorageConfig`] (or a path derived from one)
//! through its constructor; there is no process-wide default path.

use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Location of the todu on-disk state: the id registry, the per-record
/// store and the project registry all live under one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    home: PathBuf,
}

impl StorageConfig {
    /// Config rooted at an explicit directory. Tests point this at a
    /// temporary directory.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Config rooted at the conventional per-user location,
    /// `~/.local/todu`.
    pub fn from_home_dir() -> Result<Self, CoreError> {
        let home = dirs::home_dir()
            .ok_or(CoreError::NoHomeDir)?
            .join(".local")
            .join("todu");
        Ok(Self { home })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Directory holding one JSON file per known external item.
    pub fn items_dir(&self) -> PathBuf {
        self.home.join("issues")
    }

    /// The unified id registry document.
    pub fn registry_path(&self) -> PathBuf {
        self.home.join("id_registry.json")
    }

    /// The project-nickname registry and sync-metadata side-channel.
    pub fn projects_path(&self) -> PathBuf {
        self.home.join("projects.json")
    }
}
