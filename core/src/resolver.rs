//! Identifier resolution.
//!
//! Turns whatever the user typed into a stored record. Three grammars are
//! tried in order:
//!
//! 1. all digits: a unified id, looked up in the registry
//! 2. `<system> [#]<number>`: a per-system item number
//! 3. anything else: case-insensitive substring search over titles and
//!    descriptions
//!
//! Ambiguity is data, not an error: a search that matches several records
//! resolves to [`Resolution::Ambiguous`] with the candidates, and the
//! caller decides how to present them.

use serde::Serialize;

use crate::error::CoreError;
use crate::record::{ItemState, System, SystemData, TaskRecord};
use crate::registry::IdRegistry;
use crate::store::RecordStore;

/// A resolved record, flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unified_id: Option<u64>,
    pub system: System,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub title: String,
    pub state: ItemState,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ResolvedTask {
    pub fn from_record(filename: &str, record: &TaskRecord) -> Self {
        let (repo, number, task_id) = match &record.system_data {
            SystemData::Issue { repo, number, .. } => (Some(repo.clone()), Some(*number), None),
            SystemData::ExternalTask { task_id, .. } => (None, None, Some(task_id.clone())),
        };
        Self {
            unified_id: record.id,
            system: record.system,
            repo,
            number,
            task_id,
            title: record.title.clone(),
            state: record.state,
            url: record.url.clone(),
            filename: Some(filename.to_string()),
        }
    }
}

/// Outcome of resolving one identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "resolution")]
pub enum Resolution {
    Match(ResolvedTask),
    Ambiguous { candidates: Vec<ResolvedTask> },
    NotFound,
}

pub struct Resolver<'a> {
    registry: &'a IdRegistry,
    store: &'a RecordStore,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a IdRegistry, store: &'a RecordStore) -> Self {
        Self { registry, store }
    }

    pub fn resolve(&self, identifier: &str) -> Result<Resolution, CoreError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(Resolution::NotFound);
        }

        if identifier.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(id) = identifier.parse::<u64>() {
                return self.resolve_unified_id(id);
            }
        }

        if let Some((system, number)) = parse_system_number(identifier) {
            return self.resolve_system_number(system, number);
        }

        self.search(identifier)
    }

    /// The record registered under a unified id, loaded from the store.
    pub fn task_details(&self, id: u64) -> Result<Option<TaskRecord>, CoreError> {
        let Some(filename) = self.registry.lookup_filename(id)? else {
            return Ok(None);
        };
        self.store.load(&filename)
    }

    fn resolve_unified_id(&self, id: u64) -> Result<Resolution, CoreError> {
        let Some(filename) = self.registry.lookup_filename(id)? else {
            return Ok(Resolution::NotFound);
        };
        // A registered id whose file vanished resolves to nothing rather
        // than an error; the next sync repairs the registry.
        let Some(record) = self.store.load(&filename)? else {
            return Ok(Resolution::NotFound);
        };
        Ok(Resolution::Match(ResolvedTask::from_record(
            &filename, &record,
        )))
    }

    fn resolve_system_number(&self, system: System, number: u64) -> Result<Resolution, CoreError> {
        for (filename, record) in self.store.scan_system(system)? {
            let Some(parsed) = RecordStore::parse_key(&filename) else {
                continue;
            };
            if parsed.number == number {
                return Ok(Resolution::Match(ResolvedTask::from_record(
                    &filename, &record,
                )));
            }
        }
        Ok(Resolution::NotFound)
    }

    fn search(&self, query: &str) -> Result<Resolution, CoreError> {
        let needle = query.to_lowercase();
        let mut candidates = Vec::new();
        for (filename, record) in self.store.scan_all()? {
            if record.title.to_lowercase().contains(&needle)
                || record.description.to_lowercase().contains(&needle)
            {
                candidates.push(ResolvedTask::from_record(&filename, &record));
            }
        }
        Ok(match candidates.len() {
            0 => Resolution::NotFound,
            1 => match candidates.pop() {
                Some(only) => Resolution::Match(only),
                None => Resolution::NotFound,
            },
            _ => Resolution::Ambiguous { candidates },
        })
    }
}

/// `github 42`, `github #42`, `forgejo#7`.
fn parse_system_number(identifier: &str) -> Option<(System, u64)> {
    let (system_str, rest) = match identifier.split_once(char::is_whitespace) {
        Some((system_str, rest)) => (system_str, rest.trim_start()),
        None => identifier.split_once('#')?,
    };
    let system = System::parse(&system_str.to_lowercase())?;
    let number = rest.trim_start_matches('#').parse().ok()?;
    Some((system, number))
}
