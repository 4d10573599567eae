//! Normalized record model.
//!
//! One [`TaskRecord`] represents a single task or issue from exactly one
//! external system at one point in time. The JSON shape (camelCase keys,
//! `completedAt` absent until completed) is the on-disk wire format shared
//! with the provider adapters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External source system. Also selects the storage-key form and the
/// completion-detection strategy used during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum System {
    Github,
    Forgejo,
    Todoist,
}

impl System {
    pub fn as_str(self) -> &'static str {
        match self {
            System::Github => "github",
            System::Forgejo => "forgejo",
            System::Todoist => "todoist",
        }
    }

    pub fn parse(value: &str) -> Option<System> {
        match value {
            "github" => Some(System::Github),
            "forgejo" => Some(System::Forgejo),
            "todoist" => Some(System::Todoist),
            _ => None,
        }
    }

    pub fn all() -> &'static [System] {
        &[System::Github, System::Forgejo, System::Todoist]
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the record came from an issue tracker or a personal task manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Issue,
    Task,
}

/// System-level open/closed state, as the provider reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
}

/// Workflow-level status, derived from `status:*` labels where the
/// provider has them.
///
/// `Closed` is the adapters' fallback for closed issues that carry no
/// status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Open,
    Backlog,
    InProgress,
    Waiting,
    Done,
    Canceled,
    Closed,
}

/// Normalized priority. Absence of a priority is `Option::None` on the
/// record, not a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Per-system identifying payload. Together with [`System`] this is the
/// natural key used to recognize the same external item across snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemData {
    /// Issue trackers: the repository plus issue number identify the item.
    Issue {
        repo: String,
        number: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<ItemState>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state_reason: Option<String>,
    },
    /// Personal task managers: an opaque external task id identifies
    /// the item.
    ExternalTask {
        task_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_completed: Option<bool>,
    },
}

impl SystemData {
    /// Natural-key equality: both payloads carry `repo`+`number` and those
    /// are equal, or both carry `task_id` and those are equal. Auxiliary
    /// fields never participate; heterogeneous shapes never match.
    pub fn same_item(&self, other: &SystemData) -> bool {
        match (self, other) {
            (
                SystemData::Issue {
                    repo: a_repo,
                    number: a_number,
                    ..
                },
                SystemData::Issue {
                    repo: b_repo,
                    number: b_number,
                    ..
                },
            ) => a_repo == b_repo && a_number == b_number,
            (
                SystemData::ExternalTask { task_id: a, .. },
                SystemData::ExternalTask { task_id: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

/// Recurrence metadata, attached only to the canonical (still-open,
/// reusable) record of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurring {
    /// Raw pattern string from provider data: `daily`, `weekly`,
    /// `monthly` or `yearly`. Validated where arithmetic needs it, so one
    /// bad pattern cannot poison record deserialization.
    pub pattern: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_due: Option<String>,
    #[serde(default)]
    pub completions: Vec<CompletionEntry>,
}

fn default_interval() -> u32 {
    1
}

impl Default for Recurring {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            interval: 1,
            next_due: None,
            completions: Vec::new(),
        }
    }
}

/// One entry in a canonical record's completion history, referencing the
/// immutable completion record by unified id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEntry {
    pub completed_at: DateTime<Utc>,
    pub completion_id: u64,
}

/// A normalized task/issue snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Unified id, assigned once by the registry and stable across
    /// re-syncs. `None` only between normalization and assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub system: System,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub state: ItemState,
    pub status: Status,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Present only once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Providers emit both bare dates (`2025-11-08`) and full timestamps,
    /// so this stays an opaque value; parse where arithmetic needs it.
    #[serde(default)]
    pub due_date: Option<String>,
    pub system_data: SystemData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurring>,
}

impl TaskRecord {
    pub fn is_recurring(&self) -> bool {
        self.recurring.is_some()
    }
}
