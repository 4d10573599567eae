//! Adapter contract.
//!
//! The per-system HTTP adapters live outside this crate; the core only
//! sees this trait. An adapter fetches provider-native records, runs its
//! own normalization, and hands back [`TaskRecord`]s for reconciliation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::record::{System, SystemData, TaskRecord};

/// Failures inside a provider adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("item not found at provider: {0}")]
    NotFound(String),
}

/// What one sync invocation asks the adapter for.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Repository (`owner/name`) or provider project id.
    pub target: String,
    pub mode: FetchMode,
}

#[derive(Debug, Clone)]
pub enum FetchMode {
    /// Everything the provider will return for the target.
    Full,
    /// Records updated since a timestamp.
    Incremental { since: DateTime<Utc> },
    /// One item by provider-native id or number.
    Single { item: String },
}

impl FetchMode {
    pub fn sync_mode(&self) -> SyncMode {
        match self {
            FetchMode::Full => SyncMode::Full,
            FetchMode::Incremental { .. } => SyncMode::Incremental,
            FetchMode::Single { .. } => SyncMode::Single,
        }
    }
}

/// Sync mode as reported in sync metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Incremental,
    Single,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
            SyncMode::Single => "single",
        }
    }
}

/// One external tracking system, as seen by the reconciliation engine.
pub trait SourceAdapter {
    fn system(&self) -> System;

    /// Fetch and normalize the records selected by `request`.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<TaskRecord>, AdapterError>;

    /// Reopen a completed item at the provider so the canonical record can
    /// represent the next occurrence. Best-effort; the engine logs
    /// failures and moves on.
    fn reopen(&self, data: &SystemData) -> Result<(), AdapterError>;
}
