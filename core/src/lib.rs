//! Unified task aggregation core.
//!
//! Tracks issues and personal tasks from several external systems under
//! one monotonically increasing id space, reconciles fetched records
//! against a one-file-per-item JSON store, detects completions of
//! recurring series, and resolves loose user identifiers back to stored
//! records.
//!
//! Everything is rooted at a [`config::StorageConfig`]; there is no
//! ambient global state, so tests and tools can point the whole stack at
//! a scratch directory.

pub mod adapter;
pub mod config;
pub mod error;
pub mod projects;
pub mod reconcile;
pub mod record;
pub mod recurring;
pub mod registry;
pub mod resolver;
pub mod store;

pub use adapter::{AdapterError, FetchMode, FetchRequest, SourceAdapter, SyncMode};
pub use config::StorageConfig;
pub use error::CoreError;
pub use projects::{ProjectEntry, ProjectRegistry};
pub use reconcile::{CompletionDetection, SyncEngine, SyncOutcome, SyncStats};
pub use record::{
    CompletionEntry, ItemState, ItemType, Priority, Recurring, Status, System, SystemData,
    TaskRecord,
};
pub use registry::{IdRegistry, RegistryStats};
pub use resolver::{ResolvedTask, Resolution, Resolver};
pub use store::{ParsedKey, RecordStore};
