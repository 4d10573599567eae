//! Error types shared across the todu core.

use thiserror::Error;

use crate::adapter::AdapterError;

/// Errors surfaced by the registry, record store, reconciliation engine
/// and resolver.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O failure on the registry, a record file, or the projects file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON in a file we own. Never silently swallowed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The id registry contains an index key that is not an integer.
    #[error("corrupt id registry: {0}")]
    CorruptRegistry(String),

    /// A registry operation referenced a unified id that was never issued
    /// or has been removed.
    #[error("unified id {0} not found in registry")]
    IdNotFound(u64),

    /// Completion-record creation was asked for on a record without
    /// recurring metadata. Always a caller bug.
    #[error("record is not recurring")]
    NotRecurring,

    /// Due-date calculation saw a recurrence pattern it does not know.
    #[error("unknown recurrence pattern: {0}")]
    InvalidPattern(String),

    /// Calendar arithmetic produced a date outside the representable range.
    #[error("date arithmetic out of range")]
    DateOutOfRange,

    /// The default storage root could not be determined.
    #[error("could not determine home directory")]
    NoHomeDir,

    /// A provider adapter failed while fetching records.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}
