//! Reconciliation engine.
//!
//! One shared engine decides, per sync cycle and per external record,
//! whether the record is new, refreshed, or a completion event for a
//! recurring series, and emits the corresponding registry and store
//! writes. Provider differences are confined to a small per-system
//! completion-detection strategy instead of per-adapter copies of the
//! whole block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::{FetchRequest, SourceAdapter, SyncMode};
use crate::error::CoreError;
use crate::projects::ProjectRegistry;
use crate::record::{System, TaskRecord};
use crate::recurring::{
    add_completion_to_history, calculate_next_due, create_completion_record, due_date_end_of_day,
    update_recurring_task,
};
use crate::registry::IdRegistry;
use crate::store::RecordStore;

/// How a provider signals that a recurring item was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionDetection {
    /// The provider marks the item closed/done; the engine must reopen it
    /// after rolling the series forward.
    StateClose,
    /// The provider auto-advances the due date and leaves the item open;
    /// a changed due date is the completion signal, and no reopen call is
    /// needed.
    DueDateAdvance,
}

impl CompletionDetection {
    pub fn for_system(system: System) -> CompletionDetection {
        match system {
            System::Github | System::Forgejo => CompletionDetection::StateClose,
            System::Todoist => CompletionDetection::DueDateAdvance,
        }
    }
}

/// Per-sync counters, also reported through the project registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub new: usize,
    pub updated: usize,
    /// Records skipped because their reconciliation failed. The rest of
    /// the batch continues.
    pub failed: usize,
    pub completions: usize,
}

impl SyncStats {
    pub fn synced(&self) -> usize {
        self.new + self.updated
    }
}

/// Result of one sync invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub mode: SyncMode,
    pub stats: SyncStats,
    pub timestamp: DateTime<Utc>,
}

enum RecordDisposition {
    New,
    Updated { completed: bool },
}

pub struct SyncEngine<'a> {
    store: &'a RecordStore,
    registry: &'a IdRegistry,
    projects: &'a ProjectRegistry,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        store: &'a RecordStore,
        registry: &'a IdRegistry,
        projects: &'a ProjectRegistry,
    ) -> Self {
        Self {
            store,
            registry,
            projects,
        }
    }

    /// Fetch records through `adapter` and reconcile each against the
    /// store, in provider-return order.
    pub fn sync(
        &self,
        adapter: &dyn SourceAdapter,
        request: &FetchRequest,
    ) -> Result<SyncOutcome, CoreError> {
        self.sync_at(adapter, request, Utc::now())
    }

    /// [`SyncEngine::sync`] with an explicit clock, for deterministic
    /// due-date advancement in tests.
    pub fn sync_at(
        &self,
        adapter: &dyn SourceAdapter,
        request: &FetchRequest,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, CoreError> {
        let records = adapter.fetch(request)?;

        let mut stats = SyncStats::default();
        for record in records {
            match self.reconcile_record(adapter, record, now) {
                Ok(RecordDisposition::New) => stats.new += 1,
                Ok(RecordDisposition::Updated { completed }) => {
                    stats.updated += 1;
                    if completed {
                        stats.completions += 1;
                    }
                }
                Err(err) => {
                    // one bad record never aborts the batch
                    stats.failed += 1;
                    tracing::warn!(
                        system = %adapter.system(),
                        error = %err,
                        "skipping record that failed reconciliation"
                    );
                }
            }
        }

        // pure notification; a side-channel failure never fails the sync
        if let Err(err) = self.projects.update_sync_metadata(
            adapter.system(),
            request.mode.sync_mode(),
            stats.synced(),
            Some(stats),
            &request.target,
        ) {
            tracing::warn!(error = %err, "failed to update project sync metadata");
        }

        Ok(SyncOutcome {
            mode: request.mode.sync_mode(),
            stats,
            timestamp: now,
        })
    }

    fn reconcile_record(
        &self,
        adapter: &dyn SourceAdapter,
        mut normalized: TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<RecordDisposition, CoreError> {
        let key = RecordStore::storage_key(normalized.system, &normalized.system_data);
        let existing = self.store.load(&key)?;
        let is_new = existing.is_none();

        let mut completed = false;
        if let Some(prev) = existing.as_ref().filter(|prev| prev.is_recurring()) {
            // Carry the stored series metadata onto the fresh snapshot. The
            // stored completion history is authoritative: an adapter that
            // derives `recurring` itself still cannot know prior entries.
            if let Some(prev_recurring) = prev.recurring.clone() {
                match normalized.recurring.as_mut() {
                    None => normalized.recurring = Some(prev_recurring),
                    Some(recurring) => {
                        if recurring.next_due.is_none() {
                            recurring.next_due = prev_recurring.next_due;
                        }
                        recurring.completions.extend(prev_recurring.completions);
                        recurring
                            .completions
                            .sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
                        recurring.completions.dedup_by_key(|c| c.completion_id);
                    }
                }
            }
            completed = match CompletionDetection::for_system(normalized.system) {
                CompletionDetection::StateClose => {
                    self.detect_state_close(adapter, prev, &mut normalized, now)?
                }
                CompletionDetection::DueDateAdvance => {
                    self.detect_due_date_advance(prev, &mut normalized, now)?
                }
            };
        }

        let id = if is_new {
            self.registry.assign_id(&key)?
        } else {
            match self.registry.lookup_id(&key)? {
                Some(id) => id,
                // on disk but missing from the registry: repair
                None => self.registry.assign_id(&key)?,
            }
        };
        normalized.id = Some(id);
        self.store.save(&key, &normalized)?;

        Ok(if is_new {
            RecordDisposition::New
        } else {
            RecordDisposition::Updated { completed }
        })
    }

    /// A closed/done transition on a recurring series: snapshot a
    /// completion record, roll the canonical record to the next
    /// occurrence, and ask the provider to reopen the item.
    fn detect_state_close(
        &self,
        adapter: &dyn SourceAdapter,
        prev: &TaskRecord,
        normalized: &mut TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        if prev.completed_at.is_some() {
            return Ok(false);
        }
        let Some(completed_at) = normalized.completed_at else {
            return Ok(false);
        };

        // Validate the pattern before minting an id or writing anything:
        // a record that fails reconciliation must leave no partial state.
        let (pattern, interval) = match normalized.recurring.as_ref() {
            Some(recurring) => (recurring.pattern.clone(), recurring.interval),
            None => return Err(CoreError::NotRecurring),
        };
        let next_due = calculate_next_due(&pattern, interval, Some(now))?;

        let completion =
            create_completion_record(self.store, self.registry, prev, Some(completed_at))?;
        if let Some(completion_id) = completion.id {
            add_completion_to_history(normalized, completion_id, completed_at);
        }
        update_recurring_task(normalized, &next_due.to_rfc3339(), None)?;

        if let Err(err) = adapter.reopen(&normalized.system_data) {
            tracing::warn!(
                system = %adapter.system(),
                error = %err,
                "failed to reopen recurring item at provider"
            );
        }
        Ok(true)
    }

    /// A due-date change on a recurring series whose provider advances the
    /// date itself: the old due date (end of day) stands in for the
    /// completion timestamp, and the provider needs no reopen call.
    fn detect_due_date_advance(
        &self,
        prev: &TaskRecord,
        normalized: &mut TaskRecord,
        now: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        if prev.due_date == normalized.due_date {
            return Ok(false);
        }
        let Some(old_due) = prev.due_date.as_deref() else {
            return Ok(false);
        };

        let completed_at = due_date_end_of_day(old_due).unwrap_or(now);
        let completion =
            create_completion_record(self.store, self.registry, prev, Some(completed_at))?;
        if let Some(completion_id) = completion.id {
            add_completion_to_history(normalized, completion_id, completed_at);
        }
        let next_due = normalized.due_date.clone();
        if let Some(recurring) = normalized.recurring.as_mut() {
            recurring.next_due = next_due;
        }
        Ok(true)
    }
}
