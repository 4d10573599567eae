//! Recurring-series primitives.
//!
//! Detection, completion-record creation, roll-forward of the canonical
//! record, and completion-history queries. The reconciliation engine in
//! [`crate::reconcile`] drives these per sync cycle.

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, Utc};

use crate::error::CoreError;
use crate::record::{
    CompletionEntry, ItemState, Recurring, Status, System, SystemData, TaskRecord,
};
use crate::registry::IdRegistry;
use crate::store::RecordStore;

/// Next occurrence for a recurrence pattern.
///
/// `daily`/`weekly` add fixed spans; `monthly`/`yearly` use calendar
/// arithmetic, so Jan 31 + 1 month is Feb 28, not 30 days later.
/// `from` defaults to the current time.
pub fn calculate_next_due(
    pattern: &str,
    interval: u32,
    from: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, CoreError> {
    let from = from.unwrap_or_else(Utc::now);
    match pattern {
        "daily" => Ok(from + Duration::days(i64::from(interval))),
        "weekly" => Ok(from + Duration::weeks(i64::from(interval))),
        "monthly" => from
            .checked_add_months(Months::new(interval))
            .ok_or(CoreError::DateOutOfRange),
        "yearly" => from
            .checked_add_months(Months::new(interval.saturating_mul(12)))
            .ok_or(CoreError::DateOutOfRange),
        other => Err(CoreError::InvalidPattern(other.to_string())),
    }
}

/// Parse a provider due-date value: RFC 3339, bare `YYYY-MM-DD`, or a
/// naive datetime. Naive inputs are treated as UTC.
pub fn parse_due_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(ndt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    None
}

/// End of day (23:59:59 UTC) for a due-date value. Used when a provider
/// auto-advances the due date on completion and the old due date stands
/// in for the completion timestamp.
pub fn due_date_end_of_day(value: &str) -> Option<DateTime<Utc>> {
    parse_due_date(value)?
        .date_naive()
        .and_hms_opt(23, 59, 59)
        .map(|ndt| ndt.and_utc())
}

/// Create and persist an immutable completion record for a recurring
/// canonical record.
///
/// The completion is a snapshot of the canonical record at completion
/// time with `status=done`, `state=closed`, a verbatim copy of the
/// natural key, and a fresh unified id. Fails with
/// [`CoreError::NotRecurring`] before any write when the input carries no
/// recurring metadata.
pub fn create_completion_record(
    store: &RecordStore,
    registry: &IdRegistry,
    canonical: &TaskRecord,
    completed_at: Option<DateTime<Utc>>,
) -> Result<TaskRecord, CoreError> {
    if !canonical.is_recurring() {
        return Err(CoreError::NotRecurring);
    }
    let completed_at = completed_at.unwrap_or_else(Utc::now);

    let mut completion = TaskRecord {
        id: None,
        system: canonical.system,
        item_type: canonical.item_type,
        title: canonical.title.clone(),
        description: canonical.description.clone(),
        state: ItemState::Closed,
        status: Status::Done,
        url: canonical.url.clone(),
        created_at: canonical.created_at,
        updated_at: Some(Utc::now()),
        completed_at: Some(completed_at),
        labels: canonical.labels.clone(),
        assignees: canonical.assignees.clone(),
        priority: canonical.priority,
        due_date: canonical.due_date.clone(),
        system_data: canonical.system_data.clone(),
        recurring: None,
    };

    let key = RecordStore::completion_key(canonical.system, &canonical.system_data, completed_at);
    let id = registry.assign_id(&key)?;
    completion.id = Some(id);
    store.save(&key, &completion)?;
    Ok(completion)
}

/// Roll the canonical record forward to its next occurrence: due date and
/// `recurring.nextDue` move to `next_due`, the record reopens, and any
/// completion timestamp is cleared.
pub fn update_recurring_task(
    record: &mut TaskRecord,
    next_due: &str,
    pattern: Option<&str>,
) -> Result<(), CoreError> {
    let Some(recurring) = record.recurring.as_mut() else {
        return Err(CoreError::NotRecurring);
    };
    recurring.next_due = Some(next_due.to_string());
    if let Some(pattern) = pattern {
        recurring.pattern = pattern.to_string();
    }
    record.due_date = Some(next_due.to_string());
    record.state = ItemState::Open;
    record.status = Status::Open;
    record.completed_at = None;
    record.updated_at = Some(Utc::now());
    Ok(())
}

/// Append a completion reference to the canonical record's history,
/// keeping the history sorted most-recent-first.
pub fn add_completion_to_history(
    record: &mut TaskRecord,
    completion_id: u64,
    completed_at: DateTime<Utc>,
) {
    let recurring = record.recurring.get_or_insert_with(Recurring::default);
    recurring.completions.push(CompletionEntry {
        completed_at,
        completion_id,
    });
    recurring
        .completions
        .sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
}

/// All completion records for a series, most recent first.
pub fn get_completion_history(
    store: &RecordStore,
    system: System,
    data: &SystemData,
) -> Result<Vec<TaskRecord>, CoreError> {
    let mut completions: Vec<TaskRecord> = store
        .scan_system(system)?
        .into_iter()
        .map(|(_, record)| record)
        .filter(|record| {
            record.system == system
                && record.status == Status::Done
                && record.system_data.same_item(data)
        })
        .collect();
    completions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    Ok(completions)
}

/// The canonical (recurring, not completed) record of a series, if any.
pub fn get_recurring_task(
    store: &RecordStore,
    system: System,
    data: &SystemData,
) -> Result<Option<TaskRecord>, CoreError> {
    for (_, record) in store.scan_system(system)? {
        if record.system == system
            && record.is_recurring()
            && record.status != Status::Done
            && record.system_data.same_item(data)
        {
            return Ok(Some(record));
        }
    }
    Ok(None)
}
