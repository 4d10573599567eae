//! End-to-end reconciliation scenarios against a scratch home directory.

use std::cell::RefCell;

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use todu_core::{
    AdapterError, CompletionEntry, FetchMode, FetchRequest, IdRegistry, ItemState, ItemType,
    ProjectEntry, ProjectRegistry, RecordStore, Recurring, SourceAdapter, Status, StorageConfig,
    SyncEngine, System, SystemData, TaskRecord,
};

struct FakeAdapter {
    system: System,
    records: Vec<TaskRecord>,
    reopened: RefCell<Vec<SystemData>>,
    fail_reopen: bool,
}

impl FakeAdapter {
    fn new(system: System, records: Vec<TaskRecord>) -> Self {
        Self {
            system,
            records,
            reopened: RefCell::new(Vec::new()),
            fail_reopen: false,
        }
    }
}

impl SourceAdapter for FakeAdapter {
    fn system(&self) -> System {
        self.system
    }

    fn fetch(&self, _request: &FetchRequest) -> Result<Vec<TaskRecord>, AdapterError> {
        Ok(self.records.clone())
    }

    fn reopen(&self, data: &SystemData) -> Result<(), AdapterError> {
        self.reopened.borrow_mut().push(data.clone());
        if self.fail_reopen {
            Err(AdapterError::Request("reopen rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

struct Fixture {
    _dir: TempDir,
    store: RecordStore,
    registry: IdRegistry,
    projects: ProjectRegistry,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::new(dir.path());
        Self {
            store: RecordStore::new(&config),
            registry: IdRegistry::new(config.registry_path()),
            projects: ProjectRegistry::new(config.projects_path()),
            _dir: dir,
        }
    }

    fn engine(&self) -> SyncEngine<'_> {
        SyncEngine::new(&self.store, &self.registry, &self.projects)
    }

    /// Store a canonical record and register its id, as a prior sync
    /// would have.
    fn seed(&self, record: &TaskRecord) -> (String, u64) {
        let key = RecordStore::storage_key(record.system, &record.system_data);
        let id = self.registry.assign_id(&key).unwrap();
        let mut stored = record.clone();
        stored.id = Some(id);
        self.store.save(&key, &stored).unwrap();
        (key, id)
    }
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn github_issue(repo: &str, number: u64, title: &str) -> TaskRecord {
    TaskRecord {
        id: None,
        system: System::Github,
        item_type: ItemType::Issue,
        title: title.to_string(),
        description: String::new(),
        state: ItemState::Open,
        status: Status::Open,
        url: format!("https://github.com/{repo}/issues/{number}"),
        created_at: Some(utc(2025, 11, 1, 0, 0, 0)),
        updated_at: Some(utc(2025, 11, 1, 0, 0, 0)),
        completed_at: None,
        labels: Vec::new(),
        assignees: Vec::new(),
        priority: None,
        due_date: None,
        system_data: SystemData::Issue {
            repo: repo.to_string(),
            number,
            state: Some(ItemState::Open),
            state_reason: None,
        },
        recurring: None,
    }
}

fn todoist_task(task_id: &str, title: &str, due: &str) -> TaskRecord {
    TaskRecord {
        id: None,
        system: System::Todoist,
        item_type: ItemType::Task,
        title: title.to_string(),
        description: String::new(),
        state: ItemState::Open,
        status: Status::Open,
        url: format!("https://todoist.com/task/{task_id}"),
        created_at: Some(utc(2025, 11, 1, 0, 0, 0)),
        updated_at: Some(utc(2025, 11, 1, 0, 0, 0)),
        completed_at: None,
        labels: Vec::new(),
        assignees: Vec::new(),
        priority: None,
        due_date: Some(due.to_string()),
        system_data: SystemData::ExternalTask {
            task_id: task_id.to_string(),
            project_id: Some("proj-123".to_string()),
            priority: None,
            due: Some(due.to_string()),
            is_completed: Some(false),
        },
        recurring: None,
    }
}

fn weekly(record: &mut TaskRecord, due: &str) {
    record.due_date = Some(due.to_string());
    record.recurring = Some(Recurring {
        pattern: "weekly".to_string(),
        interval: 1,
        next_due: Some(due.to_string()),
        completions: Vec::new(),
    });
}

fn full_request(target: &str) -> FetchRequest {
    FetchRequest {
        target: target.to_string(),
        mode: FetchMode::Full,
    }
}

#[test]
fn new_records_get_fresh_ids_in_provider_order() {
    let fixture = Fixture::new();
    let adapter = FakeAdapter::new(
        System::Github,
        vec![
            github_issue("a/b", 11, "first"),
            github_issue("a/b", 12, "second"),
        ],
    );

    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("a/b"), utc(2025, 11, 8, 12, 0, 0))
        .unwrap();

    assert_eq!(outcome.stats.new, 2);
    assert_eq!(outcome.stats.updated, 0);
    assert_eq!(outcome.stats.failed, 0);

    let first = fixture.store.load("github-a_b-11.json").unwrap().unwrap();
    let second = fixture.store.load("github-a_b-12.json").unwrap().unwrap();
    assert_eq!(first.id, Some(1));
    assert_eq!(second.id, Some(2));
    assert_eq!(
        fixture.registry.lookup_filename(1).unwrap().as_deref(),
        Some("github-a_b-11.json")
    );
}

#[test]
fn resync_reuses_the_existing_id() {
    let fixture = Fixture::new();
    let (_, id) = fixture.seed(&github_issue("a/b", 11, "first"));

    let mut refreshed = github_issue("a/b", 11, "first, retitled");
    refreshed.updated_at = Some(utc(2025, 11, 8, 9, 0, 0));
    let adapter = FakeAdapter::new(System::Github, vec![refreshed]);

    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("a/b"), utc(2025, 11, 8, 12, 0, 0))
        .unwrap();

    assert_eq!(outcome.stats.updated, 1);
    assert_eq!(outcome.stats.new, 0);
    let stored = fixture.store.load("github-a_b-11.json").unwrap().unwrap();
    assert_eq!(stored.id, Some(id));
    assert_eq!(stored.title, "first, retitled");
}

#[test]
fn record_on_disk_but_missing_from_registry_is_repaired() {
    let fixture = Fixture::new();
    // record written without ever touching the registry
    let orphan = github_issue("a/b", 11, "orphan");
    fixture.store.save("github-a_b-11.json", &orphan).unwrap();

    let adapter = FakeAdapter::new(System::Github, vec![github_issue("a/b", 11, "orphan")]);
    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("a/b"), utc(2025, 11, 8, 12, 0, 0))
        .unwrap();

    assert_eq!(outcome.stats.updated, 1);
    let stored = fixture.store.load("github-a_b-11.json").unwrap().unwrap();
    assert_eq!(stored.id, Some(1));
    assert_eq!(
        fixture.registry.lookup_id("github-a_b-11.json").unwrap(),
        Some(1)
    );
}

#[test]
fn closed_recurring_issue_rolls_forward_and_reopens() {
    let fixture = Fixture::new();
    let mut canonical = github_issue("a/b", 11, "Weekly review");
    weekly(&mut canonical, "2025-11-08");
    let (key, id) = fixture.seed(&canonical);

    // provider reports the issue closed, without series metadata
    let completed_at = utc(2025, 11, 8, 14, 30, 0);
    let mut fetched = github_issue("a/b", 11, "Weekly review");
    fetched.state = ItemState::Closed;
    fetched.status = Status::Done;
    fetched.completed_at = Some(completed_at);

    let adapter = FakeAdapter::new(System::Github, vec![fetched]);
    let now = utc(2025, 11, 8, 15, 0, 0);
    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("a/b"), now)
        .unwrap();

    assert_eq!(outcome.stats.updated, 1);
    assert_eq!(outcome.stats.completions, 1);

    // an immutable completion snapshot under a fresh id
    let completion_key = "github-a_b-11-completion-20251108143000.json";
    let completion = fixture.store.load(completion_key).unwrap().unwrap();
    assert_eq!(completion.id, Some(id + 1));
    assert_eq!(completion.status, Status::Done);
    assert_eq!(completion.state, ItemState::Closed);
    assert_eq!(completion.completed_at, Some(completed_at));
    assert!(completion.recurring.is_none());

    // the canonical record reopened on the next occurrence
    let stored = fixture.store.load(&key).unwrap().unwrap();
    assert_eq!(stored.id, Some(id));
    assert_eq!(stored.state, ItemState::Open);
    assert_eq!(stored.status, Status::Open);
    assert_eq!(stored.completed_at, None);
    let next_due = utc(2025, 11, 15, 15, 0, 0).to_rfc3339();
    assert_eq!(stored.due_date.as_deref(), Some(next_due.as_str()));
    let recurring = stored.recurring.as_ref().unwrap();
    assert_eq!(recurring.next_due.as_deref(), Some(next_due.as_str()));
    assert_eq!(recurring.completions.len(), 1);
    assert_eq!(recurring.completions[0].completion_id, id + 1);

    // and the provider was asked to reopen it
    let reopened = adapter.reopened.borrow();
    assert_eq!(reopened.len(), 1);
    assert!(reopened[0].same_item(&canonical.system_data));
}

#[test]
fn reopen_failure_is_tolerated() {
    let fixture = Fixture::new();
    let mut canonical = github_issue("a/b", 11, "Weekly review");
    weekly(&mut canonical, "2025-11-08");
    let (key, _) = fixture.seed(&canonical);

    let mut fetched = github_issue("a/b", 11, "Weekly review");
    fetched.state = ItemState::Closed;
    fetched.status = Status::Done;
    fetched.completed_at = Some(utc(2025, 11, 8, 14, 30, 0));

    let mut adapter = FakeAdapter::new(System::Github, vec![fetched]);
    adapter.fail_reopen = true;

    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("a/b"), utc(2025, 11, 8, 15, 0, 0))
        .unwrap();

    // the local roll-forward still happened
    assert_eq!(outcome.stats.completions, 1);
    assert_eq!(outcome.stats.failed, 0);
    let stored = fixture.store.load(&key).unwrap().unwrap();
    assert_eq!(stored.state, ItemState::Open);
}

#[test]
fn advanced_due_date_is_a_completion_without_reopen() {
    let fixture = Fixture::new();
    let mut canonical = todoist_task("6c4gPG4FgV6W82Gp", "Water the plants", "2025-11-08");
    canonical.recurring = Some(Recurring {
        pattern: "daily".to_string(),
        interval: 1,
        next_due: Some("2025-11-08".to_string()),
        completions: Vec::new(),
    });
    let (key, id) = fixture.seed(&canonical);

    // the provider advanced the due date itself and left the task open
    let fetched = todoist_task("6c4gPG4FgV6W82Gp", "Water the plants", "2025-11-09");
    let adapter = FakeAdapter::new(System::Todoist, vec![fetched]);

    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("proj-123"), utc(2025, 11, 9, 8, 0, 0))
        .unwrap();

    assert_eq!(outcome.stats.completions, 1);
    assert!(adapter.reopened.borrow().is_empty());

    // completion stamped at end of the old due date
    let completion_key = "todoist-6c4gPG4FgV6W82Gp-completion-20251108235959.json";
    let completion = fixture.store.load(completion_key).unwrap().unwrap();
    assert_eq!(completion.completed_at, Some(utc(2025, 11, 8, 23, 59, 59)));
    assert_eq!(completion.due_date.as_deref(), Some("2025-11-08"));

    let stored = fixture.store.load(&key).unwrap().unwrap();
    assert_eq!(stored.id, Some(id));
    assert_eq!(stored.due_date.as_deref(), Some("2025-11-09"));
    let recurring = stored.recurring.as_ref().unwrap();
    assert_eq!(recurring.next_due.as_deref(), Some("2025-11-09"));
    assert_eq!(recurring.completions.len(), 1);
}

#[test]
fn unchanged_due_date_is_not_a_completion() {
    let fixture = Fixture::new();
    let mut canonical = todoist_task("6c4gPG4FgV6W82Gp", "Water the plants", "2025-11-08");
    canonical.recurring = Some(Recurring {
        pattern: "daily".to_string(),
        interval: 1,
        next_due: Some("2025-11-08".to_string()),
        completions: Vec::new(),
    });
    fixture.seed(&canonical);

    let fetched = todoist_task("6c4gPG4FgV6W82Gp", "Water the plants", "2025-11-08");
    let adapter = FakeAdapter::new(System::Todoist, vec![fetched]);

    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("proj-123"), utc(2025, 11, 8, 8, 0, 0))
        .unwrap();

    assert_eq!(outcome.stats.updated, 1);
    assert_eq!(outcome.stats.completions, 0);
    assert!(fixture
        .store
        .load("todoist-6c4gPG4FgV6W82Gp-completion-20251108235959.json")
        .unwrap()
        .is_none());
}

#[test]
fn one_bad_record_does_not_abort_the_batch() {
    let fixture = Fixture::new();
    // recurring series with a pattern the roll-forward cannot handle
    let mut broken = github_issue("a/b", 11, "Broken series");
    weekly(&mut broken, "2025-11-08");
    broken.recurring.as_mut().unwrap().pattern = "fortnightly".to_string();
    fixture.seed(&broken);

    let mut closed = github_issue("a/b", 11, "Broken series");
    closed.state = ItemState::Closed;
    closed.status = Status::Done;
    closed.completed_at = Some(utc(2025, 11, 8, 14, 30, 0));

    let adapter = FakeAdapter::new(
        System::Github,
        vec![
            github_issue("a/b", 10, "fine before"),
            closed,
            github_issue("a/b", 12, "fine after"),
        ],
    );

    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("a/b"), utc(2025, 11, 8, 15, 0, 0))
        .unwrap();

    assert_eq!(outcome.stats.new, 2);
    assert_eq!(outcome.stats.failed, 1);
    assert_eq!(outcome.stats.completions, 0);
    assert!(fixture.store.load("github-a_b-10.json").unwrap().is_some());
    assert!(fixture.store.load("github-a_b-12.json").unwrap().is_some());

    // the failed record left nothing behind: no completion file, and only
    // the seed plus the two new records in the registry
    assert!(fixture
        .store
        .load("github-a_b-11-completion-20251108143000.json")
        .unwrap()
        .is_none());
    let stats = fixture.registry.stats().unwrap();
    assert_eq!(stats.next_id, 4);
    assert_eq!(stats.total_entries, 3);
}

#[test]
fn failed_roll_forward_leaves_no_partial_state() {
    let fixture = Fixture::new();
    let mut canonical = github_issue("a/b", 11, "Broken series");
    weekly(&mut canonical, "2025-11-08");
    canonical.recurring.as_mut().unwrap().pattern = "fortnightly".to_string();
    let (key, _) = fixture.seed(&canonical);

    let mut closed = github_issue("a/b", 11, "Broken series");
    closed.state = ItemState::Closed;
    closed.status = Status::Done;
    closed.completed_at = Some(utc(2025, 11, 8, 14, 30, 0));

    // retried syncs of the same bad record stay idempotent
    for _ in 0..2 {
        let adapter = FakeAdapter::new(System::Github, vec![closed.clone()]);
        let outcome = fixture
            .engine()
            .sync_at(&adapter, &full_request("a/b"), utc(2025, 11, 8, 15, 0, 0))
            .unwrap();
        assert_eq!(outcome.stats.failed, 1);
        assert_eq!(outcome.stats.updated, 0);
        assert!(adapter.reopened.borrow().is_empty());
    }

    assert!(fixture
        .store
        .load("github-a_b-11-completion-20251108143000.json")
        .unwrap()
        .is_none());
    let stats = fixture.registry.stats().unwrap();
    assert_eq!(stats.next_id, 2);
    assert_eq!(stats.total_entries, 1);

    // the canonical record is untouched on disk
    let stored = fixture.store.load(&key).unwrap().unwrap();
    assert_eq!(stored.state, ItemState::Open);
    assert_eq!(stored.due_date.as_deref(), Some("2025-11-08"));
    assert!(stored.recurring.as_ref().unwrap().completions.is_empty());
}

#[test]
fn fetched_recurring_metadata_does_not_drop_history() {
    let fixture = Fixture::new();
    let mut canonical = github_issue("a/b", 11, "Weekly review");
    weekly(&mut canonical, "2025-11-08");
    canonical
        .recurring
        .as_mut()
        .unwrap()
        .completions
        .push(CompletionEntry {
            completed_at: utc(2025, 11, 1, 14, 30, 0),
            completion_id: 77,
        });
    let (key, id) = fixture.seed(&canonical);

    // adapter derives its own series metadata (fresh, no history)
    let mut fetched = github_issue("a/b", 11, "Weekly review");
    fetched.state = ItemState::Closed;
    fetched.status = Status::Done;
    fetched.completed_at = Some(utc(2025, 11, 8, 14, 30, 0));
    fetched.recurring = Some(Recurring {
        pattern: "weekly".to_string(),
        interval: 1,
        next_due: None,
        completions: Vec::new(),
    });

    let adapter = FakeAdapter::new(System::Github, vec![fetched]);
    let outcome = fixture
        .engine()
        .sync_at(&adapter, &full_request("a/b"), utc(2025, 11, 8, 15, 0, 0))
        .unwrap();
    assert_eq!(outcome.stats.completions, 1);

    // prior history survives alongside the new completion, newest first
    let stored = fixture.store.load(&key).unwrap().unwrap();
    let completions = &stored.recurring.as_ref().unwrap().completions;
    assert_eq!(completions.len(), 2);
    assert_eq!(completions[0].completion_id, id + 1);
    assert_eq!(completions[1].completion_id, 77);
}

#[test]
fn sync_updates_registered_project_metadata() {
    let fixture = Fixture::new();
    fixture
        .projects
        .add(
            "todu",
            ProjectEntry {
                system: System::Github,
                repo: "a/b".to_string(),
                base_url: None,
                added_at: Some(utc(2025, 11, 1, 0, 0, 0)),
                last_sync: None,
                last_sync_mode: None,
                task_count: None,
                stats: None,
            },
        )
        .unwrap();

    let adapter = FakeAdapter::new(System::Github, vec![github_issue("a/b", 11, "first")]);
    fixture
        .engine()
        .sync_at(&adapter, &full_request("a/b"), utc(2025, 11, 8, 12, 0, 0))
        .unwrap();

    let entry = fixture.projects.get("todu").unwrap();
    assert_eq!(entry.last_sync_mode.as_deref(), Some("full"));
    assert_eq!(entry.task_count, Some(1));
    let stats = entry.stats.unwrap();
    assert_eq!(stats.new, 1);
    assert!(entry.last_sync.is_some());
}
