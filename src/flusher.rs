//! The flusher: single worker draining the mutation queue to the remote
//! client, one row at a time, strictly FIFO.
//!
//! `flush_next` is a single async method the dispatch loop tail-calls
//! repeatedly, one row at a time, so only one flush is ever in flight.

use crate::error::StoreError;
use crate::events::{Event, FlushOutcome};
use crate::mutation::{is_pending_id, Action, Mutation, MutationStatus};
use crate::remote::models::{CreateTaskFields, Project, Task, TaskPatch};
use crate::remote::RemoteClient;
use crate::store::Store;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub struct Flusher {
    store: Arc<Store>,
    remote: Arc<RemoteClient>,
    events: UnboundedSender<Event>,
    max_attempts: u32,
    /// Optional strong-mode pre-check; off by default.
    pub strong_conflict_checks: bool,
}

enum Applied {
    Task(Task),
    Project(Project),
    Empty,
}

impl Flusher {
    pub fn new(
        store: Arc<Store>,
        remote: Arc<RemoteClient>,
        events: UnboundedSender<Event>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            remote,
            events,
            max_attempts,
            strong_conflict_checks: false,
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// One tick of the drain loop. Returns `true` if a mutation was
    /// processed (so the caller can immediately schedule the next tick),
    /// `false` if the queue held nothing to do.
    pub async fn flush_next(&self) -> Result<bool, StoreError> {
        let Some(m) = self.store.next_pending_mutation()? else {
            return Ok(false);
        };

        self.store
            .update_mutation_status(m.id, MutationStatus::Flushing, "")?;
        let attempts = self.store.increment_attempts(m.id)?;
        let mut m = m;
        m.attempts = attempts;

        if self.strong_conflict_checks && m.action == Action::Update {
            if let Some(reason) = self.check_snapshot_drift(&m).await {
                self.store
                    .update_mutation_status(m.id, MutationStatus::Conflicted, &reason)?;
                self.emit(Event::MutationConflict {
                    mutation: m,
                    conflict: reason,
                });
                return Ok(true);
            }
        }

        match self.apply(&m).await {
            Ok(applied) => {
                self.reconcile(&m, applied)?;
                self.store.delete_mutation(m.id)?;
                self.emit(Event::MutationFlushed {
                    mutation: m,
                    outcome: FlushOutcome::Ok,
                });
            }
            Err(e) if e.is_transient() && m.attempts < self.max_attempts => {
                self.store
                    .update_mutation_status(m.id, MutationStatus::Pending, "")?;
                self.emit(Event::MutationFlushed {
                    mutation: m,
                    outcome: FlushOutcome::TransientError(e.to_string()),
                });
            }
            Err(e) => {
                let conflict = self.classify_conflict(&m, &e)?;
                self.store
                    .update_mutation_status(m.id, MutationStatus::Conflicted, &conflict)?;
                self.emit(Event::MutationConflict {
                    mutation: m,
                    conflict,
                });
            }
        }

        Ok(true)
    }

    /// Dispatch a mutation to its remote call.
    async fn apply(&self, m: &Mutation) -> Result<Applied, crate::error::RemoteError> {
        match m.entity_type.as_str() {
            "task" => self.apply_task(m).await,
            "project" => self.apply_project(m).await,
            other => {
                log::error!("unknown mutation entity_type {other}, dropping");
                Ok(Applied::Empty)
            }
        }
    }

    async fn apply_task(&self, m: &Mutation) -> Result<Applied, crate::error::RemoteError> {
        match m.action {
            Action::Create => {
                let fields: CreateTaskFields = serde_json::from_value(m.payload.clone())
                    .unwrap_or_default();
                Ok(Applied::Task(self.remote.create_task(&fields).await?))
            }
            Action::QuickAdd => {
                let text = m
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                Ok(Applied::Task(self.remote.quick_add(text).await?))
            }
            Action::Update => {
                let patch: TaskPatch = serde_json::from_value(m.payload.clone()).unwrap_or_default();
                Ok(Applied::Task(self.remote.update_task(&m.entity_id, &patch).await?))
            }
            Action::Close => {
                self.remote.close_task(&m.entity_id).await?;
                Ok(Applied::Empty)
            }
            Action::Reopen => {
                self.remote.reopen_task(&m.entity_id).await?;
                Ok(Applied::Empty)
            }
            Action::Delete => {
                self.remote.delete_task(&m.entity_id).await?;
                Ok(Applied::Empty)
            }
        }
    }

    async fn apply_project(&self, m: &Mutation) -> Result<Applied, crate::error::RemoteError> {
        match m.action {
            Action::Create => {
                let name = m
                    .payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                Ok(Applied::Project(self.remote.create_project(name).await?))
            }
            Action::Close => Ok(Applied::Project(self.remote.archive_project(&m.entity_id).await?)),
            Action::Reopen => Ok(Applied::Project(
                self.remote.unarchive_project(&m.entity_id).await?,
            )),
            other => {
                log::error!("unsupported project mutation action {other:?}, dropping");
                Ok(Applied::Empty)
            }
        }
    }

    /// Fold the server's response back into the cache once a mutation
    /// applies cleanly.
    fn reconcile(&self, m: &Mutation, applied: Applied) -> Result<(), StoreError> {
        match (m.entity_type.as_str(), &m.action, applied) {
            ("task", Action::Create, Applied::Task(server_task)) => {
                self.store.delete_task(&m.entity_id)?;
                self.store
                    .rewrite_mutation_entity_id("task", &m.entity_id, &server_task.id)?;
                self.store.upsert_task(&server_task)?;
            }
            ("task", Action::QuickAdd, Applied::Task(server_task)) => {
                self.store.upsert_task(&server_task)?;
            }
            ("task", Action::Update, Applied::Task(server_task)) => {
                self.store.upsert_task(&server_task)?;
            }
            ("task", Action::Reopen, Applied::Task(server_task)) => {
                self.store.upsert_task(&server_task)?;
            }
            ("task", Action::Close, _) | ("task", Action::Delete, _) => {
                self.store.delete_task(&m.entity_id)?;
            }
            ("project", Action::Create, Applied::Project(server_project)) => {
                let mut projects = self.store.get_projects()?;
                projects.retain(|p| p.id != m.entity_id);
                self.store
                    .rewrite_mutation_entity_id("project", &m.entity_id, &server_project.id)?;
                projects.push(server_project);
                self.store.replace_projects(&projects, now())?;
            }
            ("project", Action::Close, Applied::Project(server_project))
            | ("project", Action::Reopen, Applied::Project(server_project)) => {
                let mut projects = self.store.get_projects()?;
                if let Some(slot) = projects.iter_mut().find(|p| p.id == server_project.id) {
                    *slot = server_project;
                } else {
                    projects.push(server_project);
                }
                self.store.replace_projects(&projects, now())?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Turn a non-transient remote error into a conflict reason, tidying up
    /// local state when the server says the entity no longer exists.
    fn classify_conflict(
        &self,
        m: &Mutation,
        e: &crate::error::RemoteError,
    ) -> Result<String, StoreError> {
        use crate::error::RemoteError;
        match e {
            RemoteError::NotFound
                if matches!(m.action, Action::Update | Action::Close | Action::Reopen | Action::Delete) =>
            {
                if m.entity_type == "task" {
                    self.store.delete_task(&m.entity_id)?;
                }
                Ok("entity deleted on server".to_string())
            }
            RemoteError::Permanent { message, .. } => Ok(format!("server rejected change: {message}")),
            other => Ok(format!("sync failed: {other}")),
        }
    }

    /// Advisory pre-check, opt-in: compare the snapshot's `updated_at` to
    /// the server's current value and flag a likely concurrent edit before
    /// even attempting the PATCH.
    async fn check_snapshot_drift(&self, m: &Mutation) -> Option<String> {
        if is_pending_id(&m.entity_id) {
            return None;
        }
        let snapshot_updated_at = m.snapshot.get("updated_at")?.as_str()?;
        let current = self.remote.get_task(&m.entity_id).await.ok()?;
        if current.updated_at != snapshot_updated_at {
            Some("concurrent edit".to_string())
        } else {
            None
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::new_pending_id;

    fn flusher() -> (Flusher, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let remote = Arc::new(RemoteClient::new(
            "https://example.invalid".to_string(),
            "token".to_string(),
        ));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Flusher::new(store, remote, tx, 5), rx)
    }

    #[test]
    fn empty_queue_returns_false() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (f, _rx) = flusher();
        let processed = rt.block_on(f.flush_next()).unwrap();
        assert!(!processed);
    }

    #[test]
    fn fifo_order_is_respected_by_next_pending() {
        let (f, _rx) = flusher();
        let first = f
            .store
            .enqueue_mutation(
                "task",
                &new_pending_id(),
                Action::Create,
                serde_json::json!({"content": "a", "project_id": "P1"}),
                serde_json::json!({}),
                1,
            )
            .unwrap();
        let _second = f
            .store
            .enqueue_mutation(
                "task",
                "2",
                Action::Update,
                serde_json::json!({}),
                serde_json::json!({}),
                2,
            )
            .unwrap();
        let next = f.store.next_pending_mutation().unwrap().unwrap();
        assert_eq!(next.id, first);
    }

    #[test]
    fn classify_not_found_on_update_removes_local_row() {
        let (f, _rx) = flusher();
        let task = Task {
            id: "42".to_string(),
            user_id: String::new(),
            project_id: "P1".to_string(),
            section_id: None,
            parent_id: None,
            responsible_uid: None,
            content: "x".to_string(),
            description: String::new(),
            priority: 1,
            due: None,
            deadline: None,
            labels: vec![],
            child_order: 0,
            checked: false,
            added_at: String::new(),
            updated_at: String::new(),
            note_count: 0,
        };
        f.store.upsert_task(&task).unwrap();

        let m = Mutation {
            id: 1,
            entity_type: "task".to_string(),
            entity_id: "42".to_string(),
            action: Action::Update,
            payload: serde_json::json!({}),
            snapshot: serde_json::json!({}),
            status: MutationStatus::Flushing,
            conflict: String::new(),
            created_at: 1,
            attempts: 1,
        };
        let conflict = f
            .classify_conflict(&m, &crate::error::RemoteError::NotFound)
            .unwrap();
        assert_eq!(conflict, "entity deleted on server");
        assert!(f.store.get_task("42").unwrap().is_none());
    }

    #[test]
    fn reconciling_a_create_rewrites_entity_id_on_queued_followups() {
        let (f, _rx) = flusher();
        let pending_id = new_pending_id();

        let create_id = f
            .store
            .enqueue_mutation(
                "task",
                &pending_id,
                Action::Create,
                serde_json::json!({"content": "a", "project_id": "P1"}),
                serde_json::json!({}),
                1,
            )
            .unwrap();
        let update_id = f
            .store
            .enqueue_mutation(
                "task",
                &pending_id,
                Action::Update,
                serde_json::json!({"content": {"Value": "b"}}),
                serde_json::json!({}),
                2,
            )
            .unwrap();

        let create = f.store.get_mutation(create_id).unwrap().unwrap();
        let server_task = Task {
            id: "42".to_string(),
            user_id: String::new(),
            project_id: "P1".to_string(),
            section_id: None,
            parent_id: None,
            responsible_uid: None,
            content: "a".to_string(),
            description: String::new(),
            priority: 1,
            due: None,
            deadline: None,
            labels: vec![],
            child_order: 0,
            checked: false,
            added_at: String::new(),
            updated_at: String::new(),
            note_count: 0,
        };
        f.reconcile(&create, Applied::Task(server_task)).unwrap();

        let update = f.store.get_mutation(update_id).unwrap().unwrap();
        assert_eq!(update.entity_id, "42");
    }
}
