//! Mutation entrypoints: apply every write optimistically to the store,
//! enqueue it for the flusher, then push a refreshed view back out over
//! the event channel so the caller never waits on the network.

use super::{now, Coordinator};
use crate::error::StoreError;
use crate::events::Event;
use crate::mutation::{new_pending_id, Action};
use crate::remote::models::{CreateTaskFields, Project, Task, TaskPatch};

use super::overlay::{apply_patch, task_from_create_fields};

impl Coordinator {
    /// Push the current overlaid view for `project_id` back out as a
    /// (non-stale) cached-tasks event, for immediate optimistic feedback.
    fn emit_overlaid(&self, project_id: &str) -> Result<(), StoreError> {
        let tasks = self.overlaid_tasks(project_id)?;
        self.emit(Event::CachedTasks {
            project_id: project_id.to_string(),
            tasks,
            stale: false,
        });
        Ok(())
    }

    pub fn create_task(&self, fields: CreateTaskFields) -> Result<Task, StoreError> {
        let pending_id = new_pending_id();
        let synthetic = task_from_create_fields(&pending_id, &fields);
        self.store.upsert_task(&synthetic)?;
        self.store.enqueue_mutation(
            "task",
            &pending_id,
            Action::Create,
            serde_json::to_value(&fields).unwrap_or_default(),
            serde_json::json!({}),
            now(),
        )?;
        self.emit(Event::Created {
            task: synthetic.clone(),
        });
        self.emit_overlaid(&fields.project_id)?;
        Ok(synthetic)
    }

    pub fn quick_add(&self, text: &str) -> Result<(), StoreError> {
        let pending_id = new_pending_id();
        self.store.enqueue_mutation(
            "task",
            &pending_id,
            Action::QuickAdd,
            serde_json::json!({ "text": text }),
            serde_json::json!({}),
            now(),
        )?;
        self.emit(Event::Toast {
            message: format!("Added: {text}"),
        });
        Ok(())
    }

    pub fn update_task(&self, task_id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(());
        };
        let snapshot = serde_json::to_value(&task).unwrap_or_default();
        let payload = serde_json::to_value(patch).unwrap_or_default();

        apply_patch(&mut task, &payload);
        let project_id = task.project_id.clone();
        self.store.upsert_task(&task)?;
        self.store
            .enqueue_mutation("task", task_id, Action::Update, payload, snapshot, now())?;
        self.emit_overlaid(&project_id)?;
        Ok(())
    }

    pub fn close_task(&self, task_id: &str) -> Result<(), StoreError> {
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(());
        };
        let snapshot = serde_json::to_value(&task).unwrap_or_default();
        task.checked = true;
        let project_id = task.project_id.clone();
        self.store.upsert_task(&task)?;
        self.store.enqueue_mutation(
            "task",
            task_id,
            Action::Close,
            serde_json::json!({}),
            snapshot,
            now(),
        )?;
        self.emit_overlaid(&project_id)?;
        Ok(())
    }

    pub fn reopen_task(&self, task_id: &str) -> Result<(), StoreError> {
        let Some(mut task) = self.store.get_task(task_id)? else {
            return Ok(());
        };
        let snapshot = serde_json::to_value(&task).unwrap_or_default();
        task.checked = false;
        let project_id = task.project_id.clone();
        self.store.upsert_task(&task)?;
        self.store.enqueue_mutation(
            "task",
            task_id,
            Action::Reopen,
            serde_json::json!({}),
            snapshot,
            now(),
        )?;
        self.emit_overlaid(&project_id)?;
        Ok(())
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), StoreError> {
        let Some(task) = self.store.get_task(task_id)? else {
            return Ok(());
        };
        let snapshot = serde_json::to_value(&task).unwrap_or_default();
        let project_id = task.project_id.clone();
        // The row stays put until the flusher reconciles the delete; the
        // overlay hides it from the UI in the meantime (see overlay.rs).
        self.store.enqueue_mutation(
            "task",
            task_id,
            Action::Delete,
            serde_json::json!({}),
            snapshot,
            now(),
        )?;
        self.emit_overlaid(&project_id)?;
        Ok(())
    }

    pub fn create_project(&self, name: &str) -> Result<Project, StoreError> {
        let pending_id = new_pending_id();
        let synthetic = Project {
            id: pending_id.clone(),
            name: name.to_string(),
            color: "grey".to_string(),
            parent_id: None,
            child_order: 0,
            is_favorite: false,
            is_archived: false,
            is_deleted: false,
            is_inbox_project: false,
            description: String::new(),
        };

        let mut projects = self.store.get_projects()?;
        projects.push(synthetic.clone());
        self.store.replace_projects(&projects, now())?;

        self.store.enqueue_mutation(
            "project",
            &pending_id,
            Action::Create,
            serde_json::json!({ "name": name }),
            serde_json::json!({}),
            now(),
        )?;
        self.emit(Event::ProjectCreated {
            project: synthetic.clone(),
        });
        Ok(synthetic)
    }

    /// Archived/unarchived reuse `Action::Close`/`Action::Reopen` — the same
    /// shape as a task's visibility toggle, just scoped to `entity_type =
    /// "project"` instead of `"task"`.
    pub fn archive_project(&self, project_id: &str) -> Result<(), StoreError> {
        let mut projects = self.store.get_projects()?;
        let Some(project) = projects.iter_mut().find(|p| p.id == project_id) else {
            return Ok(());
        };
        let snapshot = serde_json::to_value(&project).unwrap_or_default();
        project.is_archived = true;
        self.store.replace_projects(&projects, now())?;
        self.store.enqueue_mutation(
            "project",
            project_id,
            Action::Close,
            serde_json::json!({}),
            snapshot,
            now(),
        )?;
        self.emit(Event::ProjectArchived {
            project_id: project_id.to_string(),
        });
        Ok(())
    }

    /// Drop a conflicted mutation from the queue without retrying it, then
    /// refresh whatever scope it touched so the UI stops showing the
    /// optimistic row that never made it to the server.
    pub fn dismiss_conflict(&self, mutation_id: i64) -> Result<(), StoreError> {
        let mutation = self.store.get_mutation(mutation_id)?;
        self.store.dismiss_mutation(mutation_id)?;
        if let Some(m) = mutation {
            if m.entity_type == "task" {
                let project_id = m
                    .payload
                    .get("project_id")
                    .and_then(|v| v.as_str())
                    .or_else(|| m.snapshot.get("project_id").and_then(|v| v.as_str()))
                    .map(str::to_string);
                if let Some(project_id) = project_id {
                    self.emit_overlaid(&project_id)?;
                }
            }
        }
        Ok(())
    }

    pub fn unarchive_project(&self, project_id: &str) -> Result<(), StoreError> {
        let mut projects = self.store.get_projects()?;
        let Some(project) = projects.iter_mut().find(|p| p.id == project_id) else {
            return Ok(());
        };
        let snapshot = serde_json::to_value(&project).unwrap_or_default();
        project.is_archived = false;
        let updated = project.clone();
        self.store.replace_projects(&projects, now())?;
        self.store.enqueue_mutation(
            "project",
            project_id,
            Action::Reopen,
            serde_json::json!({}),
            snapshot,
            now(),
        )?;
        self.emit(Event::ProjectUnarchived { project: updated });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteClient;
    use crate::store::Store;
    use std::sync::Arc;

    fn coordinator() -> (Coordinator, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let remote = Arc::new(RemoteClient::new(
            "https://example.invalid".to_string(),
            "token".to_string(),
        ));
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Coordinator::new(store, remote, 120, tx), rx)
    }

    #[test]
    fn create_task_inserts_synthetic_row_and_enqueues() {
        let (coord, mut rx) = coordinator();
        let fields = CreateTaskFields {
            content: "Write tests".to_string(),
            project_id: "P1".to_string(),
            ..Default::default()
        };
        let task = coord.create_task(fields).unwrap();
        assert!(task.id.starts_with("pending-"));
        assert_eq!(coord.store.queue_counts().unwrap().pending, 1);

        let mut saw_created = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, Event::Created { .. }) {
                saw_created = true;
            }
        }
        assert!(saw_created);
    }

    #[test]
    fn update_task_applies_optimistic_patch() {
        let (coord, _rx) = coordinator();
        let fields = CreateTaskFields {
            content: "Original".to_string(),
            project_id: "P1".to_string(),
            ..Default::default()
        };
        let task = coord.create_task(fields).unwrap();

        let patch = TaskPatch {
            content: crate::remote::models::Patch::Value("Renamed".to_string()),
            ..Default::default()
        };
        coord.update_task(&task.id, &patch).unwrap();

        let stored = coord.store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(stored.content, "Renamed");
        assert_eq!(coord.store.queue_counts().unwrap().pending, 2);
    }

    #[test]
    fn dismiss_conflict_clears_queue_and_synthetic_row() {
        let (coord, _rx) = coordinator();
        let fields = CreateTaskFields {
            content: "Will fail".to_string(),
            project_id: "P1".to_string(),
            ..Default::default()
        };
        let task = coord.create_task(fields).unwrap();
        let mutation = coord.store.all_mutations().unwrap().into_iter().next().unwrap();
        coord
            .store
            .update_mutation_status(mutation.id, crate::mutation::MutationStatus::Conflicted, "rejected")
            .unwrap();

        coord.dismiss_conflict(mutation.id).unwrap();

        assert!(coord.store.get_mutation(mutation.id).unwrap().is_none());
        assert!(coord.store.get_task(&task.id).unwrap().is_none());
    }

    #[test]
    fn archive_project_marks_archived_and_enqueues() {
        let (coord, _rx) = coordinator();
        coord
            .store
            .replace_projects(
                &[Project {
                    id: "P1".to_string(),
                    name: "Inbox".to_string(),
                    color: "grey".to_string(),
                    parent_id: None,
                    child_order: 0,
                    is_favorite: false,
                    is_archived: false,
                    is_deleted: false,
                    is_inbox_project: true,
                    description: String::new(),
                }],
                0,
            )
            .unwrap();

        coord.archive_project("P1").unwrap();
        let projects = coord.store.get_projects().unwrap();
        assert!(projects[0].is_archived);
        assert_eq!(coord.store.queue_counts().unwrap().pending, 1);
    }
}
