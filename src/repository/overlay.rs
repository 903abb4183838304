//! The overlay function: folds the pending mutation queue over stored rows
//! to produce what the user believes is true, local edits included.
//!
//! Every step below is a `HashMap` assignment or removal keyed by task id,
//! so replaying the same queue against state that already reflects it is a
//! no-op — that's what makes `apply(apply(Q, T), ...)` collapse to
//! `apply(Q, T)` rather than needing a dedicated idempotency check.

use crate::mutation::{is_pending_id, Action, Mutation, MutationStatus};
use crate::remote::models::{CreateTaskFields, Deadline, Due, Task};
use std::collections::{HashMap, HashSet};

/// Fold `queue` (in ascending id / enqueue order) over `tasks` for one
/// project scope, producing the UI-visible task list.
pub fn apply_overlay(queue: &[Mutation], tasks: Vec<Task>) -> Vec<Task> {
    let mut all: HashMap<String, Task> = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
    let mut hidden: HashSet<String> = HashSet::new();

    let mut ordered: Vec<&Mutation> = queue
        .iter()
        .filter(|m| m.status != MutationStatus::Conflicted)
        .collect();
    ordered.sort_by_key(|m| m.id);

    for m in ordered {
        if m.entity_type != "task" {
            continue;
        }
        match m.action {
            Action::Create => {
                if !all.contains_key(&m.entity_id) {
                    if let Ok(fields) = serde_json::from_value::<CreateTaskFields>(m.payload.clone()) {
                        all.insert(m.entity_id.clone(), task_from_create_fields(&m.entity_id, &fields));
                    }
                }
            }
            Action::QuickAdd => {
                // Cache cannot predict the parsed result; no synthetic row
                // to add until a refresh surfaces it.
            }
            Action::Update => {
                if let Some(task) = all.get_mut(&m.entity_id) {
                    apply_patch(task, &m.payload);
                }
            }
            Action::Close => {
                if let Some(task) = all.get_mut(&m.entity_id) {
                    task.checked = true;
                }
                hidden.insert(m.entity_id.clone());
            }
            Action::Delete => {
                hidden.insert(m.entity_id.clone());
            }
            Action::Reopen => {
                if let Some(task) = all.get_mut(&m.entity_id) {
                    task.checked = false;
                }
                hidden.remove(&m.entity_id);
            }
        }
    }

    let mut out: Vec<Task> = all
        .into_iter()
        .filter(|(id, _)| !hidden.contains(id))
        .map(|(_, t)| t)
        .collect();
    out.sort_by_key(|t| t.child_order);
    out
}

pub(crate) fn task_from_create_fields(pending_id: &str, fields: &CreateTaskFields) -> Task {
    Task {
        id: pending_id.to_string(),
        user_id: String::new(),
        project_id: fields.project_id.clone(),
        section_id: fields.section_id.clone(),
        parent_id: None,
        responsible_uid: None,
        content: fields.content.clone(),
        description: fields.description.clone().unwrap_or_default(),
        priority: fields.priority.unwrap_or(1),
        due: fields.due_string.clone().map(|s| Due {
            date: String::new(),
            timezone: None,
            string: s,
            is_recurring: false,
        }),
        deadline: fields.deadline_date.clone().map(|date| Deadline { date }),
        labels: fields.labels.clone(),
        child_order: 0,
        checked: false,
        added_at: String::new(),
        updated_at: String::new(),
        note_count: 0,
    }
}

/// Apply a serialized `TaskPatch` JSON object onto a cached task: a key
/// absent from the object means "leave alone"; present and `null` clears
/// (only meaningful for `deadline_date`); present and non-null sets.
pub(crate) fn apply_patch(task: &mut Task, patch: &serde_json::Value) {
    let Some(obj) = patch.as_object() else { return };

    if let Some(v) = obj.get("content") {
        if let Some(s) = v.as_str() {
            task.content = s.to_string();
        }
    }
    if let Some(v) = obj.get("description") {
        if let Some(s) = v.as_str() {
            task.description = s.to_string();
        }
    }
    if let Some(v) = obj.get("priority") {
        if let Some(p) = v.as_u64() {
            task.priority = p as u8;
        }
    }
    if let Some(v) = obj.get("due_string") {
        if let Some(s) = v.as_str() {
            task.due = Some(Due {
                date: task.due.as_ref().map(|d| d.date.clone()).unwrap_or_default(),
                timezone: task.due.as_ref().and_then(|d| d.timezone.clone()),
                string: s.to_string(),
                is_recurring: task.due.as_ref().map(|d| d.is_recurring).unwrap_or(false),
            });
        }
    }
    if let Some(v) = obj.get("deadline_date") {
        task.deadline = if v.is_null() {
            None
        } else {
            v.as_str().map(|s| Deadline { date: s.to_string() })
        };
    }
    if let Some(v) = obj.get("labels") {
        if let Some(arr) = v.as_array() {
            task.labels = arr.iter().filter_map(|x| x.as_str().map(str::to_string)).collect();
        }
    }
    if let Some(v) = obj.get("section_id") {
        if let Some(s) = v.as_str() {
            task.section_id = Some(s.to_string());
        }
    }
}

/// Whether `id` refers to a row the server has not yet acknowledged.
pub fn is_unreconciled_pending(id: &str) -> bool {
    is_pending_id(id)
}
