//! Mutation queue operations.
//!
//! The flusher always picks the lowest-id `pending` row: `next_pending_mutation`
//! orders by `id ASC` to guarantee strict FIFO draining.

use super::Store;
use crate::error::StoreError;
use crate::mutation::{Action, Mutation, MutationStatus};
use rusqlite::{params, OptionalExtension, Row};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub flushing: u64,
    pub conflicted: u64,
}

fn row_to_mutation(row: &Row) -> rusqlite::Result<Mutation> {
    let action_str: String = row.get("action")?;
    let status_str: String = row.get("status")?;
    let payload_str: String = row.get("payload")?;
    let snapshot_str: String = row.get("snapshot")?;

    Ok(Mutation {
        id: row.get("id")?,
        entity_type: row.get("entity_type")?,
        entity_id: row.get("entity_id")?,
        action: Action::parse(&action_str).unwrap_or(Action::Update),
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        snapshot: serde_json::from_str(&snapshot_str).unwrap_or(serde_json::Value::Null),
        status: MutationStatus::parse(&status_str).unwrap_or(MutationStatus::Pending),
        conflict: row.get("conflict")?,
        created_at: row.get("created_at")?,
        attempts: row.get::<_, i64>("attempts")? as u32,
    })
}

impl Store {
    /// Insert a new mutation, returning its assigned (monotonic) id.
    pub fn enqueue_mutation(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: Action,
        payload: serde_json::Value,
        snapshot: serde_json::Value,
        created_at: i64,
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO mutation_queue
                (entity_type, entity_id, action, payload, snapshot, status, conflict, created_at, attempts)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', '', ?6, 0)",
            params![
                entity_type,
                entity_id,
                action.as_str(),
                payload.to_string(),
                snapshot.to_string(),
                created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The lowest-id `pending` row, or `None` if the queue holds none
    /// (conflicted rows don't block it).
    pub fn next_pending_mutation(&self) -> Result<Option<Mutation>, StoreError> {
        let conn = self.conn.lock();
        let mutation = conn
            .query_row(
                "SELECT * FROM mutation_queue WHERE status = 'pending' ORDER BY id ASC LIMIT 1",
                [],
                row_to_mutation,
            )
            .optional()?;
        Ok(mutation)
    }

    pub fn update_mutation_status(
        &self,
        id: i64,
        status: MutationStatus,
        conflict: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE mutation_queue SET status = ?2, conflict = ?3 WHERE id = ?1",
            params![id, status.as_str(), conflict],
        )?;
        Ok(())
    }

    pub fn increment_attempts(&self, id: i64) -> Result<u32, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE mutation_queue SET attempts = attempts + 1 WHERE id = ?1",
            params![id],
        )?;
        let attempts: i64 = conn.query_row(
            "SELECT attempts FROM mutation_queue WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    pub fn delete_mutation(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM mutation_queue WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Rewrite every queued mutation still carrying `old_entity_id` (the
    /// pending id minted before a `create` reconciled) to `new_entity_id`
    /// (the id the server assigned). A later-queued `update`/`close`/etc.
    /// on the same entity shares the pending id until this runs, since it
    /// was enqueued before the create's reconciliation was known.
    pub fn rewrite_mutation_entity_id(
        &self,
        entity_type: &str,
        old_entity_id: &str,
        new_entity_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE mutation_queue SET entity_id = ?3
             WHERE entity_type = ?1 AND entity_id = ?2",
            params![entity_type, old_entity_id, new_entity_id],
        )?;
        Ok(())
    }

    /// Drop a conflicted mutation from the queue. If it was the `create`
    /// that minted `entity_id` and the id still carries the `pending-`
    /// prefix, the synthetic row never made it to the server, so it's
    /// deleted too rather than left behind as a dead local-only task.
    pub fn dismiss_mutation(&self, id: i64) -> Result<(), StoreError> {
        let mutation = self.get_mutation(id)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM mutation_queue WHERE id = ?1", params![id])?;
        if let Some(m) = mutation {
            if m.action == Action::Create && crate::mutation::is_pending_id(&m.entity_id) {
                match m.entity_type.as_str() {
                    "task" => {
                        tx.execute("DELETE FROM tasks WHERE id = ?1", params![m.entity_id])?;
                    }
                    "project" => {
                        tx.execute("DELETE FROM projects WHERE id = ?1", params![m.entity_id])?;
                    }
                    _ => {}
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_mutation(&self, id: i64) -> Result<Option<Mutation>, StoreError> {
        let conn = self.conn.lock();
        let mutation = conn
            .query_row(
                "SELECT * FROM mutation_queue WHERE id = ?1",
                params![id],
                row_to_mutation,
            )
            .optional()?;
        Ok(mutation)
    }

    pub fn all_mutations(&self) -> Result<Vec<Mutation>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM mutation_queue ORDER BY id ASC")?;
        let rows = stmt.query_map([], row_to_mutation)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn conflicted_mutations(&self) -> Result<Vec<Mutation>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT * FROM mutation_queue WHERE status = 'conflicted' ORDER BY id ASC")?;
        let rows = stmt.query_map([], row_to_mutation)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// O(row-count) counters feeding the sync indicator and queue overlay.
    pub fn queue_counts(&self) -> Result<QueueCounts, StoreError> {
        let conn = self.conn.lock();
        let mut counts = QueueCounts::default();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM mutation_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => counts.pending = count,
                "flushing" => counts.flushing = count,
                "conflicted" => counts.conflicted = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn fifo_drain_order() {
        let store = new_store();
        let m1 = store
            .enqueue_mutation("task", "a", Action::Update, serde_json::json!({}), serde_json::json!({}), 1)
            .unwrap();
        let m2 = store
            .enqueue_mutation("task", "b", Action::Update, serde_json::json!({}), serde_json::json!({}), 2)
            .unwrap();

        let first = store.next_pending_mutation().unwrap().unwrap();
        assert_eq!(first.id, m1);
        store.update_mutation_status(m1, MutationStatus::Flushing, "").unwrap();
        store.delete_mutation(m1).unwrap();

        let second = store.next_pending_mutation().unwrap().unwrap();
        assert_eq!(second.id, m2);
    }

    #[test]
    fn conflicted_does_not_block_pending() {
        let store = new_store();
        let m1 = store
            .enqueue_mutation("task", "a", Action::Update, serde_json::json!({}), serde_json::json!({}), 1)
            .unwrap();
        let m2 = store
            .enqueue_mutation("task", "b", Action::Update, serde_json::json!({}), serde_json::json!({}), 2)
            .unwrap();
        store
            .update_mutation_status(m1, MutationStatus::Conflicted, "server rejected change")
            .unwrap();

        let next = store.next_pending_mutation().unwrap().unwrap();
        assert_eq!(next.id, m2);
    }

    #[test]
    fn counts_reflect_status() {
        let store = new_store();
        store
            .enqueue_mutation("task", "a", Action::Create, serde_json::json!({}), serde_json::json!({}), 1)
            .unwrap();
        let m2 = store
            .enqueue_mutation("task", "b", Action::Update, serde_json::json!({}), serde_json::json!({}), 2)
            .unwrap();
        store
            .update_mutation_status(m2, MutationStatus::Conflicted, "x")
            .unwrap();

        let counts = store.queue_counts().unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.conflicted, 1);
        assert_eq!(counts.flushing, 0);
    }

    #[test]
    fn increment_attempts_counts_up() {
        let store = new_store();
        let id = store
            .enqueue_mutation("task", "a", Action::Update, serde_json::json!({}), serde_json::json!({}), 1)
            .unwrap();
        assert_eq!(store.increment_attempts(id).unwrap(), 1);
        assert_eq!(store.increment_attempts(id).unwrap(), 2);
    }

    #[test]
    fn dismiss_unreconciled_create_removes_pending_row_too() {
        use crate::mutation::new_pending_id;
        use crate::remote::models::Task;

        let store = new_store();
        let pending_id = new_pending_id();
        let task = Task {
            id: pending_id.clone(),
            user_id: String::new(),
            project_id: "P1".to_string(),
            section_id: None,
            parent_id: None,
            responsible_uid: None,
            content: "never synced".to_string(),
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
        store.upsert_task(&task).unwrap();
        let mutation_id = store
            .enqueue_mutation(
                "task",
                &pending_id,
                Action::Create,
                serde_json::json!({"project_id": "P1"}),
                serde_json::json!({}),
                1,
            )
            .unwrap();
        store
            .update_mutation_status(mutation_id, MutationStatus::Conflicted, "boom")
            .unwrap();

        store.dismiss_mutation(mutation_id).unwrap();

        assert!(store.get_mutation(mutation_id).unwrap().is_none());
        assert!(store.get_task(&pending_id).unwrap().is_none());
    }

    #[test]
    fn dismiss_of_non_create_leaves_entity_row_alone() {
        let store = new_store();
        let mutation_id = store
            .enqueue_mutation("task", "42", Action::Update, serde_json::json!({}), serde_json::json!({}), 1)
            .unwrap();
        store
            .update_mutation_status(mutation_id, MutationStatus::Conflicted, "boom")
            .unwrap();

        store.dismiss_mutation(mutation_id).unwrap();

        assert!(store.get_mutation(mutation_id).unwrap().is_none());
    }
}
