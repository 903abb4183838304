//! The durable cache: a single-file SQLite store.
//!
//! `Store` wraps one `rusqlite::Connection` behind a `parking_lot::Mutex`;
//! callers on the flusher and background-refresh tasks block on it directly.
//! Every write that touches more than one row goes through a transaction so
//! a crash mid-write never leaves the cache half-updated.

mod mutation_queue;
mod schema;

use crate::error::StoreError;
use crate::remote::models::{Label, Project, Section, Task};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub use mutation_queue::QueueCounts;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if absent) the cache database at `path`, apply the
    /// schema, and coerce any `flushing` mutation rows back to `pending` —
    /// a crash mid-flush must not strand a mutation in limbo.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.coerce_flushing_to_pending()?;
        Ok(store)
    }

    /// An in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    fn coerce_flushing_to_pending(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE mutation_queue SET status = 'pending' WHERE status = 'flushing'",
            [],
        )?;
        if n > 0 {
            log::warn!("coerced {n} flushing mutation(s) back to pending on open");
        }
        Ok(())
    }

    // ============ Freshness stamps ============

    /// `now - last_synced > ttl`, or no stamp at all ("never synced").
    pub fn is_stale(&self, resource: &str, scope_id: &str, ttl_seconds: i64, now: i64) -> bool {
        let conn = self.conn.lock();
        let last_synced: Option<i64> = conn
            .query_row(
                "SELECT last_synced FROM sync_meta WHERE resource_type = ?1 AND scope_id = ?2",
                params![resource, scope_id],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or(None);

        match last_synced {
            Some(ts) => now - ts > ttl_seconds,
            None => true,
        }
    }

    pub fn last_synced(&self, resource: &str, scope_id: &str) -> Option<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT last_synced FROM sync_meta WHERE resource_type = ?1 AND scope_id = ?2",
            params![resource, scope_id],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or(None)
    }

    /// Upsert `last_synced = now`. Freshness stamps only move forward, so a
    /// caller with a wall clock older than the stored value is a bug, not a
    /// case this function silently tolerates by keeping the newer value —
    /// it always writes `now`; ordering the calls correctly is the caller's
    /// job (the repository only ever calls this right after a successful
    /// fetch).
    pub fn touch(&self, resource: &str, scope_id: &str, now: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sync_meta (resource_type, scope_id, last_synced) VALUES (?1, ?2, ?3)
             ON CONFLICT(resource_type, scope_id) DO UPDATE SET last_synced = excluded.last_synced
             WHERE excluded.last_synced >= sync_meta.last_synced",
            params![resource, scope_id, now],
        )?;
        Ok(())
    }

    // ============ Projects ============

    pub fn get_projects(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM projects")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Transactional full replace, ending with a `touch` on success.
    pub fn replace_projects(&self, projects: &[Project], now: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM projects", [])?;
        for p in projects {
            let data = serde_json::to_string(p)?;
            tx.execute(
                "INSERT INTO projects (id, data) VALUES (?1, ?2)",
                params![p.id, data],
            )?;
        }
        tx.execute(
            "INSERT INTO sync_meta (resource_type, scope_id, last_synced) VALUES ('projects', '', ?1)
             ON CONFLICT(resource_type, scope_id) DO UPDATE SET last_synced = excluded.last_synced",
            params![now],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ============ Sections ============

    pub fn get_sections(&self, project_id: &str) -> Result<Vec<Section>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM sections WHERE project_id = ?1")?;
        let rows = stmt.query_map(params![project_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn replace_sections(
        &self,
        project_id: &str,
        sections: &[Section],
        now: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM sections WHERE project_id = ?1", params![project_id])?;
        for s in sections {
            let data = serde_json::to_string(s)?;
            tx.execute(
                "INSERT INTO sections (id, project_id, data) VALUES (?1, ?2, ?3)",
                params![s.id, s.project_id, data],
            )?;
        }
        tx.execute(
            "INSERT INTO sync_meta (resource_type, scope_id, last_synced) VALUES ('sections', ?1, ?2)
             ON CONFLICT(resource_type, scope_id) DO UPDATE SET last_synced = excluded.last_synced",
            params![project_id, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ============ Labels ============

    pub fn get_labels(&self) -> Result<Vec<Label>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM labels")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn replace_labels(&self, labels: &[Label], now: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM labels", [])?;
        for l in labels {
            let data = serde_json::to_string(l)?;
            tx.execute(
                "INSERT INTO labels (id, data) VALUES (?1, ?2)",
                params![l.id, data],
            )?;
        }
        tx.execute(
            "INSERT INTO sync_meta (resource_type, scope_id, last_synced) VALUES ('labels', '', ?1)
             ON CONFLICT(resource_type, scope_id) DO UPDATE SET last_synced = excluded.last_synced",
            params![now],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ============ Tasks ============

    pub fn get_tasks(&self, project_id: &str) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM tasks WHERE project_id = ?1")?;
        let rows = stmt.query_map(params![project_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row("SELECT data FROM tasks WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    pub fn replace_tasks(&self, project_id: &str, tasks: &[Task], now: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM tasks WHERE project_id = ?1", params![project_id])?;
        for t in tasks {
            let data = serde_json::to_string(t)?;
            tx.execute(
                "INSERT INTO tasks (id, project_id, data) VALUES (?1, ?2, ?3)",
                params![t.id, t.project_id, data],
            )?;
        }
        tx.execute(
            "INSERT INTO sync_meta (resource_type, scope_id, last_synced) VALUES ('tasks', ?1, ?2)
             ON CONFLICT(resource_type, scope_id) DO UPDATE SET last_synced = excluded.last_synced",
            params![project_id, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Single-row write-through used by optimistic paths.
    pub fn upsert_task(&self, t: &Task) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let data = serde_json::to_string(t)?;
        conn.execute(
            "INSERT INTO tasks (id, project_id, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET project_id = excluded.project_id, data = excluded.data",
            params![t.id, t.project_id, data],
        )?;
        Ok(())
    }

    pub fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ============ Mutation queue ============
    // Implemented in `mutation_queue.rs`; re-exported as inherent methods
    // via the `impl Store` block there so call sites read `store.enqueue_mutation(..)`
    // the same as every other Store method.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::models::Project;

    fn sample_project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            name: "Inbox".to_string(),
            color: "grey".to_string(),
            parent_id: None,
            child_order: 0,
            is_favorite: false,
            is_archived: false,
            is_deleted: false,
            is_inbox_project: true,
            description: String::new(),
        }
    }

    #[test]
    fn is_stale_when_never_synced() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.is_stale("tasks", "P1", 120, 1_000));
    }

    #[test]
    fn touch_then_fresh_within_ttl() {
        let store = Store::open_in_memory().unwrap();
        store.touch("tasks", "P1", 1_000).unwrap();
        assert!(!store.is_stale("tasks", "P1", 120, 1_010));
        assert!(store.is_stale("tasks", "P1", 120, 1_200));
    }

    #[test]
    fn freshness_is_monotonic() {
        let store = Store::open_in_memory().unwrap();
        store.touch("tasks", "P1", 1_000).unwrap();
        store.touch("tasks", "P1", 500).unwrap(); // earlier stamp, ignored
        assert_eq!(store.last_synced("tasks", "P1"), Some(1_000));
    }

    #[test]
    fn replace_projects_is_transactional_full_replace() {
        let store = Store::open_in_memory().unwrap();
        store
            .replace_projects(&[sample_project("1"), sample_project("2")], 100)
            .unwrap();
        assert_eq!(store.get_projects().unwrap().len(), 2);

        store.replace_projects(&[sample_project("3")], 200).unwrap();
        let got = store.get_projects().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "3");
    }

    #[test]
    fn coerces_flushing_rows_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let store = Store::open(&path).unwrap();
            let id = store
                .enqueue_mutation(
                    "task",
                    "42",
                    crate::mutation::Action::Update,
                    serde_json::json!({}),
                    serde_json::json!({}),
                    1_000,
                )
                .unwrap();
            store
                .update_mutation_status(id, crate::mutation::MutationStatus::Flushing, "")
                .unwrap();
        }

        let reopened = Store::open(&path).unwrap();
        let pending = reopened.next_pending_mutation().unwrap();
        assert!(pending.is_some());
        assert_eq!(pending.unwrap().status, crate::mutation::MutationStatus::Pending);
    }
}
