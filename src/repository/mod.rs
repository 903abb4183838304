//! The repository coordinator: read-through/write-through between the
//! in-memory view, the durable `Store`, and the remote API.
//!
//! A single shared struct holding the remote client plus every cache the
//! driver needs, handed around as `Arc<Coordinator>` from one task to the
//! next.

mod directory;
mod mutations;
mod overlay;

use crate::error::StoreError;
use crate::events::Event;
use crate::remote::models::Project;
use crate::remote::RemoteClient;
use crate::store::Store;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

pub use directory::Directory;

const SCOPE_PROJECTS: &str = "projects";
const SCOPE_TASKS: &str = "tasks";
const SCOPE_SECTIONS: &str = "sections";
const GLOBAL_SCOPE: &str = "";

pub struct Coordinator {
    pub(crate) store: Arc<Store>,
    pub(crate) remote: Arc<RemoteClient>,
    pub(crate) ttl_seconds: i64,
    pub(crate) events: UnboundedSender<Event>,
    pub(crate) directory: Directory,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Coordinator {
    pub fn new(
        store: Arc<Store>,
        remote: Arc<RemoteClient>,
        ttl_seconds: i64,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            store,
            remote,
            ttl_seconds,
            events,
            directory: Directory::new(),
        }
    }

    fn emit(&self, event: Event) {
        // The UI side may have dropped its receiver (process exiting);
        // nothing to do but drop the event too.
        let _ = self.events.send(event);
    }

    // ============ Reads: two-phase, cached then fresh ============

    /// Fetch the project list. Always emits a `CachedProjects` event first;
    /// if the scope is stale (or `force`), also issues a remote fetch and
    /// emits `FreshProjects` on success, then scans for stale per-project
    /// scopes and emits `BackgroundRefresh`.
    pub async fn load_projects(&self, force: bool) -> Result<(), StoreError> {
        let cached = self.store.get_projects()?;
        let stale = force || self.store.is_stale(SCOPE_PROJECTS, GLOBAL_SCOPE, self.ttl_seconds, now());
        self.emit(Event::CachedProjects {
            projects: cached,
            stale,
        });

        if !stale {
            return Ok(());
        }

        match self.remote.list_projects().await {
            Ok(projects) => {
                self.store.replace_projects(&projects, now())?;
                self.emit(Event::FreshProjects {
                    projects: projects.clone(),
                });
                self.scan_stale_scopes(&projects)?;
            }
            Err(e) => {
                self.emit(Event::Toast {
                    message: format!("Failed to load projects: {e}"),
                });
            }
        }
        Ok(())
    }

    /// Scan every known project for a stale `tasks`/`sections` scope and
    /// emit `BackgroundRefresh` with the result.
    fn scan_stale_scopes(&self, projects: &[Project]) -> Result<(), StoreError> {
        let t = now();
        let stale: Vec<String> = projects
            .iter()
            .filter(|p| !p.is_archived && !p.is_deleted)
            .filter(|p| {
                self.store.is_stale(SCOPE_TASKS, &p.id, self.ttl_seconds, t)
                    || self.store.is_stale(SCOPE_SECTIONS, &p.id, self.ttl_seconds, t)
            })
            .map(|p| p.id.clone())
            .collect();

        if !stale.is_empty() {
            self.emit(Event::BackgroundRefresh { project_ids: stale });
        }
        Ok(())
    }

    /// Fetch one project's tasks, overlaying the pending queue so the user
    /// sees their own edits.
    pub async fn load_tasks(&self, project_id: &str, force: bool) -> Result<(), StoreError> {
        let overlaid = self.overlaid_tasks(project_id)?;
        let stale = force || self.store.is_stale(SCOPE_TASKS, project_id, self.ttl_seconds, now());
        self.emit(Event::CachedTasks {
            project_id: project_id.to_string(),
            tasks: overlaid,
            stale,
        });

        if !stale {
            return Ok(());
        }

        match self.remote.list_tasks(Some(project_id)).await {
            Ok(tasks) => {
                self.store.replace_tasks(project_id, &tasks, now())?;
                let overlaid = self.overlaid_tasks(project_id)?;
                self.emit(Event::FreshTasks {
                    project_id: project_id.to_string(),
                    tasks: overlaid,
                });
            }
            Err(e) => {
                self.emit(Event::Toast {
                    message: format!("Failed to load tasks: {e}"),
                });
            }
        }
        Ok(())
    }

    pub async fn load_sections(&self, project_id: &str, force: bool) -> Result<(), StoreError> {
        let cached = self.store.get_sections(project_id)?;
        let stale = force || self.store.is_stale(SCOPE_SECTIONS, project_id, self.ttl_seconds, now());
        self.emit(Event::CachedSections {
            project_id: project_id.to_string(),
            sections: cached,
            stale,
        });

        if !stale {
            return Ok(());
        }

        match self.remote.list_sections(project_id).await {
            Ok(sections) => {
                self.store.replace_sections(project_id, &sections, now())?;
                self.emit(Event::FreshSections {
                    project_id: project_id.to_string(),
                    sections,
                });
            }
            Err(e) => {
                self.emit(Event::Toast {
                    message: format!("Failed to load sections: {e}"),
                });
            }
        }
        Ok(())
    }

    /// Stored tasks for `project_id` folded with every pending mutation
    /// that touches this scope.
    pub fn overlaid_tasks(&self, project_id: &str) -> Result<Vec<crate::remote::models::Task>, StoreError> {
        let stored = self.store.get_tasks(project_id)?;
        let queue = self.store.all_mutations()?;
        let queue_for_project: Vec<_> = queue
            .into_iter()
            .filter(|m| {
                m.entity_type == "task"
                    && (stored.iter().any(|t| t.id == m.entity_id)
                        || crate::mutation::is_pending_id(&m.entity_id)
                        || matches!(m.action, crate::mutation::Action::Create))
            })
            .collect();
        Ok(overlay::apply_overlay(&queue_for_project, stored)
            .into_iter()
            .filter(|t| t.project_id == project_id)
            .collect())
    }

    /// Resolve human-readable names for every `responsible_uid` across the
    /// cached task set, merging current user / workspace users / project
    /// collaborators. Never persisted — consulted only for display.
    pub async fn warm_directory(&self) -> Result<(), StoreError> {
        self.directory.warm(&self.remote, &self.store).await
    }

    pub fn display_name(&self, user_id: &str) -> Option<String> {
        self.directory.display_name(user_id)
    }
}
