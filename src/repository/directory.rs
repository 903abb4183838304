//! User-directory resolution: current user + workspace users + per-project
//! collaborators merged into one id->display-name map, held only in
//! memory and never persisted to the store.

use crate::remote::RemoteClient;
use crate::store::Store;
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct Directory {
    names: RwLock<HashMap<String, String>>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
        }
    }

    pub fn display_name(&self, user_id: &str) -> Option<String> {
        self.names.read().get(user_id).cloned()
    }

    /// Refill the map from the current user, the workspace roster, and every
    /// known project's collaborator list. Individual lookups that fail are
    /// logged and skipped rather than aborting the whole warm-up — a stale
    /// directory is far less harmful than a blocked UI.
    pub async fn warm(&self, remote: &RemoteClient, store: &Store) -> Result<(), crate::error::StoreError> {
        let mut merged = HashMap::new();

        match remote.get_current_user().await {
            Ok(entry) => {
                merged.insert(entry.id, entry.display);
            }
            Err(e) => log::warn!("directory warm-up: current user lookup failed: {e}"),
        }

        match remote.list_workspace_users().await {
            Ok(entries) => {
                for entry in entries {
                    merged.insert(entry.id, entry.display);
                }
            }
            Err(e) => log::warn!("directory warm-up: workspace users lookup failed: {e}"),
        }

        for project in store.get_projects()? {
            match remote.list_project_collaborators(&project.id).await {
                Ok(entries) => {
                    for entry in entries {
                        merged.insert(entry.id, entry.display);
                    }
                }
                Err(e) => log::warn!(
                    "directory warm-up: collaborators for {} failed: {e}",
                    project.id
                ),
            }
        }

        *self.names.write() = merged;
        Ok(())
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
