//! Tagged events the coordinator, flusher, and background refresher emit
//! onto the dispatch loop's channel. A closed enum keeps the `match` in
//! the driver exhaustive: adding a variant here is a compile error
//! everywhere it isn't handled.

use crate::mutation::Mutation;
use crate::remote::models::{Project, Section, Task};

/// Result of a `FlushNext` tick, ok or a retried transient failure.
#[derive(Debug, Clone)]
pub enum FlushOutcome {
    Ok,
    TransientError(String),
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Two-phase read, phase one: the immediate cached answer.
    CachedProjects { projects: Vec<Project>, stale: bool },
    /// Two-phase read, phase two: the server's answer after a refresh.
    FreshProjects { projects: Vec<Project> },
    CachedTasks {
        project_id: String,
        tasks: Vec<Task>,
        stale: bool,
    },
    FreshTasks {
        project_id: String,
        tasks: Vec<Task>,
    },
    CachedSections {
        project_id: String,
        sections: Vec<Section>,
        stale: bool,
    },
    FreshSections {
        project_id: String,
        sections: Vec<Section>,
    },
    /// A local `create`/`quick_add` applied optimistically.
    Created { task: Task },
    /// A flush attempt finished (success or a retried transient failure).
    MutationFlushed { mutation: Mutation, outcome: FlushOutcome },
    /// A flush attempt ended in `conflicted`.
    MutationConflict { mutation: Mutation, conflict: String },
    /// Emitted after a successful project-list refresh: project ids whose
    /// `tasks`/`sections` scope is stale.
    BackgroundRefresh { project_ids: Vec<String> },
    /// One background chain finished one project; `remaining` drives the
    /// driver's round-robin continuation.
    BackgroundRefreshDone { chain: usize, remaining: Vec<String> },
    /// A user-facing toast, e.g. "Failed to load tasks: ...", "List archived".
    Toast { message: String },
    ProjectArchived { project_id: String },
    ProjectUnarchived { project: Project },
    ProjectCreated { project: Project },
}
