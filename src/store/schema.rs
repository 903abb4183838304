//! The cache schema.

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sync_meta (
    resource_type TEXT NOT NULL,
    scope_id      TEXT NOT NULL,
    last_synced   INTEGER NOT NULL,
    PRIMARY KEY (resource_type, scope_id)
);

CREATE TABLE IF NOT EXISTS projects (
    id   TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id         TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    data       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_project_id ON tasks (project_id);

CREATE TABLE IF NOT EXISTS sections (
    id         TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    data       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sections_project_id ON sections (project_id);

CREATE TABLE IF NOT EXISTS labels (
    id   TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mutation_queue (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id   TEXT NOT NULL,
    action      TEXT NOT NULL,
    payload     TEXT NOT NULL,
    snapshot    TEXT NOT NULL,
    status      TEXT NOT NULL,
    conflict    TEXT NOT NULL DEFAULT '',
    created_at  INTEGER NOT NULL,
    attempts    INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_mutation_queue_status ON mutation_queue (status);
";
