//! Wire models for the remote task-management API.
//!
//! Field names follow the upstream API's own `snake_case` wire format, so
//! Rust's default field naming already matches — no `rename_all` needed.

use serde::de::{Deserializer, Error as DeError};
use serde::ser::{Serializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub color: String,
    pub parent_id: Option<String>,
    pub child_order: i32,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_inbox_project: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub section_order: i32,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub item_order: i32,
    #[serde(default)]
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Due {
    pub date: String,
    #[serde(default)]
    pub timezone: Option<String>,
    pub string: String,
    #[serde(default)]
    pub is_recurring: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Deadline {
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub project_id: String,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub responsible_uid: Option<String>,
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub due: Option<Due>,
    #[serde(default)]
    pub deadline: Option<Deadline>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub child_order: i32,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub added_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub note_count: u32,
}

fn default_priority() -> u8 {
    1
}

/// One page of a paginated list endpoint: opaque cursor + results.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub next_cursor: Option<String>,
}

/// A directory entry for a workspace user: tolerant of the varying id/name
/// keys different endpoints use.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub id: String,
    pub display: String,
}

impl DirectoryEntry {
    /// Extract `{id, display}` from an arbitrary JSON object by walking a
    /// fixed priority order of keys.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = ["user_id", "id", "uid"]
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))?;
        let display = ["full_name", "name", "email"]
            .iter()
            .find_map(|k| obj.get(*k))
            .and_then(|v| v.as_str())
            .unwrap_or(&id)
            .to_string();
        Some(Self { id, display })
    }
}

/// A sparse field in an update patch: absent (leave alone), explicit null
/// (clear — only meaningful for `deadline_date`), or an explicit value.
/// `Option<Option<T>>` would conflate "absent" and "value" under
/// `#[serde(default)]`, so this gets its own three-state type instead.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Patch<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Absent => serializer.serialize_none(),
            Patch::Null => serializer.serialize_none(),
            Patch::Value(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(Patch::Null);
        }
        T::deserialize(value).map(Patch::Value).map_err(DeError::custom)
    }
}

/// Sparse patch for `update_task`. A field absent from the outbound JSON
/// means "no change"; see `Patch<T>` above for the three-state semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Patch::is_absent")]
    pub content: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_absent")]
    pub description: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_absent")]
    pub priority: Patch<u8>,
    #[serde(skip_serializing_if = "Patch::is_absent")]
    pub due_string: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_absent")]
    pub deadline_date: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_absent")]
    pub labels: Patch<Vec<String>>,
    #[serde(skip_serializing_if = "Patch::is_absent")]
    pub section_id: Patch<String>,
}

/// Outbound body for `create_task` / `quick_add`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateTaskFields {
    pub content: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}
