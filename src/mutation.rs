//! The pending-write journal record: one row per queued local change.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Create,
    Update,
    Close,
    Reopen,
    Delete,
    QuickAdd,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Close => "close",
            Action::Reopen => "reopen",
            Action::Delete => "delete",
            Action::QuickAdd => "quick_add",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "create" => Action::Create,
            "update" => Action::Update,
            "close" => Action::Close,
            "reopen" => Action::Reopen,
            "delete" => Action::Delete,
            "quick_add" => Action::QuickAdd,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationStatus {
    Pending,
    Flushing,
    Conflicted,
}

impl MutationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationStatus::Pending => "pending",
            MutationStatus::Flushing => "flushing",
            MutationStatus::Conflicted => "conflicted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => MutationStatus::Pending,
            "flushing" => MutationStatus::Flushing,
            "conflicted" => MutationStatus::Conflicted,
            _ => return None,
        })
    }
}

/// A pending write: entity, action, payload, pre-image snapshot, status,
/// attempts. `payload` and `snapshot` are opaque serialized JSON; the
/// coordinator and flusher are the only code that knows their shape for a
/// given `action`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub action: Action,
    pub payload: serde_json::Value,
    pub snapshot: serde_json::Value,
    pub status: MutationStatus,
    pub conflict: String,
    pub created_at: i64,
    pub attempts: u32,
}

/// Unambiguous prefix for client-generated ids, so a later reconciled id
/// from the server can never collide with one minted locally.
pub const PENDING_PREFIX: &str = "pending-";

pub fn new_pending_id() -> String {
    format!("{PENDING_PREFIX}{}", uuid::Uuid::new_v4())
}

pub fn is_pending_id(id: &str) -> bool {
    id.starts_with(PENDING_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_str() {
        for a in [
            Action::Create,
            Action::Update,
            Action::Close,
            Action::Reopen,
            Action::Delete,
            Action::QuickAdd,
        ] {
            assert_eq!(Action::parse(a.as_str()), Some(a));
        }
    }

    #[test]
    fn pending_id_is_recognizable() {
        let id = new_pending_id();
        assert!(is_pending_id(&id));
        assert!(!is_pending_id("42"));
    }
}
