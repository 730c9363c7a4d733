//! Append-only audit trail
//!
//! Exactly one entry per successful create/update/delete/rollback, capturing
//! before/after snapshots so any change can be explained after the fact.
//! Entries are never mutated or pruned in-session.

use chrono::{DateTime, Utc};
use portico_domain::{ActorId, EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The store operation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
    Rollback,
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditOperation::Create => write!(f, "create"),
            AuditOperation::Update => write!(f, "update"),
            AuditOperation::Delete => write!(f, "delete"),
            AuditOperation::Rollback => write!(f, "rollback"),
        }
    }
}

/// One attributable store mutation. `before` is absent for creates,
/// `after` is absent for deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub operation: AuditOperation,
    pub actor: ActorId,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: EntityId,
        operation: AuditOperation,
        actor: ActorId,
        at: DateTime<Utc>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_kind,
            entity_id,
            operation,
            actor,
            at,
            before,
            after,
        }
    }
}

/// Append-only log of audit entries for one store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<AuditEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry and return its id.
    pub fn append(&mut self, entry: AuditEntry) -> Uuid {
        let id = entry.id;
        self.entries.push(entry);
        id
    }

    /// All entries in append order.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries for one entity, in append order.
    pub fn for_entity(&self, entity_id: EntityId) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.entity_id == entity_id)
            .collect()
    }

    /// Entries most-recent-first, for trail views.
    pub fn recent_first(&self) -> Vec<&AuditEntry> {
        let mut entries: Vec<&AuditEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.at.cmp(&a.at));
        entries
    }

    pub fn get(&self, id: Uuid) -> Option<&AuditEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(entity_id: EntityId, operation: AuditOperation) -> AuditEntry {
        AuditEntry::new(
            EntityKind::Task,
            entity_id,
            operation,
            "current-user".into(),
            Utc::now(),
            None,
            Some(serde_json::json!({"title": "t"})),
        )
    }

    #[test]
    fn append_and_query_by_entity() {
        let mut trail = AuditTrail::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        trail.append(entry(a, AuditOperation::Create));
        trail.append(entry(b, AuditOperation::Create));
        trail.append(entry(a, AuditOperation::Update));

        assert_eq!(trail.len(), 3);
        assert_eq!(trail.for_entity(a).len(), 2);
        assert_eq!(trail.for_entity(b).len(), 1);
    }

    #[test]
    fn recent_first_ordering() {
        let mut trail = AuditTrail::new();
        let id = Uuid::new_v4();
        let mut first = entry(id, AuditOperation::Create);
        first.at = Utc::now() - chrono::Duration::seconds(10);
        trail.append(first);
        trail.append(entry(id, AuditOperation::Update));

        let recent = trail.recent_first();
        assert_eq!(recent[0].operation, AuditOperation::Update);
        assert_eq!(recent[1].operation, AuditOperation::Create);
    }

    #[test]
    fn entry_serde_round_trip() {
        let original = entry(Uuid::new_v4(), AuditOperation::Delete);
        let json = serde_json::to_string(&original).unwrap();
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }
}
