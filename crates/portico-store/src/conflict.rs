//! Conflict records and resolution actions
//!
//! Last-write-wins is deliberately rejected: a divergent write is parked as
//! a conflict holding both snapshots, so the version counter and audit trail
//! stay trustworthy until someone (or some policy) picks a side.

use chrono::{DateTime, Utc};
use portico_domain::{EntityId, EntityKind, EntityRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How to resolve a staged conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Discard the proposed value and keep the local record.
    KeepLocal,
    /// Overwrite the local record with the proposed value.
    AcceptRemote,
    /// Field-by-field merge driven by a UI; not automated by the engine.
    ManualMerge,
}

/// A detected divergence between the local record and a proposed one,
/// awaiting explicit resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict<R> {
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub local: R,
    pub proposed: R,
    pub detected_at: DateTime<Utc>,
}

impl<R: EntityRecord> Conflict<R> {
    pub fn new(local: R, proposed: R) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_kind: R::KIND,
            entity_id: local.id(),
            local,
            proposed,
            detected_at: Utc::now(),
        }
    }

    /// True when `incoming` describes the same divergence this conflict
    /// already holds. The bus and the storage watch both deliver every
    /// broadcast, so the same proposed state can arrive twice.
    pub fn covers(&self, incoming: &R) -> bool {
        self.entity_id == incoming.id()
            && self.proposed.version() == incoming.version()
            && self.proposed.updated_at() == incoming.updated_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use portico_domain::{Workflow, WorkflowDraft};

    fn workflow(name: &str) -> Workflow {
        Workflow::from_draft(
            WorkflowDraft {
                name: name.into(),
                description: String::new(),
            },
            Uuid::new_v4(),
            Utc::now(),
            "current-user".into(),
        )
    }

    #[test]
    fn conflict_snapshots_both_sides() {
        let local = workflow("local");
        let mut proposed = local.clone();
        proposed.name = "remote".into();
        proposed.version = 2;

        let conflict = Conflict::new(local.clone(), proposed.clone());
        assert_eq!(conflict.entity_id, local.id);
        assert_eq!(conflict.local.name, "local");
        assert_eq!(conflict.proposed.name, "remote");
    }

    #[test]
    fn covers_matches_identical_proposed_state() {
        let local = workflow("local");
        let mut proposed = local.clone();
        proposed.version = 2;

        let conflict = Conflict::new(local, proposed.clone());
        assert!(conflict.covers(&proposed));

        let mut newer = proposed.clone();
        newer.version = 3;
        assert!(!conflict.covers(&newer));
    }
}
