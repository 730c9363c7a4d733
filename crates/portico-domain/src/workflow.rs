//! Workflow records and their status state machine
//!
//! State transitions:
//! ```text
//! Draft → Active ↔ Paused
//!   ↓       ↓        ↓
//!   └→ Archived ←────┘
//!         ↑
//!     Completed ← Active
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{ActorId, EntityId, EntityKind, EntityPatch, EntityRecord, StatusMachine};

/// The lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl StatusMachine for WorkflowStatus {
    fn initial() -> Self {
        WorkflowStatus::Draft
    }

    fn can_transition_to(&self, target: &WorkflowStatus) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<WorkflowStatus> {
        match self {
            WorkflowStatus::Draft => vec![WorkflowStatus::Active, WorkflowStatus::Archived],
            WorkflowStatus::Active => vec![
                WorkflowStatus::Paused,
                WorkflowStatus::Completed,
                WorkflowStatus::Archived,
            ],
            WorkflowStatus::Paused => vec![WorkflowStatus::Active, WorkflowStatus::Archived],
            WorkflowStatus::Completed => vec![WorkflowStatus::Archived],
            WorkflowStatus::Archived => vec![],
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Draft => write!(f, "draft"),
            WorkflowStatus::Active => write!(f, "active"),
            WorkflowStatus::Paused => write!(f, "paused"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Archived => write!(f, "archived"),
        }
    }
}

/// A multi-step process tracked against the portfolio (for example a lease
/// renewal or an onboarding checklist).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: EntityId,
    pub version: u64,
    pub status: WorkflowStatus,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: ActorId,
}

/// Creation fields for a workflow; the store assigns everything else.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDraft {
    pub name: String,
    pub description: String,
}

/// Partial update for a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EntityPatch<Workflow> for WorkflowPatch {
    fn apply_to(&self, record: &mut Workflow) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
    }
}

impl EntityRecord for Workflow {
    type Status = WorkflowStatus;
    type Draft = WorkflowDraft;
    type Patch = WorkflowPatch;

    const KIND: EntityKind = EntityKind::Workflow;

    fn from_draft(
        draft: WorkflowDraft,
        id: EntityId,
        now: DateTime<Utc>,
        created_by: ActorId,
    ) -> Self {
        Self {
            id,
            version: 1,
            status: WorkflowStatus::initial(),
            name: draft.name,
            description: draft.description,
            created_at: now,
            updated_at: now,
            created_by,
        }
    }

    fn id(&self) -> EntityId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn status(&self) -> WorkflowStatus {
        self.status
    }

    fn apply_status(&mut self, status: WorkflowStatus, _now: DateTime<Utc>) {
        self.status = status;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn created_by(&self) -> &str {
        &self.created_by
    }
}
