//! Task records and their status state machine
//!
//! Completed is not terminal: tasks can be reopened back to Todo or
//! InProgress. The dependency graph between tasks must stay acyclic; the
//! store engine enforces that on every edge addition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{ActorId, EntityId, EntityKind, EntityPatch, EntityRecord, StatusMachine};

/// The lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Completed,
}

impl StatusMachine for TaskStatus {
    fn initial() -> Self {
        TaskStatus::Todo
    }

    fn can_transition_to(&self, target: &TaskStatus) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            TaskStatus::Todo => vec![TaskStatus::InProgress, TaskStatus::Completed],
            TaskStatus::InProgress => {
                vec![TaskStatus::Blocked, TaskStatus::Completed, TaskStatus::Todo]
            }
            TaskStatus::Blocked => vec![TaskStatus::InProgress, TaskStatus::Todo],
            // Reopening is allowed
            TaskStatus::Completed => vec![TaskStatus::Todo, TaskStatus::InProgress],
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Blocked => write!(f, "blocked"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A unit of work, optionally attached to a parent workflow and to other
/// tasks it depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub version: u64,
    pub status: TaskStatus,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_workflow_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Ids of tasks this task depends on. Must remain acyclic.
    pub dependencies: Vec<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: ActorId,
}

/// Creation fields for a task.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub parent_workflow_id: Option<EntityId>,
    pub assignee: Option<ActorId>,
    pub due_date: Option<DateTime<Utc>>,
    pub dependencies: Vec<EntityId>,
}

/// Partial update for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_workflow_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Replaces the full dependency list when supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<EntityId>>,
}

impl EntityPatch<Task> for TaskPatch {
    fn apply_to(&self, record: &mut Task) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(workflow_id) = self.parent_workflow_id {
            record.parent_workflow_id = Some(workflow_id);
        }
        if let Some(assignee) = &self.assignee {
            record.assignee = Some(assignee.clone());
        }
        if let Some(due_date) = self.due_date {
            record.due_date = Some(due_date);
        }
        if let Some(dependencies) = &self.dependencies {
            record.dependencies = dependencies.clone();
        }
    }
}

impl EntityRecord for Task {
    type Status = TaskStatus;
    type Draft = TaskDraft;
    type Patch = TaskPatch;

    const KIND: EntityKind = EntityKind::Task;

    fn from_draft(draft: TaskDraft, id: EntityId, now: DateTime<Utc>, created_by: ActorId) -> Self {
        Self {
            id,
            version: 1,
            status: TaskStatus::initial(),
            title: draft.title,
            description: draft.description,
            parent_workflow_id: draft.parent_workflow_id,
            assignee: draft.assignee,
            due_date: draft.due_date,
            dependencies: draft.dependencies,
            completed_at: None,
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

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn apply_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            TaskStatus::Completed => self.completed_at = Some(now),
            // Reopening clears the completion stamp
            _ => self.completed_at = None,
        }
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
