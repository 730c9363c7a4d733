//! Maintenance request records and their status state machine
//!
//! Requests flow submitted→assigned→in_progress→completed, with cancellation
//! possible at any pre-completion step. Completed and cancelled are terminal.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{ActorId, EntityId, EntityKind, EntityPatch, EntityRecord, StatusMachine};

/// The lifecycle status of a maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Submitted,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl StatusMachine for MaintenanceStatus {
    fn initial() -> Self {
        MaintenanceStatus::Submitted
    }

    fn can_transition_to(&self, target: &MaintenanceStatus) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<MaintenanceStatus> {
        match self {
            MaintenanceStatus::Submitted => {
                vec![MaintenanceStatus::Assigned, MaintenanceStatus::Cancelled]
            }
            MaintenanceStatus::Assigned => {
                vec![MaintenanceStatus::InProgress, MaintenanceStatus::Cancelled]
            }
            MaintenanceStatus::InProgress => {
                vec![MaintenanceStatus::Completed, MaintenanceStatus::Cancelled]
            }
            MaintenanceStatus::Completed => vec![],
            MaintenanceStatus::Cancelled => vec![],
        }
    }
}

impl std::fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaintenanceStatus::Submitted => write!(f, "submitted"),
            MaintenanceStatus::Assigned => write!(f, "assigned"),
            MaintenanceStatus::InProgress => write!(f, "in_progress"),
            MaintenanceStatus::Completed => write!(f, "completed"),
            MaintenanceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Urgency of a maintenance request. Ordered: Low < Medium < High < Urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

/// A work order against a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRequest {
    pub id: EntityId,
    pub version: u64,
    pub status: MaintenanceStatus,
    pub property_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: ActorId,
}

impl MaintenanceRequest {
    /// Percentage by which the actual cost exceeds the estimate, when both
    /// are known: `(actual - estimate) / estimate * 100`.
    pub fn overrun_percentage(&self) -> Option<f64> {
        match (self.cost_estimate, self.actual_cost) {
            (Some(estimate), Some(actual)) if estimate > 0.0 => {
                Some((actual - estimate) / estimate * 100.0)
            }
            _ => None,
        }
    }
}

/// Creation fields for a maintenance request.
#[derive(Debug, Clone)]
pub struct MaintenanceDraft {
    pub property_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub scheduled_date: Option<NaiveDate>,
    pub cost_estimate: Option<f64>,
}

/// Partial update for a maintenance request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenancePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<ActorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,
}

impl EntityPatch<MaintenanceRequest> for MaintenancePatch {
    fn apply_to(&self, record: &mut MaintenanceRequest) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(priority) = self.priority {
            record.priority = priority;
        }
        if let Some(assigned_to) = &self.assigned_to {
            record.assigned_to = Some(assigned_to.clone());
        }
        if let Some(scheduled_date) = self.scheduled_date {
            record.scheduled_date = Some(scheduled_date);
        }
        if let Some(cost_estimate) = self.cost_estimate {
            record.cost_estimate = Some(cost_estimate);
        }
        if let Some(actual_cost) = self.actual_cost {
            record.actual_cost = Some(actual_cost);
        }
    }
}

impl EntityRecord for MaintenanceRequest {
    type Status = MaintenanceStatus;
    type Draft = MaintenanceDraft;
    type Patch = MaintenancePatch;

    const KIND: EntityKind = EntityKind::MaintenanceRequest;

    fn from_draft(
        draft: MaintenanceDraft,
        id: EntityId,
        now: DateTime<Utc>,
        created_by: ActorId,
    ) -> Self {
        Self {
            id,
            version: 1,
            status: MaintenanceStatus::initial(),
            property_id: draft.property_id,
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            assigned_to: None,
            scheduled_date: draft.scheduled_date,
            cost_estimate: draft.cost_estimate,
            actual_cost: None,
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

    fn status(&self) -> MaintenanceStatus {
        self.status
    }

    fn apply_status(&mut self, status: MaintenanceStatus, now: DateTime<Utc>) {
        self.status = status;
        if status == MaintenanceStatus::Completed {
            self.completed_at = Some(now);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> MaintenanceRequest {
        MaintenanceRequest::from_draft(
            MaintenanceDraft {
                property_id: "p2".into(),
                title: "HVAC overhaul".into(),
                description: "Replace compressor on unit 4".into(),
                priority: Priority::High,
                scheduled_date: None,
                cost_estimate: Some(1000.0),
            },
            uuid::Uuid::new_v4(),
            Utc::now(),
            "current-user".into(),
        )
    }

    #[test]
    fn submitted_transitions() {
        let status = MaintenanceStatus::Submitted;
        assert!(status.can_transition_to(&MaintenanceStatus::Assigned));
        assert!(status.can_transition_to(&MaintenanceStatus::Cancelled));
        assert!(!status.can_transition_to(&MaintenanceStatus::InProgress));
        assert!(!status.can_transition_to(&MaintenanceStatus::Completed));
    }

    #[test]
    fn terminal_states() {
        assert!(MaintenanceStatus::Completed.is_terminal());
        assert!(MaintenanceStatus::Cancelled.is_terminal());
        assert!(!MaintenanceStatus::InProgress.is_terminal());
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn overrun_percentage() {
        let mut request = sample_request();
        assert!(request.overrun_percentage().is_none());
        request.actual_cost = Some(1250.0);
        assert_eq!(request.overrun_percentage(), Some(25.0));
        request.actual_cost = Some(900.0);
        assert_eq!(request.overrun_percentage(), Some(-10.0));
    }

    #[test]
    fn completion_stamp() {
        let now = Utc::now();
        let mut request = sample_request();
        request.apply_status(MaintenanceStatus::Completed, now);
        assert_eq!(request.completed_at, Some(now));
    }
}
