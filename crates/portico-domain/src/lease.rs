//! Lease records and their status state machine
//!
//! Leases move one way: draft→active, then toward expiring/expired as the
//! end date approaches, and finally to renewed (terminal). The renewal
//! negotiation itself is tracked separately in [`RenewalStatus`] and through
//! a linked renewal workflow.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{ActorId, EntityId, EntityKind, EntityPatch, EntityRecord, StatusMachine};

/// The lifecycle status of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Draft,
    Active,
    Expiring,
    Expired,
    Renewed,
}

impl StatusMachine for LeaseStatus {
    fn initial() -> Self {
        LeaseStatus::Draft
    }

    fn can_transition_to(&self, target: &LeaseStatus) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<LeaseStatus> {
        match self {
            LeaseStatus::Draft => vec![LeaseStatus::Active],
            LeaseStatus::Active => vec![
                LeaseStatus::Expiring,
                LeaseStatus::Expired,
                LeaseStatus::Renewed,
            ],
            LeaseStatus::Expiring => vec![LeaseStatus::Expired, LeaseStatus::Renewed],
            LeaseStatus::Expired => vec![LeaseStatus::Renewed],
            LeaseStatus::Renewed => vec![],
        }
    }
}

impl std::fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaseStatus::Draft => write!(f, "draft"),
            LeaseStatus::Active => write!(f, "active"),
            LeaseStatus::Expiring => write!(f, "expiring"),
            LeaseStatus::Expired => write!(f, "expired"),
            LeaseStatus::Renewed => write!(f, "renewed"),
        }
    }
}

/// Where a renewal negotiation stands, independent of the lease status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalStatus {
    None,
    Draft,
    Sent,
    Negotiating,
    Signed,
}

impl Default for RenewalStatus {
    fn default() -> Self {
        RenewalStatus::None
    }
}

/// A property lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub id: EntityId,
    pub version: u64,
    pub status: LeaseStatus,
    pub property_id: String,
    pub property_name: String,
    pub tenant: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: f64,
    pub renewal_status: RenewalStatus,
    /// Workflow driving the renewal, once one has been initiated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_workflow_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_terms: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: ActorId,
}

impl Lease {
    /// Signed day count from `today` to the lease end date. Negative once
    /// the lease is past its end date.
    pub fn days_until_end(&self, today: NaiveDate) -> i64 {
        self.end_date.signed_duration_since(today).num_days()
    }
}

/// Creation fields for a lease.
#[derive(Debug, Clone)]
pub struct LeaseDraft {
    pub property_id: String,
    pub property_name: String,
    pub tenant: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: f64,
}

/// Partial update for a lease.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeasePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_rent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_status: Option<RenewalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_workflow_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_terms: Option<String>,
}

impl EntityPatch<Lease> for LeasePatch {
    fn apply_to(&self, record: &mut Lease) {
        if let Some(tenant) = &self.tenant {
            record.tenant = tenant.clone();
        }
        if let Some(start_date) = self.start_date {
            record.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            record.end_date = end_date;
        }
        if let Some(monthly_rent) = self.monthly_rent {
            record.monthly_rent = monthly_rent;
        }
        if let Some(renewal_status) = self.renewal_status {
            record.renewal_status = renewal_status;
        }
        if let Some(workflow_id) = self.renewal_workflow_id {
            record.renewal_workflow_id = Some(workflow_id);
        }
        if let Some(terms) = &self.renewal_terms {
            record.renewal_terms = Some(terms.clone());
        }
    }
}

impl EntityRecord for Lease {
    type Status = LeaseStatus;
    type Draft = LeaseDraft;
    type Patch = LeasePatch;

    const KIND: EntityKind = EntityKind::Lease;

    fn from_draft(
        draft: LeaseDraft,
        id: EntityId,
        now: DateTime<Utc>,
        created_by: ActorId,
    ) -> Self {
        Self {
            id,
            version: 1,
            status: LeaseStatus::initial(),
            property_id: draft.property_id,
            property_name: draft.property_name,
            tenant: draft.tenant,
            start_date: draft.start_date,
            end_date: draft.end_date,
            monthly_rent: draft.monthly_rent,
            renewal_status: RenewalStatus::default(),
            renewal_workflow_id: None,
            renewal_terms: None,
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

    fn status(&self) -> LeaseStatus {
        self.status
    }

    fn apply_status(&mut self, status: LeaseStatus, _now: DateTime<Utc>) {
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
