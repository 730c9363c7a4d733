//! Pending-operation ledger
//!
//! Records the outcome of every mutating store call so a retry subsystem can
//! replay transient failures. Retryable failures are swept back to Pending
//! until the retry count reaches the configured cap, after which they stay
//! permanently Failed and must be surfaced to an operator. Validation errors
//! are recorded non-retryable and never swept.

use chrono::{DateTime, Utc};
use portico_domain::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of mutating call a ledger entry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    StatusChange,
    Rollback,
}

/// Outcome of a mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Success,
    Failed,
    RolledBack,
}

/// One ledger entry. `audit_id` links to the audit entry the operation
/// produced, when it produced one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub operation: OperationKind,
    pub status: OperationStatus,
    pub retryable: bool,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<Uuid>,
}

/// The per-store operation ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingLedger {
    entries: Vec<PendingOperation>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PendingOperation>) -> Self {
        Self { entries }
    }

    pub fn record_success(
        &mut self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        operation: OperationKind,
        audit_id: Option<Uuid>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push(PendingOperation {
            id,
            entity_kind,
            entity_id,
            operation,
            status: OperationStatus::Success,
            retryable: false,
            retry_count: 0,
            error: None,
            created_at: Utc::now(),
            audit_id,
        });
        id
    }

    pub fn record_failure(
        &mut self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        operation: OperationKind,
        error: String,
        retryable: bool,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push(PendingOperation {
            id,
            entity_kind,
            entity_id,
            operation,
            status: OperationStatus::Failed,
            retryable,
            retry_count: 0,
            error: Some(error),
            created_at: Utc::now(),
            audit_id: None,
        });
        id
    }

    /// Downgrade a previously recorded operation to Failed (used when the
    /// durable write after an optimistic mutation does not land).
    pub fn mark_failed(&mut self, id: Uuid, error: String, retryable: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
            entry.status = OperationStatus::Failed;
            entry.error = Some(error);
            entry.retryable = retryable;
        }
    }

    pub fn mark_rolled_back(&mut self, id: Uuid) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
            entry.status = OperationStatus::RolledBack;
        }
    }

    /// Sweep retryable failures back to Pending, incrementing their retry
    /// count, while below `max_retries`. Entries at the cap stay Failed with
    /// a saturated error message. Returns how many entries were re-queued.
    pub fn retry_failed(&mut self, max_retries: u32) -> usize {
        let mut requeued = 0;
        for entry in &mut self.entries {
            if entry.status != OperationStatus::Failed || !entry.retryable {
                continue;
            }
            if entry.retry_count < max_retries {
                entry.retry_count += 1;
                entry.status = OperationStatus::Pending;
                requeued += 1;
            } else {
                entry.error = Some("max retries exceeded".into());
            }
        }
        requeued
    }

    pub fn entries(&self) -> &[PendingOperation] {
        &self.entries
    }

    pub fn get(&self, id: Uuid) -> Option<&PendingOperation> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn failed(&self) -> Vec<&PendingOperation> {
        self.entries
            .iter()
            .filter(|entry| entry.status == OperationStatus::Failed)
            .collect()
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

    fn failed_ledger(retryable: bool) -> (PendingLedger, Uuid) {
        let mut ledger = PendingLedger::new();
        let id = ledger.record_failure(
            EntityKind::Lease,
            Uuid::new_v4(),
            OperationKind::Update,
            "storage write failed".into(),
            retryable,
        );
        (ledger, id)
    }

    #[test]
    fn retry_requeues_retryable_failures() {
        let (mut ledger, id) = failed_ledger(true);
        assert_eq!(ledger.retry_failed(3), 1);
        let entry = ledger.get(id).unwrap();
        assert_eq!(entry.status, OperationStatus::Pending);
        assert_eq!(entry.retry_count, 1);
    }

    #[test]
    fn retry_count_saturates_at_cap() {
        let (mut ledger, id) = failed_ledger(true);
        for _ in 0..3 {
            assert_eq!(ledger.retry_failed(3), 1);
            // Simulate another failure of the retried operation
            ledger.mark_failed(id, "still failing".into(), true);
        }
        // At the cap: stays failed, error saturates
        assert_eq!(ledger.retry_failed(3), 0);
        let entry = ledger.get(id).unwrap();
        assert_eq!(entry.status, OperationStatus::Failed);
        assert_eq!(entry.retry_count, 3);
        assert_eq!(entry.error.as_deref(), Some("max retries exceeded"));
    }

    #[test]
    fn validation_failures_are_never_retried() {
        let (mut ledger, id) = failed_ledger(false);
        assert_eq!(ledger.retry_failed(3), 0);
        assert_eq!(ledger.get(id).unwrap().status, OperationStatus::Failed);
    }

    #[test]
    fn successes_are_untouched_by_sweep() {
        let mut ledger = PendingLedger::new();
        let id = ledger.record_success(
            EntityKind::Task,
            Uuid::new_v4(),
            OperationKind::Create,
            None,
        );
        ledger.retry_failed(3);
        assert_eq!(ledger.get(id).unwrap().status, OperationStatus::Success);
    }
}
