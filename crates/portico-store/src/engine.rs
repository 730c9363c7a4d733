//! Generic versioned entity store
//!
//! One engine, instantiated per entity kind, owning the canonical in-memory
//! record list for that kind. Every mutation is optimistic: the list changes
//! first, an audit entry and ledger entry are appended, then the whole state
//! is written to durable storage and the full list is broadcast on the sync
//! bus. Stale writes and two-sided divergent merges are parked as conflicts
//! instead of overwriting, so the version counter and audit trail stay
//! trustworthy; a remote update over a locally untouched record
//! fast-forwards.
//!
//! Divergence is judged against a per-record sync point: the last state
//! this store and the shared medium agreed on (set at creation, hydration,
//! and every merge agreement). A record equal to its sync point has no
//! local changes to lose.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use portico_domain::{EntityId, EntityPatch, EntityRecord, StatusMachine};

use crate::audit::{AuditEntry, AuditOperation, AuditTrail};
use crate::config::StoreConfig;
use crate::conflict::{Conflict, ConflictResolution};
use crate::error::{Result, StoreError};
use crate::event::StoreEvent;
use crate::pending::{OperationKind, PendingLedger};
use crate::storage::KeyValueStorage;
use crate::sync::{SyncBus, SyncMessage};

/// Kind-specific validation hooks, supplied at construction.
pub trait StoreHooks<R: EntityRecord>: Send {
    /// Veto a status transition after the table check but before anything
    /// commits. `all` is the full live record list for cross-record rules.
    fn before_transition(&self, _record: &R, _target: &R::Status, _all: &[R]) -> Result<()> {
        Ok(())
    }

    /// How many other live records of the same kind reference `id` as a
    /// required dependency. Non-zero blocks deletion.
    fn dependents_of(&self, _id: EntityId, _all: &[R]) -> usize {
        0
    }
}

/// Hooks for kinds with no same-kind referential rules.
pub struct NoHooks;

impl<R: EntityRecord> StoreHooks<R> for NoHooks {}

/// Counts from one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub fast_forwarded: usize,
    pub converged: usize,
    pub conflicts: usize,
}

/// The last state of one record that this store and the shared medium
/// agreed on. A local record still equal to its sync point carries no
/// unshared changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SyncPoint {
    version: u64,
    updated_at: chrono::DateTime<Utc>,
}

impl SyncPoint {
    fn of<R: EntityRecord>(record: &R) -> Self {
        Self {
            version: record.version(),
            updated_at: record.updated_at(),
        }
    }

    fn matches<R: EntityRecord>(&self, record: &R) -> bool {
        self.version == record.version() && self.updated_at == record.updated_at()
    }
}

/// What a store writes to its durable slot. Conflicts are intentionally
/// excluded: they are session state pending resolution, not replicated data.
#[derive(Serialize, Deserialize)]
pub(crate) struct PersistedState<R> {
    pub(crate) records: Vec<R>,
    pub(crate) audit: AuditTrail,
    pub(crate) pending: PendingLedger,
}

/// The generic store engine. See the module docs for the mutation protocol.
pub struct EntityStore<R: EntityRecord> {
    records: Vec<R>,
    synced: HashMap<EntityId, SyncPoint>,
    audit: AuditTrail,
    conflicts: Vec<Conflict<R>>,
    pending: PendingLedger,
    hooks: Box<dyn StoreHooks<R>>,
    storage: Arc<dyn KeyValueStorage>,
    bus: Arc<dyn SyncBus>,
    config: StoreConfig,
    storage_key: String,
    subscribers: Vec<Sender<StoreEvent>>,
}

fn snapshot<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

/// Storage slot name for an entity kind.
pub fn storage_key_for(kind: portico_domain::EntityKind) -> String {
    format!("{kind}-store")
}

impl<R: EntityRecord> EntityStore<R> {
    /// Open a store over the given storage and bus, hydrating any state
    /// previously persisted under this kind's slot.
    pub fn open(
        storage: Arc<dyn KeyValueStorage>,
        bus: Arc<dyn SyncBus>,
        config: StoreConfig,
        hooks: Box<dyn StoreHooks<R>>,
    ) -> Result<Self> {
        let storage_key = storage_key_for(R::KIND);
        let mut store = Self {
            records: Vec::new(),
            synced: HashMap::new(),
            audit: AuditTrail::new(),
            conflicts: Vec::new(),
            pending: PendingLedger::new(),
            hooks,
            storage,
            bus,
            config,
            storage_key,
            subscribers: Vec::new(),
        };
        if let Some(json) = store.storage.get(&store.storage_key)? {
            let state: PersistedState<R> = serde_json::from_str(&json)?;
            store.records = state.records;
            store.audit = state.audit;
            store.pending = state.pending;
            // Hydrated state came from the shared slot, so it is the
            // common baseline for every record
            for record in &store.records {
                store.synced.insert(record.id(), SyncPoint::of(record));
            }
        }
        Ok(store)
    }

    /// Create a record from a draft. Assigns id, version 1, timestamps, the
    /// kind's initial status, and the configured actor.
    pub fn create(&mut self, draft: R::Draft) -> Result<EntityId> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let record = R::from_draft(draft, id, now, self.config.actor.clone());
        let after = snapshot(&record)?;

        // The creation broadcast below makes this state the shared baseline
        self.synced.insert(id, SyncPoint::of(&record));
        self.records.push(record);
        let audit_id = self.audit.append(AuditEntry::new(
            R::KIND,
            id,
            AuditOperation::Create,
            self.config.actor.clone(),
            now,
            None,
            Some(after),
        ));
        let op_id = self
            .pending
            .record_success(R::KIND, id, OperationKind::Create, Some(audit_id));
        debug!(kind = %R::KIND, entity = %id, "record created");
        self.commit(op_id)?;
        self.emit(StoreEvent::Created(id));
        Ok(id)
    }

    /// Apply a partial update. When `expected_version` is supplied and does
    /// not match the stored version, nothing is mutated: the attempted
    /// change is staged as a conflict and a `VersionConflict` error carries
    /// its id back to the caller.
    pub fn update(
        &mut self,
        id: EntityId,
        patch: R::Patch,
        expected_version: Option<u64>,
    ) -> Result<()> {
        let Some(index) = self.index_of(id) else {
            return Err(self.fail_validation(id, OperationKind::Update, self.not_found(id)));
        };
        let before = self.records[index].clone();
        if let Some(expected) = expected_version {
            if expected != before.version() {
                return Err(self.stage_stale_write(before, patch, expected));
            }
        }
        let mut after = before.clone();
        patch.apply_to(&mut after);
        self.commit_replace(index, before, after, OperationKind::Update)
    }

    /// Delete a record. Rejected while other records of this kind depend on
    /// it (the hub enforces cross-kind dependents).
    pub fn delete(&mut self, id: EntityId) -> Result<()> {
        let Some(index) = self.index_of(id) else {
            return Err(self.fail_validation(id, OperationKind::Delete, self.not_found(id)));
        };
        let dependents = self.hooks.dependents_of(id, &self.records);
        if dependents > 0 {
            let err = StoreError::HasDependents {
                kind: R::KIND,
                id,
                dependents,
            };
            return Err(self.fail_validation(id, OperationKind::Delete, err));
        }

        let now = Utc::now();
        let before = snapshot(&self.records[index])?;
        self.records.remove(index);
        self.synced.remove(&id);
        let audit_id = self.audit.append(AuditEntry::new(
            R::KIND,
            id,
            AuditOperation::Delete,
            self.config.actor.clone(),
            now,
            Some(before),
            None,
        ));
        let op_id = self
            .pending
            .record_success(R::KIND, id, OperationKind::Delete, Some(audit_id));
        debug!(kind = %R::KIND, entity = %id, "record deleted");
        self.commit(op_id)?;
        self.emit(StoreEvent::Deleted(id));
        Ok(())
    }

    /// Change a record's status along the kind's transition table. Legal
    /// transitions share the update commit path: version bump, refreshed
    /// `updatedAt`, status-triggered side fields, one audit entry.
    pub fn transition(&mut self, id: EntityId, target: R::Status) -> Result<()> {
        let Some(index) = self.index_of(id) else {
            return Err(self.fail_validation(id, OperationKind::StatusChange, self.not_found(id)));
        };
        let from = self.records[index].status();
        if !from.can_transition_to(&target) {
            let err = StoreError::IllegalTransition {
                kind: R::KIND,
                id,
                from: from.to_string(),
                to: target.to_string(),
                valid: from
                    .valid_transitions()
                    .iter()
                    .map(|status| status.to_string())
                    .collect(),
            };
            return Err(self.fail_validation(id, OperationKind::StatusChange, err));
        }
        if let Err(err) =
            self.hooks
                .before_transition(&self.records[index], &target, &self.records)
        {
            return Err(self.fail_validation(id, OperationKind::StatusChange, err));
        }

        let before = self.records[index].clone();
        let mut after = before.clone();
        after.apply_status(target, Utc::now());
        self.commit_replace(index, before, after, OperationKind::StatusChange)
    }

    /// Apply `update` semantics to each id independently; one failure does
    /// not roll back the others.
    pub fn bulk_update(
        &mut self,
        ids: &[EntityId],
        patch: R::Patch,
    ) -> Vec<(EntityId, Result<()>)> {
        ids.iter()
            .map(|&id| (id, self.update(id, patch.clone(), None)))
            .collect()
    }

    /// Merge a remote full-list broadcast into local state. New ids are
    /// appended. For known ids the per-record sync point decides: identical
    /// states converge; a locally untouched record fast-forwards to a newer
    /// remote; a remote still sitting at the sync point is an old list and
    /// skipped; anything else means both sides changed and is staged as a
    /// conflict, never applied.
    pub fn merge_remote(&mut self, incoming: Vec<R>) -> Result<MergeOutcome> {
        let mut outcome = MergeOutcome::default();
        for remote in incoming {
            let id = remote.id();
            match self.index_of(id) {
                None => {
                    self.synced.insert(id, SyncPoint::of(&remote));
                    self.records.push(remote);
                    outcome.added += 1;
                }
                Some(index) => {
                    let local = &self.records[index];
                    let point = self.synced.get(&id).copied();
                    if local.version() == remote.version()
                        && local.updated_at() == remote.updated_at()
                    {
                        self.synced.insert(id, SyncPoint::of(&remote));
                        outcome.converged += 1;
                    } else if point.map_or(false, |p| p.matches(&remote)) {
                        // The remote list has not seen our newer state yet;
                        // nothing to take from it
                        outcome.converged += 1;
                    } else if point.map_or(false, |p| p.matches(local)) {
                        if remote.version() > local.version()
                            || (remote.version() == local.version()
                                && remote.updated_at() > local.updated_at())
                        {
                            debug!(
                                kind = %R::KIND,
                                entity = %id,
                                version = remote.version(),
                                "fast-forwarding untouched record to remote state"
                            );
                            self.synced.insert(id, SyncPoint::of(&remote));
                            self.records[index] = remote;
                            outcome.fast_forwarded += 1;
                            self.emit(StoreEvent::Updated(id));
                        } else {
                            // Older than the state we already share
                            outcome.converged += 1;
                        }
                    } else if self.conflicts.iter().any(|c| c.covers(&remote)) {
                        // Same divergence already staged; the bus and the
                        // storage watch both deliver each broadcast.
                        continue;
                    } else {
                        let conflict = Conflict::new(local.clone(), remote);
                        let conflict_id = conflict.id;
                        warn!(
                            kind = %R::KIND,
                            entity = %conflict.entity_id,
                            local_version = conflict.local.version(),
                            remote_version = conflict.proposed.version(),
                            "two-sided divergence staged as conflict"
                        );
                        self.conflicts.push(conflict);
                        outcome.conflicts += 1;
                        self.emit(StoreEvent::ConflictDetected(conflict_id));
                    }
                }
            }
        }
        if outcome.added > 0 || outcome.fast_forwarded > 0 {
            // Persist the absorbed records, but do not re-broadcast: the
            // originating tab already owns this list state.
            self.persist()?;
        }
        if outcome.added > 0 || outcome.fast_forwarded > 0 || outcome.conflicts > 0 {
            self.emit(StoreEvent::Merged {
                added: outcome.added,
                fast_forwarded: outcome.fast_forwarded,
                conflicts: outcome.conflicts,
            });
        }
        Ok(outcome)
    }

    /// Resolve a staged conflict. `ManualMerge` is not automated: the
    /// conflict stays queued for a UI-driven field-level merge.
    pub fn resolve_conflict(
        &mut self,
        conflict_id: Uuid,
        resolution: ConflictResolution,
    ) -> Result<()> {
        let Some(position) = self
            .conflicts
            .iter()
            .position(|conflict| conflict.id == conflict_id)
        else {
            return Err(StoreError::ConflictNotFound(conflict_id));
        };
        match resolution {
            ConflictResolution::KeepLocal => {
                self.conflicts.remove(position);
            }
            ConflictResolution::AcceptRemote => {
                let conflict = self.conflicts.remove(position);
                self.synced
                    .insert(conflict.entity_id, SyncPoint::of(&conflict.proposed));
                match self.index_of(conflict.entity_id) {
                    Some(index) => self.records[index] = conflict.proposed,
                    None => self.records.push(conflict.proposed),
                }
                self.persist_and_broadcast()?;
            }
            ConflictResolution::ManualMerge => {
                return Err(StoreError::ManualMergeRequired(conflict_id));
            }
        }
        self.emit(StoreEvent::ConflictResolved(conflict_id));
        Ok(())
    }

    /// Compensate a previously committed operation: a create rolls back by
    /// deletion, an update by restoring the prior snapshot as a new version,
    /// a delete by reinserting the removed record.
    pub fn rollback_operation(&mut self, operation_id: Uuid) -> Result<()> {
        let operation = self
            .pending
            .get(operation_id)
            .cloned()
            .ok_or(StoreError::OperationNotFound(operation_id))?;
        let audit_id = operation
            .audit_id
            .ok_or(StoreError::OperationNotFound(operation_id))?;
        let entry = self
            .audit
            .get(audit_id)
            .cloned()
            .ok_or(StoreError::OperationNotFound(operation_id))?;
        let entity_id = entry.entity_id;

        match entry.operation {
            AuditOperation::Create => {
                let Some(index) = self.index_of(entity_id) else {
                    return Err(self.not_found(entity_id));
                };
                let now = Utc::now();
                let before = snapshot(&self.records[index])?;
                self.records.remove(index);
                self.synced.remove(&entity_id);
                let audit_id = self.audit.append(AuditEntry::new(
                    R::KIND,
                    entity_id,
                    AuditOperation::Rollback,
                    self.config.actor.clone(),
                    now,
                    Some(before),
                    None,
                ));
                let op_id = self.pending.record_success(
                    R::KIND,
                    entity_id,
                    OperationKind::Rollback,
                    Some(audit_id),
                );
                self.pending.mark_rolled_back(operation_id);
                self.commit(op_id)?;
                self.emit(StoreEvent::Deleted(entity_id));
            }
            AuditOperation::Update | AuditOperation::Rollback => {
                let Some(index) = self.index_of(entity_id) else {
                    return Err(self.not_found(entity_id));
                };
                let prior = entry
                    .before
                    .ok_or(StoreError::OperationNotFound(operation_id))?;
                let restored: R = serde_json::from_value(prior)?;
                let before = self.records[index].clone();
                self.pending.mark_rolled_back(operation_id);
                self.commit_replace(index, before, restored, OperationKind::Rollback)?;
            }
            AuditOperation::Delete => {
                let prior = entry
                    .before
                    .ok_or(StoreError::OperationNotFound(operation_id))?;
                let mut restored: R = serde_json::from_value(prior)?;
                let now = Utc::now();
                restored.set_version(restored.version() + 1);
                restored.touch(now);
                let after = snapshot(&restored)?;
                let restored_id = restored.id();
                self.synced.insert(restored_id, SyncPoint::of(&restored));
                self.records.push(restored);
                let audit_id = self.audit.append(AuditEntry::new(
                    R::KIND,
                    restored_id,
                    AuditOperation::Rollback,
                    self.config.actor.clone(),
                    now,
                    None,
                    Some(after),
                ));
                let op_id = self.pending.record_success(
                    R::KIND,
                    restored_id,
                    OperationKind::Rollback,
                    Some(audit_id),
                );
                self.pending.mark_rolled_back(operation_id);
                self.commit(op_id)?;
                self.emit(StoreEvent::Created(restored_id));
            }
        }
        Ok(())
    }

    /// Sweep the ledger, re-queuing retryable failures below the retry cap.
    pub fn retry_failed_operations(&mut self) -> Result<usize> {
        let requeued = self.pending.retry_failed(self.config.max_retries);
        if requeued > 0 {
            info!(kind = %R::KIND, requeued, "re-queued failed operations");
            self.persist()?;
        }
        Ok(requeued)
    }

    // ---- read-only queries ----

    pub fn get(&self, id: EntityId) -> Option<&R> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn by_status(&self, status: R::Status) -> Vec<&R> {
        self.records
            .iter()
            .filter(|record| record.status() == status)
            .collect()
    }

    pub fn conflicts(&self) -> &[Conflict<R>] {
        &self.conflicts
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn pending(&self) -> &PendingLedger {
        &self.pending
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Subscribe to change events (the UI re-render hook).
    pub fn subscribe(&mut self) -> Receiver<StoreEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    // ---- internals ----

    fn index_of(&self, id: EntityId) -> Option<usize> {
        self.records.iter().position(|record| record.id() == id)
    }

    fn not_found(&self, id: EntityId) -> StoreError {
        StoreError::NotFound { kind: R::KIND, id }
    }

    /// Record a validation failure in the ledger (non-retryable) and hand
    /// the error back. Validation happens before any mutation.
    fn fail_validation(
        &mut self,
        id: EntityId,
        operation: OperationKind,
        err: StoreError,
    ) -> StoreError {
        self.pending
            .record_failure(R::KIND, id, operation, err.to_string(), false);
        err
    }

    fn stage_stale_write(&mut self, local: R, patch: R::Patch, expected: u64) -> StoreError {
        let id = local.id();
        let actual = local.version();
        let mut proposed = local.clone();
        patch.apply_to(&mut proposed);
        // Versioned as if it had been applied, so accepting it later
        // replicates like any other write
        proposed.set_version(actual + 1);
        proposed.touch(Utc::now());
        let conflict = Conflict::new(local, proposed);
        let conflict_id = conflict.id;
        warn!(
            kind = %R::KIND,
            entity = %id,
            expected,
            actual,
            "stale write staged as conflict"
        );
        self.conflicts.push(conflict);
        self.pending.record_failure(
            R::KIND,
            id,
            OperationKind::Update,
            "version conflict".into(),
            false,
        );
        self.emit(StoreEvent::ConflictDetected(conflict_id));
        StoreError::VersionConflict {
            kind: R::KIND,
            id,
            expected,
            actual,
            conflict_id,
        }
    }

    /// Shared commit path for update-shaped mutations: bump version, touch
    /// `updatedAt`, swap the record in, audit, persist, broadcast.
    fn commit_replace(
        &mut self,
        index: usize,
        before: R,
        mut after: R,
        operation: OperationKind,
    ) -> Result<()> {
        let now = Utc::now();
        after.set_version(before.version() + 1);
        after.touch(now);
        let id = after.id();
        let before_snapshot = snapshot(&before)?;
        let after_snapshot = snapshot(&after)?;
        self.records[index] = after;

        let audit_operation = if operation == OperationKind::Rollback {
            AuditOperation::Rollback
        } else {
            AuditOperation::Update
        };
        let audit_id = self.audit.append(AuditEntry::new(
            R::KIND,
            id,
            audit_operation,
            self.config.actor.clone(),
            now,
            Some(before_snapshot),
            Some(after_snapshot),
        ));
        let op_id = self
            .pending
            .record_success(R::KIND, id, operation, Some(audit_id));
        debug!(kind = %R::KIND, entity = %id, op = ?operation, "record updated");
        self.commit(op_id)?;
        self.emit(StoreEvent::Updated(id));
        Ok(())
    }

    /// Durable write + broadcast; a failure downgrades the ledger entry so
    /// the retry sweep can replay it. The in-memory mutation stands
    /// (optimistic-first).
    fn commit(&mut self, op_id: Uuid) -> Result<()> {
        match self.persist_and_broadcast() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.pending
                    .mark_failed(op_id, err.to_string(), err.is_retryable());
                Err(err)
            }
        }
    }

    fn persist_and_broadcast(&self) -> Result<()> {
        self.persist()?;
        let payload = serde_json::to_string(&self.records)?;
        self.bus.publish(SyncMessage {
            origin: self.config.tab_id,
            kind: R::KIND,
            payload,
        });
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let state = PersistedState {
            records: self.records.clone(),
            audit: self.audit.clone(),
            pending: self.pending.clone(),
        };
        let json = serde_json::to_string(&state)?;
        self.storage
            .set(&self.storage_key, &json, self.config.tab_id)?;
        Ok(())
    }

    fn emit(&mut self, event: StoreEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}
