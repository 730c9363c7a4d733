//! The store hub: one store per entity kind plus cross-kind operations
//!
//! A hub is one "tab": it owns the four kind stores over a shared storage
//! backend and sync bus, and it is the merge point for everything other
//! tabs broadcast. Cross-kind rules that no single store can enforce live
//! here: workflow deletion safety against task references, and the lease
//! renewal flow that spans a lease and a new workflow.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use portico_domain::{
    EntityId, EntityKind, EntityRecord, LeasePatch, LeaseStatus, RenewalStatus, WorkflowDraft,
};

use crate::config::StoreConfig;
use crate::engine::{storage_key_for, EntityStore, MergeOutcome, NoHooks, PersistedState};
use crate::error::{Result, StoreError};
use crate::leases::{LeaseStore, SweepOutcome};
use crate::maintenance::MaintenanceStore;
use crate::storage::{KeyValueStorage, StorageEvent};
use crate::sync::{SyncBus, SyncMessage};
use crate::tasks::{TaskHooks, TaskStore};
use crate::workflows::WorkflowStore;

/// Aggregate counts from one [`StoreHub::pump`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub messages: usize,
    pub added: usize,
    pub fast_forwarded: usize,
    pub converged: usize,
    pub conflicts: usize,
}

impl SyncReport {
    fn absorb(&mut self, outcome: MergeOutcome) {
        self.messages += 1;
        self.added += outcome.added;
        self.fast_forwarded += outcome.fast_forwarded;
        self.converged += outcome.converged;
        self.conflicts += outcome.conflicts;
    }
}

/// One execution context over the shared storage and bus.
pub struct StoreHub {
    pub workflows: WorkflowStore,
    pub tasks: TaskStore,
    pub leases: LeaseStore,
    pub maintenance: MaintenanceStore,
    tab_id: Uuid,
    bus_rx: Receiver<SyncMessage>,
    storage_rx: Receiver<StorageEvent>,
}

impl StoreHub {
    /// Open all four stores, hydrating each from its storage slot, and
    /// subscribe to both sync channels. Subscriptions are taken before the
    /// stores open so no broadcast can slip past during startup.
    pub fn open(
        storage: Arc<dyn KeyValueStorage>,
        bus: Arc<dyn SyncBus>,
        config: StoreConfig,
    ) -> Result<Self> {
        let bus_rx = bus.subscribe();
        let storage_rx = storage.watch();
        let tab_id = config.tab_id;

        let workflows = EntityStore::open(
            storage.clone(),
            bus.clone(),
            config.clone(),
            Box::new(NoHooks),
        )?;
        let tasks = EntityStore::open(
            storage.clone(),
            bus.clone(),
            config.clone(),
            Box::new(TaskHooks),
        )?;
        let leases = EntityStore::open(
            storage.clone(),
            bus.clone(),
            config.clone(),
            Box::new(NoHooks),
        )?;
        let maintenance = EntityStore::open(storage, bus, config, Box::new(NoHooks))?;

        Ok(Self {
            workflows,
            tasks,
            leases,
            maintenance,
            tab_id,
            bus_rx,
            storage_rx,
        })
    }

    /// Drain both sync channels, merging every delivered list into the
    /// matching store. Safe to call repeatedly; self-originated broadcasts
    /// are dropped by origin tag and duplicate divergences are deduplicated
    /// at the conflict queue.
    pub fn pump(&mut self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        while let Ok(message) = self.bus_rx.try_recv() {
            if message.origin == self.tab_id {
                continue;
            }
            let outcome = match message.kind {
                EntityKind::Workflow => merge_list(&mut self.workflows, &message.payload)?,
                EntityKind::Task => merge_list(&mut self.tasks, &message.payload)?,
                EntityKind::Lease => merge_list(&mut self.leases, &message.payload)?,
                EntityKind::MaintenanceRequest => {
                    merge_list(&mut self.maintenance, &message.payload)?
                }
            };
            report.absorb(outcome);
        }

        while let Ok(event) = self.storage_rx.try_recv() {
            if event.origin == self.tab_id {
                continue;
            }
            let outcome = if event.key == storage_key_for(EntityKind::Workflow) {
                merge_state(&mut self.workflows, &event.value)?
            } else if event.key == storage_key_for(EntityKind::Task) {
                merge_state(&mut self.tasks, &event.value)?
            } else if event.key == storage_key_for(EntityKind::Lease) {
                merge_state(&mut self.leases, &event.value)?
            } else if event.key == storage_key_for(EntityKind::MaintenanceRequest) {
                merge_state(&mut self.maintenance, &event.value)?
            } else {
                debug!(key = %event.key, "ignoring storage event for foreign key");
                continue;
            };
            report.absorb(outcome);
        }

        if report.conflicts > 0 {
            warn!(conflicts = report.conflicts, "sync pump staged conflicts");
        }
        Ok(report)
    }

    /// Delete a workflow, rejected while tasks are attached to it or a
    /// lease renewal references it.
    pub fn delete_workflow(&mut self, id: EntityId) -> Result<()> {
        let attached_tasks = self.tasks.tasks_by_workflow(id).len();
        let renewals = self
            .leases
            .records()
            .iter()
            .filter(|lease| lease.renewal_workflow_id == Some(id))
            .count();
        let dependents = attached_tasks + renewals;
        if dependents > 0 {
            return Err(StoreError::HasDependents {
                kind: EntityKind::Workflow,
                id,
                dependents,
            });
        }
        self.workflows.delete(id)
    }

    /// Start a renewal for a lease: creates a draft workflow to track the
    /// renewal and links the lease to it. If linking fails, the workflow
    /// creation is compensated away.
    pub fn initiate_renewal(
        &mut self,
        lease_id: EntityId,
        terms: Option<String>,
    ) -> Result<EntityId> {
        let lease = self
            .leases
            .get(lease_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Lease,
                id: lease_id,
            })?;
        if let Some(workflow) = lease.renewal_workflow_id {
            return Err(StoreError::RenewalInProgress {
                lease: lease_id,
                workflow,
            });
        }
        if lease.status == LeaseStatus::Renewed {
            return Err(StoreError::IllegalTransition {
                kind: EntityKind::Lease,
                id: lease_id,
                from: lease.status.to_string(),
                to: LeaseStatus::Renewed.to_string(),
                valid: Vec::new(),
            });
        }

        let workflow_id = self.workflows.create(WorkflowDraft {
            name: format!("Lease renewal: {}", lease.property_name),
            description: format!(
                "Renewal of the {} lease for {}",
                lease.property_name, lease.tenant
            ),
        })?;
        let link = LeasePatch {
            renewal_status: Some(RenewalStatus::Draft),
            renewal_workflow_id: Some(workflow_id),
            renewal_terms: terms,
            ..Default::default()
        };
        if let Err(err) = self.leases.update(lease_id, link, None) {
            let _ = self.workflows.delete(workflow_id);
            return Err(err);
        }
        debug!(lease = %lease_id, workflow = %workflow_id, "renewal initiated");
        Ok(workflow_id)
    }

    /// Run the lease expiry sweep against `today`.
    pub fn sweep_leases(&mut self, today: NaiveDate) -> Result<SweepOutcome> {
        self.leases.sweep_expiry(today)
    }

    /// Sweep every store's ledger, re-queuing retryable failures.
    pub fn retry_failed_operations(&mut self) -> Result<usize> {
        Ok(self.workflows.retry_failed_operations()?
            + self.tasks.retry_failed_operations()?
            + self.leases.retry_failed_operations()?
            + self.maintenance.retry_failed_operations()?)
    }
}

fn merge_list<R: EntityRecord>(store: &mut EntityStore<R>, payload: &str) -> Result<MergeOutcome> {
    let records: Vec<R> = serde_json::from_str(payload)?;
    store.merge_remote(records)
}

fn merge_state<R: EntityRecord>(store: &mut EntityStore<R>, payload: &str) -> Result<MergeOutcome> {
    let state: PersistedState<R> = serde_json::from_str(payload)?;
    store.merge_remote(state.records)
}
