//! End-to-end lifecycle over a single hub: a workflow with attached tasks
//! moves through its status machine while versioning, auditing, and
//! deletion safety hold at every step.

use std::sync::Arc;

use portico_domain::{TaskDraft, TaskStatus, WorkflowDraft, WorkflowStatus};
use portico_store::{
    AuditOperation, MemoryBus, MemoryStorage, OperationStatus, StoreConfig, StoreError, StoreHub,
};

fn open_hub() -> StoreHub {
    StoreHub::open(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryBus::new()),
        StoreConfig::default(),
    )
    .unwrap()
}

#[test]
fn workflow_lifecycle_with_attached_tasks() {
    let mut hub = open_hub();

    let workflow_id = hub
        .workflows
        .create(WorkflowDraft {
            name: "Unit 4B turnover".into(),
            description: "Prepare the unit for the next tenant".into(),
        })
        .unwrap();
    assert_eq!(
        hub.workflows.get(workflow_id).unwrap().status,
        WorkflowStatus::Draft
    );

    // Activation bumps version and audits
    hub.workflows
        .transition(workflow_id, WorkflowStatus::Active)
        .unwrap();
    let workflow = hub.workflows.get(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Active);
    assert_eq!(workflow.version, 2);

    // Active cannot go back to draft; the error names the legal moves
    let err = hub
        .workflows
        .transition(workflow_id, WorkflowStatus::Draft)
        .unwrap_err();
    let StoreError::IllegalTransition { valid, .. } = err else {
        panic!("expected IllegalTransition, got {err:?}");
    };
    assert_eq!(valid, vec!["paused", "completed", "archived"]);

    // Two tasks, the second depending on the first
    let paint = hub
        .tasks
        .create(TaskDraft {
            title: "Paint walls".into(),
            parent_workflow_id: Some(workflow_id),
            ..Default::default()
        })
        .unwrap();
    let inspect = hub
        .tasks
        .create(TaskDraft {
            title: "Final inspection".into(),
            parent_workflow_id: Some(workflow_id),
            ..Default::default()
        })
        .unwrap();
    hub.tasks.add_dependency(inspect, paint).unwrap();
    assert_eq!(hub.tasks.get(inspect).unwrap().dependencies, vec![paint]);

    hub.tasks.transition(paint, TaskStatus::Completed).unwrap();
    hub.tasks
        .transition(inspect, TaskStatus::Completed)
        .unwrap();
    assert!(hub.tasks.get(inspect).unwrap().completed_at.is_some());

    hub.workflows
        .transition(workflow_id, WorkflowStatus::Completed)
        .unwrap();
    assert_eq!(hub.workflows.get(workflow_id).unwrap().version, 3);

    // Deletion stays blocked until the tasks are gone
    let err = hub.delete_workflow(workflow_id).unwrap_err();
    assert!(matches!(
        err,
        StoreError::HasDependents { dependents: 2, .. }
    ));
    hub.tasks.delete(inspect).unwrap();
    hub.tasks.delete(paint).unwrap();
    hub.delete_workflow(workflow_id).unwrap();
    assert!(hub.workflows.get(workflow_id).is_none());

    // Every mutation on the workflow left an audit entry
    let trail = hub.workflows.audit().for_entity(workflow_id);
    assert_eq!(trail.len(), 4); // create, activate, complete, delete
    assert_eq!(trail[0].operation, AuditOperation::Create);
    assert_eq!(trail[3].operation, AuditOperation::Delete);
    assert!(trail.iter().all(|entry| entry.actor == "current-user"));
}

#[test]
fn every_successful_operation_lands_in_the_ledger() {
    let mut hub = open_hub();
    let id = hub
        .workflows
        .create(WorkflowDraft {
            name: "Ledgered".into(),
            description: String::new(),
        })
        .unwrap();
    hub.workflows
        .transition(id, WorkflowStatus::Active)
        .unwrap();

    let ledger = hub.workflows.pending();
    assert_eq!(ledger.len(), 2);
    assert!(ledger
        .entries()
        .iter()
        .all(|op| op.status == OperationStatus::Success && op.audit_id.is_some()));
}

#[test]
fn failed_validation_is_ledgered_as_non_retryable() {
    let mut hub = open_hub();
    let id = hub
        .workflows
        .create(WorkflowDraft {
            name: "w".into(),
            description: String::new(),
        })
        .unwrap();
    hub.workflows
        .transition(id, WorkflowStatus::Archived)
        .unwrap();
    // Archived is terminal
    assert!(hub
        .workflows
        .transition(id, WorkflowStatus::Active)
        .is_err());

    let failed = hub.workflows.pending().failed();
    assert_eq!(failed.len(), 1);
    assert!(!failed[0].retryable);

    // The retry sweep must not touch validation failures
    assert_eq!(hub.retry_failed_operations().unwrap(), 0);
    assert_eq!(hub.workflows.pending().failed().len(), 1);
}
