//! Error types for the portico store engine

use portico_domain::{EntityId, EntityKind};
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by store operations.
///
/// Validation-class errors (`NotFound`, `IllegalTransition`,
/// `CircularDependency`, `HasDependents`, dependency bookkeeping) are
/// detected before any mutation and leave state untouched.
/// `VersionConflict` is recoverable: the attempted change is parked in the
/// conflict queue pending explicit resolution, not applied and not discarded.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: EntityId },

    #[error("cannot transition {kind} {id} from {from} to {to}; valid transitions: {valid:?}")]
    IllegalTransition {
        kind: EntityKind,
        id: EntityId,
        from: String,
        to: String,
        valid: Vec<String>,
    },

    #[error("adding dependency {dependency} to task {task} would create a cycle")]
    CircularDependency {
        task: EntityId,
        dependency: EntityId,
    },

    #[error("task {task} already depends on {dependency}")]
    DuplicateDependency {
        task: EntityId,
        dependency: EntityId,
    },

    #[error("task {task} has no dependency on {dependency}")]
    MissingDependency {
        task: EntityId,
        dependency: EntityId,
    },

    #[error("lease {lease} already has renewal workflow {workflow}")]
    RenewalInProgress { lease: EntityId, workflow: EntityId },

    #[error("cannot delete {kind} {id}: {dependents} other record(s) depend on it")]
    HasDependents {
        kind: EntityKind,
        id: EntityId,
        dependents: usize,
    },

    #[error(
        "stale write on {kind} {id}: expected version {expected}, stored version {actual}; \
         conflict {conflict_id} queued for resolution"
    )]
    VersionConflict {
        kind: EntityKind,
        id: EntityId,
        expected: u64,
        actual: u64,
        conflict_id: Uuid,
    },

    #[error("conflict not found: {0}")]
    ConflictNotFound(Uuid),

    #[error("conflict {0} requires a manual field-level merge and stays queued")]
    ManualMergeRequired(Uuid),

    #[error("operation not found: {0}")]
    OperationNotFound(Uuid),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the pending-operation ledger may retry the failed operation.
    /// Validation and conflict errors are never retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Storage(_) | StoreError::Serialization(_)
        )
    }
}

/// Errors from the key-value storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
