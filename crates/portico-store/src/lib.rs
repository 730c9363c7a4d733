//! Client-side entity synchronization and optimistic-update engine
//!
//! Four versioned entity stores (workflows, tasks, leases, maintenance
//! requests) over a shared key-value storage backend and a cross-tab sync
//! bus. Every mutation is optimistic and audited; stale writes and
//! divergent merges are parked as conflicts pending explicit resolution.
//! [`hub::StoreHub`] ties the four stores together and is the usual entry
//! point.

pub mod audit;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod event;
pub mod hub;
pub mod leases;
pub mod maintenance;
pub mod pending;
pub mod storage;
pub mod sync;
pub mod tasks;
pub mod workflows;

pub use audit::{AuditEntry, AuditOperation, AuditTrail};
pub use config::StoreConfig;
pub use conflict::{Conflict, ConflictResolution};
pub use engine::{EntityStore, MergeOutcome, NoHooks, StoreHooks};
pub use error::{Result, StorageError, StoreError};
pub use event::StoreEvent;
pub use hub::{StoreHub, SyncReport};
pub use leases::{LeaseStore, SweepOutcome};
pub use maintenance::{CostKind, CostOverrun, MaintenanceStore};
pub use pending::{OperationKind, OperationStatus, PendingLedger, PendingOperation};
pub use storage::{KeyValueStorage, MemoryStorage, StorageEvent};
pub use sync::{MemoryBus, SyncBus, SyncMessage};
pub use tasks::{TaskHooks, TaskStore};
pub use workflows::WorkflowStore;

#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;
