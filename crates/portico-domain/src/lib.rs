//! Portico domain model
//!
//! This crate defines the four entity kinds managed by the portico suite:
//!
//! - **Workflow**: multi-step processes (draft→active→paused/completed→archived)
//! - **Task**: units of work with an acyclic dependency graph
//! - **Lease**: property leases with an expiry/renewal lifecycle
//! - **MaintenanceRequest**: work orders with cost tracking
//!
//! All four share the same versioned, timestamped record shape expressed by
//! the [`EntityRecord`] trait; each status enum implements [`StatusMachine`]
//! with an explicit transition table. The crate is pure data: the store
//! engine, persistence, and sync layers live in `portico-store`.

pub mod entity;
pub mod lease;
pub mod maintenance;
pub mod task;
pub mod workflow;

pub use entity::{ActorId, EntityId, EntityKind, EntityPatch, EntityRecord, StatusMachine};
pub use lease::{Lease, LeaseDraft, LeasePatch, LeaseStatus, RenewalStatus};
pub use maintenance::{
    MaintenanceDraft, MaintenancePatch, MaintenanceRequest, MaintenanceStatus, Priority,
};
pub use task::{Task, TaskDraft, TaskPatch, TaskStatus};
pub use workflow::{Workflow, WorkflowDraft, WorkflowPatch, WorkflowStatus};
