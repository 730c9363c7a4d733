use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique entity identifier (UUID v4).
pub type EntityId = Uuid;

/// Actor (user or agent) identifier.
pub type ActorId = String;

/// The four entity kinds managed by the portico stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Workflow,
    Task,
    Lease,
    MaintenanceRequest,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Workflow => write!(f, "workflow"),
            EntityKind::Task => write!(f, "task"),
            EntityKind::Lease => write!(f, "lease"),
            EntityKind::MaintenanceRequest => write!(f, "maintenance_request"),
        }
    }
}

/// A finite status enumeration with an explicit transition table.
///
/// Terminal states have no outgoing edges. Illegal transitions are rejected
/// by the store engine before any mutation.
pub trait StatusMachine:
    Copy
    + Eq
    + std::fmt::Debug
    + std::fmt::Display
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// The status assigned to newly created records.
    fn initial() -> Self;

    /// Check if a transition from `self` to `target` is legal.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// The set of statuses reachable from `self` in one step.
    fn valid_transitions(&self) -> Vec<Self>;

    /// A terminal status has no outgoing edges.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

/// Partial-update semantics for a record.
///
/// Patches carry only the caller-supplied fields; they never touch the
/// record's id, version, timestamps, creator, or status. Status changes go
/// through the store's transition operation.
pub trait EntityPatch<R>: Clone + std::fmt::Debug + Serialize + DeserializeOwned {
    /// Apply the populated fields of this patch to `record`.
    fn apply_to(&self, record: &mut R);
}

/// The versioned, timestamped record shape shared by all entity kinds.
///
/// `version` starts at 1 and only ever increases; `created_at` and
/// `created_by` are immutable after creation; `updated_at` is refreshed on
/// every mutation.
pub trait EntityRecord:
    Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: StatusMachine;
    type Draft;
    type Patch: EntityPatch<Self>;

    const KIND: EntityKind;

    /// Materialize a draft into a full record with engine-assigned metadata.
    fn from_draft(draft: Self::Draft, id: EntityId, now: DateTime<Utc>, created_by: ActorId)
        -> Self;

    fn id(&self) -> EntityId;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
    fn status(&self) -> Self::Status;

    /// Set the status along with any status-triggered side fields
    /// (for example a completion timestamp).
    fn apply_status(&mut self, status: Self::Status, now: DateTime<Utc>);

    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    /// Refresh the modification timestamp.
    fn touch(&mut self, now: DateTime<Utc>);

    fn created_by(&self) -> &str;
}
