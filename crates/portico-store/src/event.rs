//! Events emitted by a store when its state changes
//!
//! UI layers subscribe to these to re-render after mutations and merges.

use portico_domain::EntityId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreEvent {
    Created(EntityId),
    Updated(EntityId),
    Deleted(EntityId),
    ConflictDetected(Uuid),
    ConflictResolved(Uuid),
    Merged {
        added: usize,
        fast_forwarded: usize,
        conflicts: usize,
    },
}
