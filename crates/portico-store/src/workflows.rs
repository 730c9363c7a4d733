//! Workflow store
//!
//! Workflows have no same-kind referential rules; cross-kind deletion
//! safety (tasks pointing at a workflow) is enforced by the hub.

use portico_domain::{Workflow, WorkflowStatus};

use crate::engine::EntityStore;

/// The store for [`Workflow`] records.
pub type WorkflowStore = EntityStore<Workflow>;

impl EntityStore<Workflow> {
    pub fn active_workflows(&self) -> Vec<&Workflow> {
        self.by_status(WorkflowStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::engine::NoHooks;
    use crate::storage::MemoryStorage;
    use crate::sync::MemoryBus;
    use portico_domain::WorkflowDraft;
    use std::sync::Arc;

    #[test]
    fn active_workflows_filters_on_status() {
        let storage = Arc::new(MemoryStorage::new());
        let bus = Arc::new(MemoryBus::new());
        let mut store: WorkflowStore =
            EntityStore::open(storage, bus, StoreConfig::default(), Box::new(NoHooks)).unwrap();

        let active = store
            .create(WorkflowDraft {
                name: "active".into(),
                description: String::new(),
            })
            .unwrap();
        store
            .create(WorkflowDraft {
                name: "draft".into(),
                description: String::new(),
            })
            .unwrap();
        store.transition(active, WorkflowStatus::Active).unwrap();

        let workflows = store.active_workflows();
        assert_eq!(workflows.len(), 1);
        assert_eq!(workflows[0].name, "active");
    }
}
