//! Task store: dependency graph rules on top of the generic engine
//!
//! The dependency graph must stay acyclic on every edge addition, and a
//! task other tasks depend on cannot be deleted. Dependencies do not gate
//! completion; they only order and protect deletion.

use portico_domain::{EntityId, EntityRecord, StatusMachine, Task, TaskPatch, TaskStatus};
use tracing::debug;

use crate::engine::{EntityStore, StoreHooks};
use crate::error::{Result, StoreError};

/// The store for [`Task`] records.
pub type TaskStore = EntityStore<Task>;

pub struct TaskHooks;

impl StoreHooks<Task> for TaskHooks {
    /// A blocked task cannot jump straight to completed. The transition
    /// table already encodes this; the guard keeps the rule explicit at the
    /// hook seam.
    fn before_transition(&self, task: &Task, target: &TaskStatus, _all: &[Task]) -> Result<()> {
        if task.status == TaskStatus::Blocked && *target == TaskStatus::Completed {
            return Err(StoreError::IllegalTransition {
                kind: Task::KIND,
                id: task.id,
                from: task.status.to_string(),
                to: target.to_string(),
                valid: task
                    .status
                    .valid_transitions()
                    .iter()
                    .map(|status| status.to_string())
                    .collect(),
            });
        }
        Ok(())
    }

    fn dependents_of(&self, id: EntityId, all: &[Task]) -> usize {
        all.iter()
            .filter(|task| task.dependencies.contains(&id))
            .count()
    }
}

impl EntityStore<Task> {
    /// Add a dependency edge, rejecting duplicates and anything that would
    /// close a cycle. The edge lands through the normal update path, so it
    /// bumps the version and appends an audit entry.
    pub fn add_dependency(&mut self, task_id: EntityId, dependency_id: EntityId) -> Result<()> {
        let task = self
            .get(task_id)
            .ok_or(StoreError::NotFound {
                kind: Task::KIND,
                id: task_id,
            })?;
        if self.get(dependency_id).is_none() {
            return Err(StoreError::NotFound {
                kind: Task::KIND,
                id: dependency_id,
            });
        }
        if task.dependencies.contains(&dependency_id) {
            return Err(StoreError::DuplicateDependency {
                task: task_id,
                dependency: dependency_id,
            });
        }
        if self.reaches(dependency_id, task_id) {
            return Err(StoreError::CircularDependency {
                task: task_id,
                dependency: dependency_id,
            });
        }

        let mut dependencies = task.dependencies.clone();
        dependencies.push(dependency_id);
        debug!(task = %task_id, dependency = %dependency_id, "dependency added");
        self.update(
            task_id,
            TaskPatch {
                dependencies: Some(dependencies),
                ..Default::default()
            },
            None,
        )
    }

    /// Remove a dependency edge.
    pub fn remove_dependency(&mut self, task_id: EntityId, dependency_id: EntityId) -> Result<()> {
        let task = self
            .get(task_id)
            .ok_or(StoreError::NotFound {
                kind: Task::KIND,
                id: task_id,
            })?;
        if !task.dependencies.contains(&dependency_id) {
            return Err(StoreError::MissingDependency {
                task: task_id,
                dependency: dependency_id,
            });
        }
        let dependencies = task
            .dependencies
            .iter()
            .copied()
            .filter(|id| *id != dependency_id)
            .collect();
        self.update(
            task_id,
            TaskPatch {
                dependencies: Some(dependencies),
                ..Default::default()
            },
            None,
        )
    }

    pub fn tasks_by_workflow(&self, workflow_id: EntityId) -> Vec<&Task> {
        self.records()
            .iter()
            .filter(|task| task.parent_workflow_id == Some(workflow_id))
            .collect()
    }

    pub fn blocked_tasks(&self) -> Vec<&Task> {
        self.by_status(TaskStatus::Blocked)
    }

    /// Depth-first reachability over dependency edges: is `target` reachable
    /// from `start`?
    fn reaches(&self, start: EntityId, target: EntityId) -> bool {
        let mut stack = vec![start];
        let mut seen = Vec::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            if let Some(task) = self.get(current) {
                stack.extend(task.dependencies.iter().copied());
            }
        }
        false
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::storage::MemoryStorage;
    use crate::sync::MemoryBus;
    use portico_domain::TaskDraft;
    use std::sync::Arc;

    fn open_store() -> TaskStore {
        let storage = Arc::new(MemoryStorage::new());
        let bus = Arc::new(MemoryBus::new());
        EntityStore::open(storage, bus, StoreConfig::default(), Box::new(TaskHooks)).unwrap()
    }

    fn task(store: &mut TaskStore, title: &str) -> EntityId {
        store
            .create(TaskDraft {
                title: title.into(),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn dependency_edge_bumps_version() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        let b = task(&mut store, "b");

        store.add_dependency(a, b).unwrap();
        let record = store.get(a).unwrap();
        assert_eq!(record.dependencies, vec![b]);
        assert_eq!(record.version, 2);
    }

    #[test]
    fn duplicate_edge_is_rejected() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        let b = task(&mut store, "b");
        store.add_dependency(a, b).unwrap();

        let err = store.add_dependency(a, b).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateDependency { .. }));
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        let b = task(&mut store, "b");
        store.add_dependency(a, b).unwrap();

        let err = store.add_dependency(b, a).unwrap_err();
        assert!(matches!(err, StoreError::CircularDependency { .. }));
    }

    #[test]
    fn transitive_cycle_is_rejected() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        let b = task(&mut store, "b");
        let c = task(&mut store, "c");
        store.add_dependency(a, b).unwrap();
        store.add_dependency(b, c).unwrap();

        let err = store.add_dependency(c, a).unwrap_err();
        assert!(matches!(err, StoreError::CircularDependency { .. }));
        // The rejected edge must not have landed
        assert!(store.get(c).unwrap().dependencies.is_empty());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        let err = store.add_dependency(a, a).unwrap_err();
        assert!(matches!(err, StoreError::CircularDependency { .. }));
    }

    #[test]
    fn remove_dependency_requires_existing_edge() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        let b = task(&mut store, "b");

        let err = store.remove_dependency(a, b).unwrap_err();
        assert!(matches!(err, StoreError::MissingDependency { .. }));

        store.add_dependency(a, b).unwrap();
        store.remove_dependency(a, b).unwrap();
        assert!(store.get(a).unwrap().dependencies.is_empty());
    }

    #[test]
    fn completion_does_not_wait_for_dependencies() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        let b = task(&mut store, "b");
        store.add_dependency(a, b).unwrap();

        // Dependencies order work and guard deletion; they do not gate
        // completion of a todo task
        store.transition(a, TaskStatus::Completed).unwrap();
        assert_eq!(store.get(a).unwrap().status, TaskStatus::Completed);
        assert!(store.get(a).unwrap().completed_at.is_some());
        assert_eq!(store.get(b).unwrap().status, TaskStatus::Todo);
    }

    #[test]
    fn blocked_task_cannot_complete() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        store.transition(a, TaskStatus::InProgress).unwrap();
        store.transition(a, TaskStatus::Blocked).unwrap();

        let err = store.transition(a, TaskStatus::Completed).unwrap_err();
        let StoreError::IllegalTransition { valid, .. } = err else {
            panic!("expected IllegalTransition, got {err:?}");
        };
        assert_eq!(valid, vec!["in_progress", "todo"]);
        assert_eq!(store.get(a).unwrap().status, TaskStatus::Blocked);
    }

    #[test]
    fn delete_blocked_while_dependents_exist() {
        let mut store = open_store();
        let a = task(&mut store, "a");
        let b = task(&mut store, "b");
        store.add_dependency(a, b).unwrap();

        let err = store.delete(b).unwrap_err();
        assert!(matches!(
            err,
            StoreError::HasDependents { dependents: 1, .. }
        ));

        store.remove_dependency(a, b).unwrap();
        store.delete(b).unwrap();
    }

    #[test]
    fn tasks_by_workflow_filters_on_parent() {
        let mut store = open_store();
        let workflow_id = uuid::Uuid::new_v4();
        store
            .create(TaskDraft {
                title: "in".into(),
                parent_workflow_id: Some(workflow_id),
                ..Default::default()
            })
            .unwrap();
        task(&mut store, "out");

        let tasks = store.tasks_by_workflow(workflow_id);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "in");
    }
}
