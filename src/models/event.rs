use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Task;

/// Something that already happened in the domain.
///
/// Events are raised by entity business methods, queued by the unit of work
/// next to the entity that raised them, and published once after the request's
/// commit succeeds. Each carries a snapshot of the task as committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "task", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskCreated(Task),
    TaskCompleted(Task),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskCreated(_) => "TaskCreated",
            Self::TaskCompleted(_) => "TaskCompleted",
        }
    }

    pub fn task(&self) -> &Task {
        match self {
            Self::TaskCreated(task) | Self::TaskCompleted(task) => task,
        }
    }

    pub fn entity_id(&self) -> Uuid {
        self.task().id
    }

    /// Replace the snapshot with the task's committed state, so subscribers see
    /// the stamped audit block rather than the state at the time of raising.
    pub(crate) fn rebind(self, task: &Task) -> Self {
        if self.entity_id() != task.id {
            return self;
        }
        match self {
            Self::TaskCreated(_) => Self::TaskCreated(task.clone()),
            Self::TaskCompleted(_) => Self::TaskCompleted(task.clone()),
        }
    }
}
