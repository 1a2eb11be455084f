use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Audit, DomainEvent};
use crate::error::{Failure, Severity, ValidationError};

/// A household chore, errand or appointment.
///
/// The business rules live here rather than in handlers:
/// - `completed_at` is set if and only if `status` is [`TaskStatus::Done`].
/// - Priority only moves one step at a time and never leaves `[Low, High]`.
///
/// Methods that raise domain events return them to the caller instead of
/// storing them on the task; the unit of work queues them until commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub(crate) priority: TaskPriority,
    pub(crate) status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<Uuid>,
    pub audit: Audit,
}

/// Fields a caller chooses when creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<Uuid>,
}

impl Task {
    /// Build a new `Todo` task and the [`DomainEvent::TaskCreated`] announcing it.
    pub fn create(draft: TaskDraft, now: DateTime<Utc>) -> (Self, DomainEvent) {
        let task = Self {
            id: Uuid::new_v4(),
            title: draft.title,
            description: draft.description,
            priority: draft.priority,
            status: TaskStatus::Todo,
            due_date: draft.due_date,
            created_at: now,
            completed_at: None,
            assigned_to_id: draft.assigned_to_id,
            audit: Audit::new(now),
        };
        let event = DomainEvent::TaskCreated(task.clone());
        (task, event)
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Mark the task done.
    ///
    /// Fails with [`TaskRuleViolation::AlreadyCompleted`] when the task is
    /// already done, leaving it untouched.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<DomainEvent, TaskRuleViolation> {
        if self.status == TaskStatus::Done {
            return Err(TaskRuleViolation::AlreadyCompleted(self.id));
        }

        self.status = TaskStatus::Done;
        self.completed_at = Some(now);

        Ok(DomainEvent::TaskCompleted(self.clone()))
    }

    pub fn increase_priority(&mut self) -> Result<(), TaskRuleViolation> {
        self.priority = self
            .priority
            .raised()
            .ok_or(TaskRuleViolation::HighestPriority(self.id))?;
        Ok(())
    }

    pub fn decrease_priority(&mut self) -> Result<(), TaskRuleViolation> {
        self.priority = self
            .priority
            .lowered()
            .ok_or(TaskRuleViolation::LowestPriority(self.id))?;
        Ok(())
    }

    /// Due in the past and not done yet. Computed on read, never stored.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.due_date, Some(due) if due < now) && self.status != TaskStatus::Done
    }
}

/// Ordered: `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    fn raised(self) -> Option<Self> {
        match self {
            Self::Low => Some(Self::Medium),
            Self::Medium => Some(Self::High),
            Self::High => None,
        }
    }

    fn lowered(self) -> Option<Self> {
        match self {
            Self::Low => None,
            Self::Medium => Some(Self::Low),
            Self::High => Some(Self::Medium),
        }
    }
}

/// The progress of a task.
///
/// - `Todo`: Not started
/// - `InProgress`: Someone is on it
/// - `Done`: Finished; `completed_at` is set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Business rules a task refused to break.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TaskRuleViolation {
    #[error("task {0} is already completed")]
    AlreadyCompleted(Uuid),
    #[error("task {0} already has the highest priority")]
    HighestPriority(Uuid),
    #[error("task {0} already has the lowest priority")]
    LowestPriority(Uuid),
}

impl TaskRuleViolation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyCompleted(_) => "TASK_ALREADY_COMPLETED",
            Self::HighestPriority(_) => "TASK_HIGHEST_PRIORITY",
            Self::LowestPriority(_) => "TASK_LOWEST_PRIORITY",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::AlreadyCompleted(_) => Severity::Error,
            Self::HighestPriority(_) | Self::LowestPriority(_) => Severity::Warning,
        }
    }
}

impl From<TaskRuleViolation> for ValidationError {
    fn from(rule: TaskRuleViolation) -> Self {
        ValidationError::new("id", rule.to_string(), rule.code()).with_severity(rule.severity())
    }
}

impl From<TaskRuleViolation> for Failure {
    fn from(rule: TaskRuleViolation) -> Self {
        Failure::BusinessRuleViolation(rule.into())
    }
}
