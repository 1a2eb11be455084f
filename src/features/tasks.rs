use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Response;
use crate::db::{find_task_row, list_task_rows, TaskRow};
use crate::error::{Failure, Outcome, ValidationError};
use crate::models::{Audit, FamilyMember, Task, TaskDraft, TaskPriority, TaskStatus};
use crate::pipeline::RequestContext;
use crate::validation::{Rules, Validate};

pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 1000;

// ============================================================
// Requests
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_to_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTask {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTask {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriorityDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeTaskPriority {
    pub task_id: Uuid,
    pub direction: PriorityDirection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTasks {
    #[serde(default)]
    pub overdue_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskById {
    pub task_id: Uuid,
}

// ============================================================
// Validation
// ============================================================

impl Validate for CreateTask {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_empty("title", &self.title, "Title is required.")
            .max_len(
                "title",
                &self.title,
                TITLE_MAX,
                "Title must not exceed 200 characters.",
            )
            .max_len_opt(
                "description",
                self.description.as_deref(),
                DESCRIPTION_MAX,
                "Description must not exceed 1000 characters.",
            )
            .finish()
    }
}

impl Validate for CompleteTask {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_nil("task_id", self.task_id, "Task id is required.")
            .finish()
    }
}

impl Validate for DeleteTask {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_nil("task_id", self.task_id, "Task id is required.")
            .finish()
    }
}

impl Validate for ChangeTaskPriority {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_nil("task_id", self.task_id, "Task id is required.")
            .finish()
    }
}

impl Validate for GetTaskById {
    fn validate(&self) -> Vec<ValidationError> {
        Rules::new()
            .not_nil("task_id", self.task_id, "Task id is required.")
            .finish()
    }
}

// ============================================================
// Projections
// ============================================================

/// Task as shown in lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDto {
    pub id: Uuid,
    pub title: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub is_overdue: bool,
    pub assigned_to_id: Option<Uuid>,
    pub assigned_to_name: Option<String>,
}

/// A single task with everything known about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDetailDto {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assigned_to_id: Option<Uuid>,
    pub assigned_to_name: Option<String>,
    pub audit: Audit,
}

impl TaskDto {
    fn project(row: TaskRow, now: DateTime<Utc>) -> Self {
        let TaskRow {
            task,
            assignee_name,
        } = row;
        Self {
            id: task.id,
            is_overdue: task.is_overdue(now),
            priority: task.priority(),
            status: task.status(),
            title: task.title,
            due_date: task.due_date,
            assigned_to_id: task.assigned_to_id,
            assigned_to_name: assignee_name,
        }
    }
}

impl TaskDetailDto {
    fn project(row: TaskRow, now: DateTime<Utc>) -> Self {
        let TaskRow {
            task,
            assignee_name,
        } = row;
        Self {
            id: task.id,
            is_overdue: task.is_overdue(now),
            priority: task.priority(),
            status: task.status(),
            completed_at: task.completed_at(),
            title: task.title,
            description: task.description,
            due_date: task.due_date,
            created_at: task.created_at,
            assigned_to_id: task.assigned_to_id,
            assigned_to_name: assignee_name,
            audit: task.audit,
        }
    }
}

fn task_not_found(id: Uuid) -> Failure {
    Failure::not_found(format!("Task {id}"))
}

// ============================================================
// Handlers
// ============================================================

pub(crate) async fn create_task(cmd: &CreateTask, ctx: &mut RequestContext) -> Outcome<Response> {
    if let Some(member_id) = cmd.assigned_to_id {
        if ctx.find::<FamilyMember>(member_id).await?.is_none() {
            return Err(Failure::not_found(format!("Member {member_id}")));
        }
    }

    let draft = TaskDraft {
        title: cmd.title.clone(),
        description: cmd.description.clone(),
        priority: cmd.priority,
        due_date: cmd.due_date,
        assigned_to_id: cmd.assigned_to_id,
    };
    let (task, created) = Task::create(draft, ctx.now());
    let id = task.id;
    ctx.add_with_events(task, vec![created]);

    Ok(Response::Created(id))
}

pub(crate) async fn complete_task(cmd: &CompleteTask, ctx: &mut RequestContext) -> Outcome<Response> {
    let now = ctx.now();
    let task = ctx
        .find::<Task>(cmd.task_id)
        .await?
        .ok_or_else(|| task_not_found(cmd.task_id))?;

    let completed = task.complete(now)?;
    ctx.raise::<Task>(cmd.task_id, completed)?;

    Ok(Response::Done)
}

pub(crate) async fn delete_task(cmd: &DeleteTask, ctx: &mut RequestContext) -> Outcome<Response> {
    ctx.remove::<Task>(cmd.task_id)
        .await?
        .ok_or_else(|| task_not_found(cmd.task_id))?;

    Ok(Response::Done)
}

pub(crate) async fn change_task_priority(
    cmd: &ChangeTaskPriority,
    ctx: &mut RequestContext,
) -> Outcome<Response> {
    let task = ctx
        .find::<Task>(cmd.task_id)
        .await?
        .ok_or_else(|| task_not_found(cmd.task_id))?;

    match cmd.direction {
        PriorityDirection::Up => task.increase_priority()?,
        PriorityDirection::Down => task.decrease_priority()?,
    }

    Ok(Response::Done)
}

pub(crate) async fn get_tasks(query: &GetTasks, ctx: &mut RequestContext) -> Outcome<Response> {
    let now = ctx.now();
    let rows = ctx.with_conn(list_task_rows).await?;

    let tasks = rows
        .into_iter()
        .filter(|row| !query.overdue_only || row.task.is_overdue(now))
        .map(|row| TaskDto::project(row, now))
        .collect();

    Ok(Response::Tasks(tasks))
}

pub(crate) async fn get_task_by_id(query: &GetTaskById, ctx: &mut RequestContext) -> Outcome<Response> {
    let now = ctx.now();
    let id = query.task_id;
    let row = ctx
        .with_conn(move |conn| find_task_row(conn, id))
        .await?
        .ok_or_else(|| task_not_found(id))?;

    Ok(Response::Task(TaskDetailDto::project(row, now)))
}
