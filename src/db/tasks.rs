use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::change_set::{ChangeSet, EntityKind, EntitySet, Persist};
use super::{parse_datetime, parse_datetime_opt, parse_uuid, parse_uuid_opt};
use crate::models::{Audit, DomainEvent, Task, TaskPriority, TaskStatus};

const COLUMNS: &str = "t.id, t.title, t.description, t.priority, t.status, t.due_date, \
                       t.created_at, t.completed_at, t.assigned_to_id, t.audit_created, \
                       t.audit_created_by, t.audit_modified, t.audit_modified_by";

// Highest priority first, then earliest due date with undated tasks last
const ORDERING: &str = "ORDER BY CASE t.priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END, \
                        t.due_date IS NULL, t.due_date, t.created_at";

/// A task together with the full name of the member it is assigned to.
#[derive(Debug, Clone)]
pub struct TaskRow {
    pub task: Task,
    pub assignee_name: Option<String>,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_uuid(row, 0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: TaskPriority::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
        status: TaskStatus::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
        due_date: parse_datetime_opt(row, 5)?,
        created_at: parse_datetime(row, 6)?,
        completed_at: parse_datetime_opt(row, 7)?,
        assigned_to_id: parse_uuid_opt(row, 8)?,
        audit: Audit {
            created: parse_datetime(row, 9)?,
            created_by: row.get(10)?,
            modified: parse_datetime_opt(row, 11)?,
            modified_by: row.get(12)?,
        },
    })
}

fn task_row(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        task: from_row(row)?,
        assignee_name: row.get(13)?,
    })
}

impl Persist for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> Uuid {
        self.id
    }

    fn load(conn: &Connection, id: Uuid) -> Result<Option<Self>> {
        let task = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM tasks t WHERE t.id = ?"),
                [id.to_string()],
                from_row,
            )
            .optional()?;
        Ok(task)
    }

    fn insert(&self, conn: &Connection) -> Result<usize> {
        let rows = conn.execute(
            "INSERT INTO tasks (id, title, description, priority, status, due_date, created_at,
                                completed_at, assigned_to_id, audit_created, audit_created_by,
                                audit_modified, audit_modified_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                self.id.to_string(),
                &self.title,
                &self.description,
                self.priority.as_str(),
                self.status.as_str(),
                self.due_date.map(|d| d.to_rfc3339()),
                self.created_at.to_rfc3339(),
                self.completed_at.map(|d| d.to_rfc3339()),
                self.assigned_to_id.map(|id| id.to_string()),
                self.audit.created.to_rfc3339(),
                &self.audit.created_by,
                self.audit.modified.map(|d| d.to_rfc3339()),
                &self.audit.modified_by,
            ],
        )?;
        Ok(rows)
    }

    fn update(&self, conn: &Connection) -> Result<usize> {
        let rows = conn.execute(
            "UPDATE tasks SET title = ?, description = ?, priority = ?, status = ?, due_date = ?,
                              completed_at = ?, assigned_to_id = ?, audit_modified = ?,
                              audit_modified_by = ?
             WHERE id = ?",
            rusqlite::params![
                &self.title,
                &self.description,
                self.priority.as_str(),
                self.status.as_str(),
                self.due_date.map(|d| d.to_rfc3339()),
                self.completed_at.map(|d| d.to_rfc3339()),
                self.assigned_to_id.map(|id| id.to_string()),
                self.audit.modified.map(|d| d.to_rfc3339()),
                &self.audit.modified_by,
                self.id.to_string(),
            ],
        )?;
        Ok(rows)
    }

    fn delete(conn: &Connection, id: Uuid) -> Result<usize> {
        let rows = conn.execute("DELETE FROM tasks WHERE id = ?", [id.to_string()])?;
        Ok(rows)
    }

    fn audit_mut(&mut self) -> Option<&mut Audit> {
        Some(&mut self.audit)
    }

    fn refresh_event(&self, event: DomainEvent) -> DomainEvent {
        event.rebind(self)
    }

    fn collection(changes: &mut ChangeSet) -> (&mut EntitySet<Self>, &mut u64) {
        changes.split_tasks()
    }
}

/// All tasks, highest priority first, with assignee names resolved.
pub fn list_task_rows(conn: &Connection) -> Result<Vec<TaskRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS}, m.first_name || ' ' || m.last_name
         FROM tasks t LEFT JOIN members m ON m.id = t.assigned_to_id
         {ORDERING}"
    ))?;

    let tasks = stmt
        .query_map([], task_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tasks)
}

pub fn find_task_row(conn: &Connection, id: Uuid) -> Result<Option<TaskRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS}, m.first_name || ' ' || m.last_name
                 FROM tasks t LEFT JOIN members m ON m.id = t.assigned_to_id
                 WHERE t.id = ?"
            ),
            [id.to_string()],
            task_row,
        )
        .optional()?;
    Ok(row)
}
