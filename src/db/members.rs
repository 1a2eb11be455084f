use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::change_set::{ChangeSet, EntityKind, EntitySet, Persist};
use super::{parse_datetime, parse_uuid};
use crate::models::FamilyMember;

const COLUMNS: &str = "id, first_name, last_name, email, role, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<FamilyMember> {
    Ok(FamilyMember {
        id: parse_uuid(row, 0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        role: row.get(4)?,
        created_at: parse_datetime(row, 5)?,
    })
}

impl Persist for FamilyMember {
    const KIND: EntityKind = EntityKind::Member;

    fn id(&self) -> Uuid {
        self.id
    }

    fn load(conn: &Connection, id: Uuid) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM members WHERE id = ?"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(from_row(row)?)),
            None => Ok(None),
        }
    }

    fn insert(&self, conn: &Connection) -> Result<usize> {
        let rows = conn.execute(
            "INSERT INTO members (id, first_name, last_name, email, role, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                self.id.to_string(),
                &self.first_name,
                &self.last_name,
                &self.email,
                &self.role,
                self.created_at.to_rfc3339(),
            ),
        )?;
        Ok(rows)
    }

    fn update(&self, conn: &Connection) -> Result<usize> {
        let rows = conn.execute(
            "UPDATE members SET first_name = ?, last_name = ?, email = ?, role = ? WHERE id = ?",
            (
                &self.first_name,
                &self.last_name,
                &self.email,
                &self.role,
                self.id.to_string(),
            ),
        )?;
        Ok(rows)
    }

    fn delete(conn: &Connection, id: Uuid) -> Result<usize> {
        let rows = conn.execute("DELETE FROM members WHERE id = ?", [id.to_string()])?;
        Ok(rows)
    }

    fn collection(changes: &mut ChangeSet) -> (&mut EntitySet<Self>, &mut u64) {
        changes.split_members()
    }
}

/// Every member with the number of tasks currently assigned to them, ordered
/// by first name.
pub fn list_members_with_task_counts(conn: &Connection) -> Result<Vec<(FamilyMember, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.first_name, m.last_name, m.email, m.role, m.created_at,
                (SELECT COUNT(*) FROM tasks t WHERE t.assigned_to_id = m.id)
         FROM members m ORDER BY m.first_name, m.last_name",
    )?;

    let members = stmt
        .query_map([], |row| {
            let count: i64 = row.get(6)?;
            Ok((from_row(row)?, count as usize))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(members)
}
