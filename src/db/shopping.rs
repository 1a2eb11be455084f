use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::change_set::{ChangeSet, EntityKind, EntitySet, Persist};
use super::{parse_datetime, parse_uuid, parse_uuid_opt};
use crate::models::ShoppingItem;

const COLUMNS: &str = "s.id, s.name, s.quantity, s.is_purchased, s.category, s.created_at, s.added_by_id";

/// A shopping list entry with the full name of whoever added it.
#[derive(Debug, Clone)]
pub struct ShoppingRow {
    pub item: ShoppingItem,
    pub added_by_name: Option<String>,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ShoppingItem> {
    let quantity: i64 = row.get(2)?;
    Ok(ShoppingItem {
        id: parse_uuid(row, 0)?,
        name: row.get(1)?,
        quantity: quantity.max(1) as u32,
        is_purchased: row.get(3)?,
        category: row.get(4)?,
        created_at: parse_datetime(row, 5)?,
        added_by_id: parse_uuid_opt(row, 6)?,
    })
}

impl Persist for ShoppingItem {
    const KIND: EntityKind = EntityKind::ShoppingItem;

    fn id(&self) -> Uuid {
        self.id
    }

    fn load(conn: &Connection, id: Uuid) -> Result<Option<Self>> {
        let item = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM shopping_items s WHERE s.id = ?"),
                [id.to_string()],
                from_row,
            )
            .optional()?;
        Ok(item)
    }

    fn insert(&self, conn: &Connection) -> Result<usize> {
        let rows = conn.execute(
            "INSERT INTO shopping_items (id, name, quantity, is_purchased, category, created_at, added_by_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                self.id.to_string(),
                &self.name,
                self.quantity,
                self.is_purchased,
                &self.category,
                self.created_at.to_rfc3339(),
                self.added_by_id.map(|id| id.to_string()),
            ),
        )?;
        Ok(rows)
    }

    fn update(&self, conn: &Connection) -> Result<usize> {
        let rows = conn.execute(
            "UPDATE shopping_items SET name = ?, quantity = ?, is_purchased = ?, category = ?
             WHERE id = ?",
            (
                &self.name,
                self.quantity,
                self.is_purchased,
                &self.category,
                self.id.to_string(),
            ),
        )?;
        Ok(rows)
    }

    fn delete(conn: &Connection, id: Uuid) -> Result<usize> {
        let rows = conn.execute("DELETE FROM shopping_items WHERE id = ?", [id.to_string()])?;
        Ok(rows)
    }

    fn collection(changes: &mut ChangeSet) -> (&mut EntitySet<Self>, &mut u64) {
        changes.split_shopping_items()
    }
}

/// The shopping list ordered by category, then name. Items without a category
/// sort first.
pub fn list_shopping_items(conn: &Connection, include_purchased: bool) -> Result<Vec<ShoppingRow>> {
    let filter = if include_purchased {
        ""
    } else {
        "WHERE s.is_purchased = 0"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS}, m.first_name || ' ' || m.last_name
         FROM shopping_items s LEFT JOIN members m ON m.id = s.added_by_id
         {filter}
         ORDER BY s.category, s.name"
    ))?;

    let items = stmt
        .query_map([], |row| {
            Ok(ShoppingRow {
                item: from_row(row)?,
                added_by_name: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}
