use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An entry on the shared shopping list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShoppingItem {
    pub id: Uuid,
    pub name: String,
    /// Always at least 1.
    pub quantity: u32,
    pub(crate) is_purchased: bool,
    /// "Fruit", "Dairy", "Hygiene", ...
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub added_by_id: Option<Uuid>,
}

impl ShoppingItem {
    pub fn new(
        name: String,
        quantity: u32,
        category: Option<String>,
        added_by_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            quantity: quantity.max(1),
            is_purchased: false,
            category,
            created_at: now,
            added_by_id,
        }
    }

    pub fn is_purchased(&self) -> bool {
        self.is_purchased
    }

    /// Idempotent: marking an already purchased item again is not an error.
    /// Unlike completing a task twice, buying something twice harms nobody.
    pub fn mark_as_purchased(&mut self) {
        self.is_purchased = true;
    }
}
