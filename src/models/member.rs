use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_ROLE: &str = "Member";

/// A person in the household.
///
/// Members are referenced by tasks (`assigned_to_id`) and shopping items
/// (`added_by_id`). Deleting a member clears those references; it never
/// deletes the tasks or items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyMember {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    /// Free text: "Parent", "Child", ...
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl FamilyMember {
    pub fn new(
        first_name: String,
        last_name: String,
        email: Option<String>,
        role: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name,
            last_name,
            email: email.filter(|e| !e.trim().is_empty()),
            role: role
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            created_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
