use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account that can sign in. Not every user is a family member, and the
/// link is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub family_member_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Opaque session handle issued at sign-in and carried in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
