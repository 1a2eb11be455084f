use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who created an entity and who last changed it, and when.
///
/// A value object: two audits with the same four fields are equal. It is stored
/// inline in the owning row (`audit_*` columns), never in a table of its own.
/// The fields are filled in by the unit of work at commit time; handlers never
/// touch them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Audit {
    pub created: DateTime<Utc>,
    pub created_by: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
}

impl Audit {
    pub fn new(created: DateTime<Utc>) -> Self {
        Self {
            created,
            created_by: None,
            modified: None,
            modified_by: None,
        }
    }

    pub fn stamp_created(&mut self, at: DateTime<Utc>, by: &str) {
        self.created = at;
        self.created_by = Some(by.to_string());
    }

    pub fn stamp_modified(&mut self, at: DateTime<Utc>, by: &str) {
        self.modified = Some(at);
        self.modified_by = Some(by.to_string());
    }
}
