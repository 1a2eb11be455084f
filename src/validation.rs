//! Structural validation rules for commands and queries.
//!
//! Validators are pure: they look at the request value only and never touch the
//! store. Each request type that needs checks implements [`Validate`] by running
//! a [`Rules`] collector over its fields.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::error::ValidationError;

pub const NOT_EMPTY: &str = "NOT_EMPTY";
pub const MAX_LENGTH: &str = "MAX_LENGTH";
pub const GREATER_THAN: &str = "GREATER_THAN";
pub const LESS_THAN_OR_EQUAL: &str = "LESS_THAN_OR_EQUAL";
pub const EMAIL: &str = "EMAIL";

/// Longest address accepted, in characters.
pub const EMAIL_MAX: usize = 320;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

/// A request that can check its own structural preconditions.
pub trait Validate {
    fn validate(&self) -> Vec<ValidationError>;
}

/// Accumulates rule failures, one entry per broken rule.
#[derive(Debug, Default)]
pub struct Rules {
    errors: Vec<ValidationError>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn not_empty(&mut self, field: &str, value: &str, message: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.push(field, message, NOT_EMPTY);
        }
        self
    }

    pub fn not_nil(&mut self, field: &str, value: Uuid, message: &str) -> &mut Self {
        if value.is_nil() {
            self.push(field, message, NOT_EMPTY);
        }
        self
    }

    /// Length in characters, not bytes.
    pub fn max_len(&mut self, field: &str, value: &str, max: usize, message: &str) -> &mut Self {
        if value.chars().count() > max {
            self.push(field, message, MAX_LENGTH);
        }
        self
    }

    pub fn max_len_opt(
        &mut self,
        field: &str,
        value: Option<&str>,
        max: usize,
        message: &str,
    ) -> &mut Self {
        if let Some(value) = value {
            self.max_len(field, value, max, message);
        }
        self
    }

    pub fn greater_than(&mut self, field: &str, value: i64, min: i64, message: &str) -> &mut Self {
        if value <= min {
            self.push(field, message, GREATER_THAN);
        }
        self
    }

    pub fn at_most(&mut self, field: &str, value: i64, max: i64, message: &str) -> &mut Self {
        if value > max {
            self.push(field, message, LESS_THAN_OR_EQUAL);
        }
        self
    }

    /// Skipped when the value is absent or blank.
    pub fn email_opt(&mut self, field: &str, value: Option<&str>, message: &str) -> &mut Self {
        let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
            return self;
        };
        if value.chars().count() > EMAIL_MAX {
            self.push(field, "Email must not exceed 320 characters.", MAX_LENGTH);
        } else if !looks_like_email(value) {
            self.push(field, message, EMAIL);
        }
        self
    }

    pub fn finish(&mut self) -> Vec<ValidationError> {
        std::mem::take(&mut self.errors)
    }

    fn push(&mut self, field: &str, message: &str, code: &str) {
        self.errors.push(ValidationError::new(field, message, code));
    }
}

fn looks_like_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}
