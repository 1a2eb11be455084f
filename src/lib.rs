//! FamilyHub: family members, tasks and a shared shopping list behind a
//! request pipeline that validates, persists atomically and publishes domain
//! events after commit.

pub mod api;
pub mod auth;
pub mod clock;
pub mod db;
pub mod error;
pub mod features;
pub mod hub;
pub mod models;
pub mod pipeline;
pub mod validation;

pub use error::{Failure, Outcome};
pub use hub::{FamilyHub, RequestOptions};
