//! Domain models for FamilyHub.
//!
//! # Core Concepts
//!
//! - [`FamilyMember`]: A person in the household. Tasks can be assigned to a
//!   member and shopping items remember which member added them.
//! - [`Task`]: A chore or appointment. Carries the business rules for
//!   completion and priority changes, and an embedded [`Audit`] block.
//! - [`ShoppingItem`]: An entry on the shared shopping list.
//! - [`DomainEvent`]: Facts raised by entity business methods and published
//!   after a successful commit.
//! - [`AppUser`]: An authenticated account, optionally linked to a member.

mod audit;
mod event;
mod member;
mod shopping;
mod task;
mod user;

pub use audit::*;
pub use event::*;
pub use member::*;
pub use shopping::*;
pub use task::*;
pub use user::*;
