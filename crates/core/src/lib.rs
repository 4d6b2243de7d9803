//! `ledgerdesk-core` — domain foundation building blocks.
//!
//! Pure domain primitives shared by the CRM and accounting crates: typed
//! identifiers, the domain error model, and the aggregate contract. No
//! infrastructure concerns live here.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
