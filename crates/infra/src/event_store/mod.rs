//! Append-only event store boundary.
//!
//! Streams are keyed by `(tenant_id, aggregate_id)`. The in-memory store
//! backs tests and local development; the Postgres store is selected at
//! runtime for durable deployments. Publication to the bus is the
//! dispatcher's job, not the store's.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
