//! Infrastructure layer: event store, command dispatch, read models,
//! projections and report builders.
//!
//! Nothing in here makes business decisions; aggregates do. This crate moves
//! events between the domain and storage, keeps the tenant-isolated read
//! models the HTTP layer queries, and folds posted voucher lines into the
//! row sets the financial statements are built from.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod reports;
