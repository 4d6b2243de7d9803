use chrono::{DateTime, Utc};

/// A domain event: an immutable fact emitted by an aggregate.
///
/// Events are append-only and versioned for schema evolution. The type name
/// is a stable dotted identifier, e.g. `"crm.customer.registered"` or
/// `"accounting.voucher.posted"`; projections match on it.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
