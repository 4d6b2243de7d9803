//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and maintain query-optimized,
//! tenant-isolated read models. They are rebuildable from the event store
//! and idempotent under at-least-once delivery: each keeps a per-stream
//! sequence cursor, skips already-applied envelopes, and refuses gaps.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use ledgerdesk_core::{AggregateId, TenantId};
use ledgerdesk_events::EventEnvelope;

pub mod address_book;
pub mod chart_of_accounts;
pub mod customer_directory;
pub mod fiscal_calendar;
pub mod period_balances;
pub mod voucher_register;

pub use address_book::{AddressBookProjection, AddressReadModel};
pub use chart_of_accounts::{AccountReadModel, ChartOfAccountsProjection};
pub use customer_directory::{CustomerDirectoryProjection, CustomerReadModel};
pub use fiscal_calendar::{FiscalCalendarProjection, FiscalYearReadModel};
pub use period_balances::{BalanceKey, PeriodBalance, PeriodBalancesProjection};
pub use voucher_register::{VoucherReadModel, VoucherRegisterProjection};

/// Error raised while applying an envelope to a projection.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Per-stream sequence cursors shared by every projection.
///
/// `check` implements the idempotency gate: an envelope at or below the
/// cursor is a duplicate and gets skipped; anything other than `last + 1`
/// on a non-empty cursor is a gap and fails loudly so the feed can rebuild.
#[derive(Debug, Default)]
pub(crate) struct StreamCursors {
    inner: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

/// Outcome of the cursor gate for one envelope.
pub(crate) enum CursorGate {
    /// Already applied; skip without error.
    Duplicate,
    /// Next in sequence; apply and advance.
    Apply,
}

impl StreamCursors {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn check(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> Result<CursorGate, ProjectionError> {
        let last = match self.inner.read() {
            Ok(map) => *map.get(&(tenant_id, aggregate_id)).unwrap_or(&0),
            Err(_) => 0,
        };

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(CursorGate::Duplicate);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        Ok(CursorGate::Apply)
    }

    pub(crate) fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, aggregate_id), seq);
        }
    }

    pub(crate) fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

/// Prepare a replay batch: the distinct tenants to wipe, and the envelopes
/// in deterministic `(tenant, aggregate, sequence)` order.
pub(crate) fn sorted_for_replay(
    envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
) -> (Vec<TenantId>, Vec<EventEnvelope<JsonValue>>) {
    let mut envs: Vec<_> = envelopes.into_iter().collect();

    let mut tenants: Vec<_> = envs.iter().map(|e| e.tenant_id()).collect();
    tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
    tenants.dedup();

    envs.sort_by_key(|e| {
        (
            *e.tenant_id().as_uuid().as_bytes(),
            *e.aggregate_id().as_uuid().as_bytes(),
            e.sequence_number(),
        )
    });

    (tenants, envs)
}
