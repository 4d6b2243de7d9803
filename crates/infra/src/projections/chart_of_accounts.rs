use serde_json::Value as JsonValue;

use ledgerdesk_accounting::account::{AccountEvent, AccountId, AccountKind, AccountStatus};
use ledgerdesk_core::TenantId;
use ledgerdesk_events::EventEnvelope;

use crate::projections::{CursorGate, ProjectionError, StreamCursors, sorted_for_replay};
use crate::read_model::TenantStore;

/// Read model: one chart entry per account code.
///
/// Keyed by `code` rather than aggregate id: vouchers reference accounts by
/// code, and the HTTP layer uses this projection both for lookups and for
/// the code-uniqueness guard at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReadModel {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub is_cash: bool,
    pub status: AccountStatus,
}

impl AccountReadModel {
    pub fn is_postable(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Projection: account events → chart of accounts per tenant.
#[derive(Debug)]
pub struct ChartOfAccountsProjection<S>
where
    S: TenantStore<String, AccountReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ChartOfAccountsProjection<S>
where
    S: TenantStore<String, AccountReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, code: &str) -> Option<AccountReadModel> {
        self.store.get(tenant_id, &code.to_string())
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<AccountReadModel> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "accounting.account" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq)? {
            CursorGate::Duplicate => return Ok(()),
            CursorGate::Apply => {}
        }

        let ev: AccountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            AccountEvent::AccountOpened(e) => e.tenant_id,
            AccountEvent::AccountUpdated(e) => e.tenant_id,
            AccountEvent::AccountArchived(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        match ev {
            AccountEvent::AccountOpened(e) => {
                self.store.upsert(
                    tenant_id,
                    e.code.clone(),
                    AccountReadModel {
                        account_id: e.account_id,
                        code: e.code,
                        name: e.name,
                        kind: e.kind,
                        is_cash: e.is_cash,
                        status: AccountStatus::Active,
                    },
                );
            }
            AccountEvent::AccountUpdated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.code) {
                    rm.name = e.name;
                    rm.is_cash = e.is_cash;
                    self.store.upsert(tenant_id, e.code, rm);
                }
            }
            AccountEvent::AccountArchived(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.code) {
                    rm.status = AccountStatus::Archived;
                    self.store.upsert(tenant_id, e.code, rm);
                }
            }
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let (tenants, envs) = sorted_for_replay(envelopes);
        for t in tenants {
            self.store.clear_tenant(t);
            self.cursors.clear_tenant(t);
        }
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
