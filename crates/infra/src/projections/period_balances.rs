use serde_json::Value as JsonValue;

use ledgerdesk_accounting::account::AccountKind;
use ledgerdesk_accounting::fiscal::{FiscalPeriodId, FiscalYearId};
use ledgerdesk_accounting::voucher::{VoucherEvent, VoucherPosted};
use ledgerdesk_core::TenantId;
use ledgerdesk_events::EventEnvelope;

use crate::projections::chart_of_accounts::AccountReadModel;
use crate::projections::{CursorGate, ProjectionError, StreamCursors, sorted_for_replay};
use crate::read_model::TenantStore;

/// Key of one balance row: account activity within one fiscal period.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BalanceKey {
    pub fiscal_year_id: FiscalYearId,
    pub fiscal_period_id: FiscalPeriodId,
    pub account_code: String,
}

/// Read model: accumulated debit/credit totals per (year, period, account).
///
/// The financial statements are pure folds over these rows. Kind and cash
/// flag are snapshotted from the chart so report builders need no joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodBalance {
    pub fiscal_year_id: FiscalYearId,
    pub fiscal_period_id: FiscalPeriodId,
    pub account_code: String,
    pub account_name: String,
    pub kind: AccountKind,
    pub is_cash: bool,
    pub debit_total: i128,
    pub credit_total: i128,
}

impl PeriodBalance {
    /// Signed balance, debit-positive convention.
    pub fn balance(&self) -> i128 {
        self.debit_total - self.credit_total
    }
}

/// Projection: posted vouchers → per-period account balances.
///
/// Fed exclusively by `VoucherPosted`; drafts, approvals and cancellations
/// never move a balance. Consults the chart read model to snapshot the
/// account kind and cash flag onto each row.
#[derive(Debug)]
pub struct PeriodBalancesProjection<S, C>
where
    S: TenantStore<BalanceKey, PeriodBalance>,
    C: TenantStore<String, AccountReadModel>,
{
    store: S,
    chart: C,
    cursors: StreamCursors,
}

impl<S, C> PeriodBalancesProjection<S, C>
where
    S: TenantStore<BalanceKey, PeriodBalance>,
    C: TenantStore<String, AccountReadModel>,
{
    pub fn new(store: S, chart: C) -> Self {
        Self {
            store,
            chart,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, key: &BalanceKey) -> Option<PeriodBalance> {
        self.store.get(tenant_id, key)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<PeriodBalance> {
        self.store.list(tenant_id)
    }

    pub fn list_for_year(
        &self,
        tenant_id: TenantId,
        fiscal_year_id: FiscalYearId,
    ) -> Vec<PeriodBalance> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|b| b.fiscal_year_id == fiscal_year_id)
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "accounting.voucher" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq)? {
            CursorGate::Duplicate => return Ok(()),
            CursorGate::Apply => {}
        }

        let ev: VoucherEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            VoucherEvent::VoucherDrafted(e) => e.tenant_id,
            VoucherEvent::VoucherRevised(e) => e.tenant_id,
            VoucherEvent::VoucherApproved(e) => e.tenant_id,
            VoucherEvent::VoucherPosted(e) => e.tenant_id,
            VoucherEvent::VoucherCancelled(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        if let VoucherEvent::VoucherPosted(e) = ev {
            self.fold_posted(tenant_id, &e);
        }

        self.cursors.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn fold_posted(&self, tenant_id: TenantId, e: &VoucherPosted) {
        for line in &e.lines {
            let key = BalanceKey {
                fiscal_year_id: e.fiscal_year_id,
                fiscal_period_id: e.fiscal_period_id,
                account_code: line.account_code.clone(),
            };

            let mut row = self.store.get(tenant_id, &key).unwrap_or_else(|| {
                // Codes are guarded against the chart before drafting, so
                // the lookup only misses on a replay that interleaves
                // aggregates; a later rebuild repairs the snapshot.
                let (kind, is_cash) = self
                    .chart
                    .get(tenant_id, &line.account_code)
                    .map(|a| (a.kind, a.is_cash))
                    .unwrap_or((AccountKind::Asset, false));

                PeriodBalance {
                    fiscal_year_id: e.fiscal_year_id,
                    fiscal_period_id: e.fiscal_period_id,
                    account_code: line.account_code.clone(),
                    account_name: line.account_name.clone(),
                    kind,
                    is_cash,
                    debit_total: 0,
                    credit_total: 0,
                }
            });

            row.debit_total += line.debit as i128;
            row.credit_total += line.credit as i128;
            self.store.upsert(tenant_id, key, row);
        }
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
