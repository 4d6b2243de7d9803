use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use ledgerdesk_accounting::fiscal::{FiscalPeriodId, FiscalYearId};
use ledgerdesk_accounting::voucher::{
    VoucherEvent, VoucherId, VoucherLine, VoucherStatus, line_totals,
};
use ledgerdesk_core::TenantId;
use ledgerdesk_events::EventEnvelope;

use crate::projections::{CursorGate, ProjectionError, StreamCursors, sorted_for_replay};
use crate::read_model::TenantStore;

/// Read model: one register row per voucher, lines and totals included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherReadModel {
    pub voucher_id: VoucherId,
    pub voucher_no: String,
    pub fiscal_year_id: FiscalYearId,
    pub fiscal_period_id: FiscalPeriodId,
    pub narration: Option<String>,
    pub lines: Vec<VoucherLine>,
    pub status: VoucherStatus,
    pub total_debit: i128,
    pub total_credit: i128,
    pub posted_at: Option<DateTime<Utc>>,
}

/// Projection: voucher events → the voucher register per tenant.
#[derive(Debug)]
pub struct VoucherRegisterProjection<S>
where
    S: TenantStore<VoucherId, VoucherReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> VoucherRegisterProjection<S>
where
    S: TenantStore<VoucherId, VoucherReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Option<VoucherReadModel> {
        self.store.get(tenant_id, &voucher_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<VoucherReadModel> {
        self.store.list(tenant_id)
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

        match ev {
            VoucherEvent::VoucherDrafted(e) => {
                let (total_debit, total_credit) = line_totals(&e.lines);
                self.store.upsert(
                    tenant_id,
                    e.voucher_id,
                    VoucherReadModel {
                        voucher_id: e.voucher_id,
                        voucher_no: e.voucher_no,
                        fiscal_year_id: e.fiscal_year_id,
                        fiscal_period_id: e.fiscal_period_id,
                        narration: e.narration,
                        lines: e.lines,
                        status: VoucherStatus::Draft,
                        total_debit,
                        total_credit,
                        posted_at: None,
                    },
                );
            }
            VoucherEvent::VoucherRevised(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.voucher_id) {
                    let (total_debit, total_credit) = line_totals(&e.lines);
                    rm.narration = e.narration;
                    rm.lines = e.lines;
                    rm.total_debit = total_debit;
                    rm.total_credit = total_credit;
                    self.store.upsert(tenant_id, e.voucher_id, rm);
                }
            }
            VoucherEvent::VoucherApproved(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.voucher_id) {
                    rm.status = VoucherStatus::Approved;
                    self.store.upsert(tenant_id, e.voucher_id, rm);
                }
            }
            VoucherEvent::VoucherPosted(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.voucher_id) {
                    rm.status = VoucherStatus::Posted;
                    rm.posted_at = Some(e.posted_at);
                    self.store.upsert(tenant_id, e.voucher_id, rm);
                }
            }
            VoucherEvent::VoucherCancelled(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.voucher_id) {
                    rm.status = VoucherStatus::Cancelled;
                    self.store.upsert(tenant_id, e.voucher_id, rm);
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

#[cfg(test)]
mod tests {
    use ledgerdesk_accounting::voucher::{VoucherApproved, VoucherDrafted, VoucherPosted};
    use ledgerdesk_core::AggregateId;
    use uuid::Uuid;

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    fn line(code: &str, debit: i64, credit: i64) -> VoucherLine {
        VoucherLine {
            account_code: code.to_string(),
            account_name: format!("account {code}"),
            debit,
            credit,
            description: None,
        }
    }

    fn envelope(
        tenant: TenantId,
        voucher_id: VoucherId,
        seq: u64,
        ev: &VoucherEvent,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant,
            voucher_id.0,
            "accounting.voucher",
            seq,
            serde_json::to_value(ev).unwrap(),
        )
    }

    #[test]
    fn lifecycle_rolls_up_into_the_register_row() {
        let projection = VoucherRegisterProjection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let voucher_id = VoucherId(AggregateId::new());
        let fiscal_year_id = FiscalYearId(AggregateId::new());
        let fiscal_period_id = FiscalPeriodId(Uuid::now_v7());
        let lines = vec![line("1000", 2500, 0), line("4000", 0, 2500)];

        let drafted = VoucherEvent::VoucherDrafted(VoucherDrafted {
            tenant_id: tenant,
            voucher_id,
            voucher_no: "JV-7".to_string(),
            fiscal_year_id,
            fiscal_period_id,
            narration: None,
            lines: lines.clone(),
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(tenant, voucher_id, 1, &drafted))
            .unwrap();

        let rm = projection.get(tenant, voucher_id).unwrap();
        assert_eq!(rm.status, VoucherStatus::Draft);
        assert_eq!(rm.total_debit, 2500);
        assert_eq!(rm.total_credit, 2500);

        let approved = VoucherEvent::VoucherApproved(VoucherApproved {
            tenant_id: tenant,
            voucher_id,
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(tenant, voucher_id, 2, &approved))
            .unwrap();

        let posted_at = Utc::now();
        let posted = VoucherEvent::VoucherPosted(VoucherPosted {
            tenant_id: tenant,
            voucher_id,
            voucher_no: "JV-7".to_string(),
            fiscal_year_id,
            fiscal_period_id,
            lines,
            posted_at,
            occurred_at: Utc::now(),
        });
        projection
            .apply_envelope(&envelope(tenant, voucher_id, 3, &posted))
            .unwrap();

        let rm = projection.get(tenant, voucher_id).unwrap();
        assert_eq!(rm.status, VoucherStatus::Posted);
        assert_eq!(rm.posted_at, Some(posted_at));
    }
}
