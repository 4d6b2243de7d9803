use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use ledgerdesk_accounting::fiscal::{
    FiscalEvent, FiscalPeriod, FiscalPeriodId, FiscalYearId, PeriodStatus, YearStatus,
};
use ledgerdesk_core::TenantId;
use ledgerdesk_events::EventEnvelope;

use crate::projections::{CursorGate, ProjectionError, StreamCursors, sorted_for_replay};
use crate::read_model::TenantStore;

/// Read model: a fiscal year with its full period table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiscalYearReadModel {
    pub fiscal_year_id: FiscalYearId,
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub periods: Vec<FiscalPeriod>,
    pub status: YearStatus,
}

impl FiscalYearReadModel {
    pub fn period_by_id(&self, period_id: FiscalPeriodId) -> Option<&FiscalPeriod> {
        self.periods.iter().find(|p| p.period_id == period_id)
    }

    /// A period accepts postings while it and the year are open.
    pub fn period_is_open(&self, period_id: FiscalPeriodId) -> bool {
        self.status == YearStatus::Open
            && self
                .period_by_id(period_id)
                .is_some_and(|p| p.status == PeriodStatus::Open)
    }
}

/// Projection: fiscal events → posting calendar per tenant.
#[derive(Debug)]
pub struct FiscalCalendarProjection<S>
where
    S: TenantStore<FiscalYearId, FiscalYearReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> FiscalCalendarProjection<S>
where
    S: TenantStore<FiscalYearId, FiscalYearReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(
        &self,
        tenant_id: TenantId,
        fiscal_year_id: FiscalYearId,
    ) -> Option<FiscalYearReadModel> {
        self.store.get(tenant_id, &fiscal_year_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<FiscalYearReadModel> {
        self.store.list(tenant_id)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "accounting.fiscal_year" {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(tenant_id, aggregate_id, seq)? {
            CursorGate::Duplicate => return Ok(()),
            CursorGate::Apply => {}
        }

        let ev: FiscalEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            FiscalEvent::FiscalYearOpened(e) => e.tenant_id,
            FiscalEvent::PeriodClosed(e) => e.tenant_id,
            FiscalEvent::PeriodReopened(e) => e.tenant_id,
            FiscalEvent::FiscalYearClosed(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(ProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }

        match ev {
            FiscalEvent::FiscalYearOpened(e) => {
                self.store.upsert(
                    tenant_id,
                    e.fiscal_year_id,
                    FiscalYearReadModel {
                        fiscal_year_id: e.fiscal_year_id,
                        label: e.label,
                        start_date: e.start_date,
                        end_date: e.end_date,
                        periods: e.periods,
                        status: YearStatus::Open,
                    },
                );
            }
            FiscalEvent::PeriodClosed(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.fiscal_year_id) {
                    if let Some(p) = rm.periods.iter_mut().find(|p| p.seq == e.seq) {
                        p.status = PeriodStatus::Closed;
                    }
                    self.store.upsert(tenant_id, e.fiscal_year_id, rm);
                }
            }
            FiscalEvent::PeriodReopened(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.fiscal_year_id) {
                    if let Some(p) = rm.periods.iter_mut().find(|p| p.seq == e.seq) {
                        p.status = PeriodStatus::Open;
                    }
                    self.store.upsert(tenant_id, e.fiscal_year_id, rm);
                }
            }
            FiscalEvent::FiscalYearClosed(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.fiscal_year_id) {
                    rm.status = YearStatus::Closed;
                    self.store.upsert(tenant_id, e.fiscal_year_id, rm);
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
