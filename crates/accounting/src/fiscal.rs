use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Entity, TenantId};
use ledgerdesk_events::Event;

/// Fiscal year identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiscalYearId(pub AggregateId);

impl FiscalYearId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FiscalYearId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Fiscal period identifier. Periods are sub-entities of a fiscal year but
/// are referenced from vouchers and balances, so they carry their own id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiscalPeriodId(pub Uuid);

impl FiscalPeriodId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for FiscalPeriodId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Posting window status of a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
    Open,
    Closed,
}

impl PeriodStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodStatus::Open => "open",
            PeriodStatus::Closed => "closed",
        }
    }
}

/// Fiscal year status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearStatus {
    Open,
    Closed,
}

impl YearStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            YearStatus::Open => "open",
            YearStatus::Closed => "closed",
        }
    }
}

/// One posting period inside a fiscal year (1-based `seq`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalPeriod {
    pub period_id: FiscalPeriodId,
    pub seq: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PeriodStatus,
}

impl Entity for FiscalPeriod {
    type Id = FiscalPeriodId;

    fn id(&self) -> &FiscalPeriodId {
        &self.period_id
    }
}

/// Calendar-month spans covering `[start, end]`, inclusive on both ends.
///
/// The first span starts at `start`, later spans begin on the first of the
/// month, and the last span is clamped to `end`. Total: never panics, yields
/// an empty vec when `end < start`.
pub fn month_spans(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut spans = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let Some(month_end) = end_of_month(cursor) else {
            break;
        };
        let span_end = month_end.min(end);
        spans.push((cursor, span_end));
        match span_end.checked_add_days(Days::new(1)) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    spans
}

fn end_of_month(d: NaiveDate) -> Option<NaiveDate> {
    d.with_day(1)?
        .checked_add_months(Months::new(1))?
        .checked_sub_days(Days::new(1))
}

/// Aggregate root: FiscalYear (posting calendar with embedded periods).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiscalYear {
    id: FiscalYearId,
    tenant_id: Option<TenantId>,
    label: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    periods: Vec<FiscalPeriod>,
    status: YearStatus,
    version: u64,
    created: bool,
}

impl FiscalYear {
    /// Empty aggregate for rehydration.
    pub fn empty(id: FiscalYearId) -> Self {
        Self {
            id,
            tenant_id: None,
            label: String::new(),
            start_date: NaiveDate::MIN,
            end_date: NaiveDate::MIN,
            periods: Vec::new(),
            status: YearStatus::Open,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> FiscalYearId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn periods(&self) -> &[FiscalPeriod] {
        &self.periods
    }

    pub fn status(&self) -> YearStatus {
        self.status
    }

    pub fn period_by_seq(&self, seq: u32) -> Option<&FiscalPeriod> {
        self.periods.iter().find(|p| p.seq == seq)
    }
}

impl AggregateRoot for FiscalYear {
    type Id = FiscalYearId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenFiscalYear.
///
/// `period_ids` must carry one pre-minted id per calendar-month span of
/// `[start_date, end_date]` (see [`month_spans`]); the caller mints them so
/// `handle` stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFiscalYear {
    pub tenant_id: TenantId,
    pub fiscal_year_id: FiscalYearId,
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_ids: Vec<FiscalPeriodId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ClosePeriod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePeriod {
    pub tenant_id: TenantId,
    pub fiscal_year_id: FiscalYearId,
    pub seq: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReopenPeriod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenPeriod {
    pub tenant_id: TenantId,
    pub fiscal_year_id: FiscalYearId,
    pub seq: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseFiscalYear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseFiscalYear {
    pub tenant_id: TenantId,
    pub fiscal_year_id: FiscalYearId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiscalCommand {
    OpenFiscalYear(OpenFiscalYear),
    ClosePeriod(ClosePeriod),
    ReopenPeriod(ReopenPeriod),
    CloseFiscalYear(CloseFiscalYear),
}

/// Event: FiscalYearOpened. Carries the full generated period table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYearOpened {
    pub tenant_id: TenantId,
    pub fiscal_year_id: FiscalYearId,
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub periods: Vec<FiscalPeriod>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PeriodClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodClosed {
    pub tenant_id: TenantId,
    pub fiscal_year_id: FiscalYearId,
    pub period_id: FiscalPeriodId,
    pub seq: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PeriodReopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodReopened {
    pub tenant_id: TenantId,
    pub fiscal_year_id: FiscalYearId,
    pub period_id: FiscalPeriodId,
    pub seq: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FiscalYearClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYearClosed {
    pub tenant_id: TenantId,
    pub fiscal_year_id: FiscalYearId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiscalEvent {
    FiscalYearOpened(FiscalYearOpened),
    PeriodClosed(PeriodClosed),
    PeriodReopened(PeriodReopened),
    FiscalYearClosed(FiscalYearClosed),
}

impl Event for FiscalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FiscalEvent::FiscalYearOpened(_) => "accounting.fiscal_year.opened",
            FiscalEvent::PeriodClosed(_) => "accounting.fiscal_year.period_closed",
            FiscalEvent::PeriodReopened(_) => "accounting.fiscal_year.period_reopened",
            FiscalEvent::FiscalYearClosed(_) => "accounting.fiscal_year.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FiscalEvent::FiscalYearOpened(e) => e.occurred_at,
            FiscalEvent::PeriodClosed(e) => e.occurred_at,
            FiscalEvent::PeriodReopened(e) => e.occurred_at,
            FiscalEvent::FiscalYearClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for FiscalYear {
    type Command = FiscalCommand;
    type Event = FiscalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FiscalEvent::FiscalYearOpened(e) => {
                self.id = e.fiscal_year_id;
                self.tenant_id = Some(e.tenant_id);
                self.label = e.label.clone();
                self.start_date = e.start_date;
                self.end_date = e.end_date;
                self.periods = e.periods.clone();
                self.status = YearStatus::Open;
                self.created = true;
            }
            FiscalEvent::PeriodClosed(e) => {
                if let Some(p) = self.periods.iter_mut().find(|p| p.seq == e.seq) {
                    p.status = PeriodStatus::Closed;
                }
            }
            FiscalEvent::PeriodReopened(e) => {
                if let Some(p) = self.periods.iter_mut().find(|p| p.seq == e.seq) {
                    p.status = PeriodStatus::Open;
                }
            }
            FiscalEvent::FiscalYearClosed(_) => {
                self.status = YearStatus::Closed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FiscalCommand::OpenFiscalYear(cmd) => self.handle_open(cmd),
            FiscalCommand::ClosePeriod(cmd) => self.handle_close_period(cmd),
            FiscalCommand::ReopenPeriod(cmd) => self.handle_reopen_period(cmd),
            FiscalCommand::CloseFiscalYear(cmd) => self.handle_close_year(cmd),
        }
    }
}

/// At most two years of monthly periods per fiscal year.
const MAX_PERIODS: usize = 24;

impl FiscalYear {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_year(&self, tenant_id: TenantId, fiscal_year_id: FiscalYearId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        if self.id != fiscal_year_id {
            return Err(DomainError::invariant("fiscal_year_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenFiscalYear) -> Result<Vec<FiscalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("fiscal year already exists"));
        }
        if cmd.label.trim().is_empty() {
            return Err(DomainError::validation("label", "cannot be empty"));
        }
        if cmd.end_date <= cmd.start_date {
            return Err(DomainError::validation(
                "end_date",
                "must be after start_date",
            ));
        }

        let spans = month_spans(cmd.start_date, cmd.end_date);
        if spans.len() > MAX_PERIODS {
            return Err(DomainError::validation(
                "end_date",
                format!("span exceeds {MAX_PERIODS} monthly periods"),
            ));
        }
        if cmd.period_ids.len() != spans.len() {
            return Err(DomainError::validation(
                "period_ids",
                format!("expected {} period ids", spans.len()),
            ));
        }

        let periods = spans
            .into_iter()
            .zip(cmd.period_ids.iter())
            .enumerate()
            .map(|(i, ((start_date, end_date), period_id))| FiscalPeriod {
                period_id: *period_id,
                seq: (i + 1) as u32,
                start_date,
                end_date,
                status: PeriodStatus::Open,
            })
            .collect();

        Ok(vec![FiscalEvent::FiscalYearOpened(FiscalYearOpened {
            tenant_id: cmd.tenant_id,
            fiscal_year_id: cmd.fiscal_year_id,
            label: cmd.label.clone(),
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            periods,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close_period(&self, cmd: &ClosePeriod) -> Result<Vec<FiscalEvent>, DomainError> {
        self.ensure_year(cmd.tenant_id, cmd.fiscal_year_id)?;
        if self.status == YearStatus::Closed {
            return Err(DomainError::conflict("fiscal year is closed"));
        }

        let Some(period) = self.period_by_seq(cmd.seq) else {
            return Err(DomainError::not_found());
        };
        if period.status == PeriodStatus::Closed {
            return Err(DomainError::conflict("period is already closed"));
        }

        Ok(vec![FiscalEvent::PeriodClosed(PeriodClosed {
            tenant_id: cmd.tenant_id,
            fiscal_year_id: cmd.fiscal_year_id,
            period_id: period.period_id,
            seq: cmd.seq,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen_period(&self, cmd: &ReopenPeriod) -> Result<Vec<FiscalEvent>, DomainError> {
        self.ensure_year(cmd.tenant_id, cmd.fiscal_year_id)?;
        if self.status == YearStatus::Closed {
            return Err(DomainError::conflict("fiscal year is closed"));
        }

        let Some(period) = self.period_by_seq(cmd.seq) else {
            return Err(DomainError::not_found());
        };
        if period.status == PeriodStatus::Open {
            return Err(DomainError::conflict("period is not closed"));
        }

        Ok(vec![FiscalEvent::PeriodReopened(PeriodReopened {
            tenant_id: cmd.tenant_id,
            fiscal_year_id: cmd.fiscal_year_id,
            period_id: period.period_id,
            seq: cmd.seq,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close_year(&self, cmd: &CloseFiscalYear) -> Result<Vec<FiscalEvent>, DomainError> {
        self.ensure_year(cmd.tenant_id, cmd.fiscal_year_id)?;
        if self.status == YearStatus::Closed {
            return Err(DomainError::conflict("fiscal year is already closed"));
        }
        if self.periods.iter().any(|p| p.status == PeriodStatus::Open) {
            return Err(DomainError::invariant(
                "all periods must be closed before closing the year",
            ));
        }

        Ok(vec![FiscalEvent::FiscalYearClosed(FiscalYearClosed {
            tenant_id: cmd.tenant_id,
            fiscal_year_id: cmd.fiscal_year_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
