use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgerdesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use ledgerdesk_events::Event;

use crate::fiscal::{FiscalPeriodId, FiscalYearId};

/// Voucher identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherId(pub AggregateId);

impl VoucherId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VoucherId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Voucher lifecycle. Posted vouchers are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Draft,
    Approved,
    Posted,
    Cancelled,
}

impl VoucherStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VoucherStatus::Draft => "draft",
            VoucherStatus::Approved => "approved",
            VoucherStatus::Posted => "posted",
            VoucherStatus::Cancelled => "cancelled",
        }
    }
}

/// One voucher line. Amounts are in minor units; exactly one of
/// `debit` / `credit` is positive and the other zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherLine {
    pub account_code: String,
    pub account_name: String,
    pub debit: i64,
    pub credit: i64,
    pub description: Option<String>,
}

/// Debit and credit totals of a line set, computed in i128 so the sums
/// cannot overflow for any realistic voucher.
pub fn line_totals(lines: &[VoucherLine]) -> (i128, i128) {
    let mut debit_total: i128 = 0;
    let mut credit_total: i128 = 0;
    for line in lines {
        debit_total += line.debit as i128;
        credit_total += line.credit as i128;
    }
    (debit_total, credit_total)
}

fn validate_lines(lines: &[VoucherLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "lines",
            "voucher must have at least one line",
        ));
    }

    for (i, line) in lines.iter().enumerate() {
        let n = i + 1;
        if line.account_code.trim().is_empty() {
            return Err(DomainError::validation(
                "lines",
                format!("line {n}: account_code cannot be empty"),
            ));
        }
        if line.debit < 0 || line.credit < 0 {
            return Err(DomainError::validation(
                "lines",
                format!("line {n}: amounts cannot be negative"),
            ));
        }
        if (line.debit > 0) == (line.credit > 0) {
            return Err(DomainError::validation(
                "lines",
                format!("line {n}: exactly one of debit or credit must be positive"),
            ));
        }
    }

    let (debit_total, credit_total) = line_totals(lines);
    if debit_total != credit_total {
        return Err(DomainError::invariant("debits must equal credits"));
    }

    Ok(())
}

/// Aggregate root: Voucher (double-entry journal document).
///
/// Note: the voucher does NOT hold running balances; those are derived by
/// projections over `VoucherPosted` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voucher {
    id: VoucherId,
    tenant_id: Option<TenantId>,
    voucher_no: String,
    fiscal_year_id: Option<FiscalYearId>,
    fiscal_period_id: Option<FiscalPeriodId>,
    narration: Option<String>,
    lines: Vec<VoucherLine>,
    status: VoucherStatus,
    posted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Voucher {
    /// Empty aggregate for rehydration.
    pub fn empty(id: VoucherId) -> Self {
        Self {
            id,
            tenant_id: None,
            voucher_no: String::new(),
            fiscal_year_id: None,
            fiscal_period_id: None,
            narration: None,
            lines: Vec::new(),
            status: VoucherStatus::Draft,
            posted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> VoucherId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn voucher_no(&self) -> &str {
        &self.voucher_no
    }

    pub fn fiscal_year_id(&self) -> Option<FiscalYearId> {
        self.fiscal_year_id
    }

    pub fn fiscal_period_id(&self) -> Option<FiscalPeriodId> {
        self.fiscal_period_id
    }

    pub fn narration(&self) -> Option<&str> {
        self.narration.as_deref()
    }

    pub fn lines(&self) -> &[VoucherLine] {
        &self.lines
    }

    pub fn status(&self) -> VoucherStatus {
        self.status
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.posted_at
    }
}

impl AggregateRoot for Voucher {
    type Id = VoucherId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: DraftVoucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftVoucher {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub voucher_no: String,
    pub fiscal_year_id: FiscalYearId,
    pub fiscal_period_id: FiscalPeriodId,
    pub narration: Option<String>,
    pub lines: Vec<VoucherLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReviseVoucher. Replaces the narration and the full line set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseVoucher {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub narration: Option<String>,
    pub lines: Vec<VoucherLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveVoucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveVoucher {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostVoucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostVoucher {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub posted_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelVoucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelVoucher {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherCommand {
    DraftVoucher(DraftVoucher),
    ReviseVoucher(ReviseVoucher),
    ApproveVoucher(ApproveVoucher),
    PostVoucher(PostVoucher),
    CancelVoucher(CancelVoucher),
}

/// Event: VoucherDrafted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherDrafted {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub voucher_no: String,
    pub fiscal_year_id: FiscalYearId,
    pub fiscal_period_id: FiscalPeriodId,
    pub narration: Option<String>,
    pub lines: Vec<VoucherLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VoucherRevised. Carries the replacement narration and lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherRevised {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub narration: Option<String>,
    pub lines: Vec<VoucherLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VoucherApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherApproved {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VoucherPosted. Carries the lines so balance projections are
/// self-contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherPosted {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub voucher_no: String,
    pub fiscal_year_id: FiscalYearId,
    pub fiscal_period_id: FiscalPeriodId,
    pub lines: Vec<VoucherLine>,
    pub posted_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VoucherCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherCancelled {
    pub tenant_id: TenantId,
    pub voucher_id: VoucherId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherEvent {
    VoucherDrafted(VoucherDrafted),
    VoucherRevised(VoucherRevised),
    VoucherApproved(VoucherApproved),
    VoucherPosted(VoucherPosted),
    VoucherCancelled(VoucherCancelled),
}

impl Event for VoucherEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VoucherEvent::VoucherDrafted(_) => "accounting.voucher.drafted",
            VoucherEvent::VoucherRevised(_) => "accounting.voucher.revised",
            VoucherEvent::VoucherApproved(_) => "accounting.voucher.approved",
            VoucherEvent::VoucherPosted(_) => "accounting.voucher.posted",
            VoucherEvent::VoucherCancelled(_) => "accounting.voucher.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VoucherEvent::VoucherDrafted(e) => e.occurred_at,
            VoucherEvent::VoucherRevised(e) => e.occurred_at,
            VoucherEvent::VoucherApproved(e) => e.occurred_at,
            VoucherEvent::VoucherPosted(e) => e.occurred_at,
            VoucherEvent::VoucherCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Voucher {
    type Command = VoucherCommand;
    type Event = VoucherEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VoucherEvent::VoucherDrafted(e) => {
                self.id = e.voucher_id;
                self.tenant_id = Some(e.tenant_id);
                self.voucher_no = e.voucher_no.clone();
                self.fiscal_year_id = Some(e.fiscal_year_id);
                self.fiscal_period_id = Some(e.fiscal_period_id);
                self.narration = e.narration.clone();
                self.lines = e.lines.clone();
                self.status = VoucherStatus::Draft;
                self.created = true;
            }
            VoucherEvent::VoucherRevised(e) => {
                self.narration = e.narration.clone();
                self.lines = e.lines.clone();
            }
            VoucherEvent::VoucherApproved(_) => {
                self.status = VoucherStatus::Approved;
            }
            VoucherEvent::VoucherPosted(e) => {
                self.status = VoucherStatus::Posted;
                self.posted_at = Some(e.posted_at);
            }
            VoucherEvent::VoucherCancelled(_) => {
                self.status = VoucherStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VoucherCommand::DraftVoucher(cmd) => self.handle_draft(cmd),
            VoucherCommand::ReviseVoucher(cmd) => self.handle_revise(cmd),
            VoucherCommand::ApproveVoucher(cmd) => self.handle_approve(cmd),
            VoucherCommand::PostVoucher(cmd) => self.handle_post(cmd),
            VoucherCommand::CancelVoucher(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Voucher {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_voucher(&self, tenant_id: TenantId, voucher_id: VoucherId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        if self.id != voucher_id {
            return Err(DomainError::invariant("voucher_id mismatch"));
        }
        Ok(())
    }

    fn handle_draft(&self, cmd: &DraftVoucher) -> Result<Vec<VoucherEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("voucher already exists"));
        }
        if cmd.voucher_no.trim().is_empty() {
            return Err(DomainError::validation("voucher_no", "cannot be empty"));
        }
        validate_lines(&cmd.lines)?;

        Ok(vec![VoucherEvent::VoucherDrafted(VoucherDrafted {
            tenant_id: cmd.tenant_id,
            voucher_id: cmd.voucher_id,
            voucher_no: cmd.voucher_no.trim().to_string(),
            fiscal_year_id: cmd.fiscal_year_id,
            fiscal_period_id: cmd.fiscal_period_id,
            narration: cmd.narration.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseVoucher) -> Result<Vec<VoucherEvent>, DomainError> {
        self.ensure_voucher(cmd.tenant_id, cmd.voucher_id)?;
        if self.status != VoucherStatus::Draft {
            return Err(DomainError::conflict("only draft vouchers can be revised"));
        }
        validate_lines(&cmd.lines)?;

        Ok(vec![VoucherEvent::VoucherRevised(VoucherRevised {
            tenant_id: cmd.tenant_id,
            voucher_id: cmd.voucher_id,
            narration: cmd.narration.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveVoucher) -> Result<Vec<VoucherEvent>, DomainError> {
        self.ensure_voucher(cmd.tenant_id, cmd.voucher_id)?;
        if self.status != VoucherStatus::Draft {
            return Err(DomainError::conflict("only draft vouchers can be approved"));
        }

        Ok(vec![VoucherEvent::VoucherApproved(VoucherApproved {
            tenant_id: cmd.tenant_id,
            voucher_id: cmd.voucher_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostVoucher) -> Result<Vec<VoucherEvent>, DomainError> {
        self.ensure_voucher(cmd.tenant_id, cmd.voucher_id)?;
        if self.status != VoucherStatus::Approved {
            return Err(DomainError::conflict("only approved vouchers can be posted"));
        }
        // The line set was validated at draft/revise; re-check before the
        // voucher becomes immutable.
        validate_lines(&self.lines)?;

        let (Some(fiscal_year_id), Some(fiscal_period_id)) =
            (self.fiscal_year_id, self.fiscal_period_id)
        else {
            return Err(DomainError::invariant("voucher is missing its fiscal scope"));
        };

        Ok(vec![VoucherEvent::VoucherPosted(VoucherPosted {
            tenant_id: cmd.tenant_id,
            voucher_id: cmd.voucher_id,
            voucher_no: self.voucher_no.clone(),
            fiscal_year_id,
            fiscal_period_id,
            lines: self.lines.clone(),
            posted_at: cmd.posted_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelVoucher) -> Result<Vec<VoucherEvent>, DomainError> {
        self.ensure_voucher(cmd.tenant_id, cmd.voucher_id)?;
        match self.status {
            VoucherStatus::Posted => {
                return Err(DomainError::invariant("posted vouchers are immutable"));
            }
            VoucherStatus::Cancelled => {
                return Err(DomainError::conflict("voucher is already cancelled"));
            }
            VoucherStatus::Draft | VoucherStatus::Approved => {}
        }

        Ok(vec![VoucherEvent::VoucherCancelled(VoucherCancelled {
            tenant_id: cmd.tenant_id,
            voucher_id: cmd.voucher_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdesk_core::AggregateId;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_voucher_id() -> VoucherId {
        VoucherId::new(AggregateId::new())
    }

    fn test_year_id() -> FiscalYearId {
        FiscalYearId::new(AggregateId::new())
    }

    fn test_period_id() -> FiscalPeriodId {
        FiscalPeriodId::new(Uuid::now_v7())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn debit_line(code: &str, amount: i64) -> VoucherLine {
        VoucherLine {
            account_code: code.to_string(),
            account_name: code.to_string(),
            debit: amount,
            credit: 0,
            description: None,
        }
    }

    fn credit_line(code: &str, amount: i64) -> VoucherLine {
        VoucherLine {
            account_code: code.to_string(),
            account_name: code.to_string(),
            debit: 0,
            credit: amount,
            description: None,
        }
    }

    fn draft_cmd(
        tenant_id: TenantId,
        voucher_id: VoucherId,
        lines: Vec<VoucherLine>,
    ) -> DraftVoucher {
        DraftVoucher {
            tenant_id,
            voucher_id,
            voucher_no: "V-1001".to_string(),
            fiscal_year_id: test_year_id(),
            fiscal_period_id: test_period_id(),
            narration: Some("Opening entry".to_string()),
            lines,
            occurred_at: test_time(),
        }
    }

    fn drafted_voucher(tenant_id: TenantId, voucher_id: VoucherId) -> Voucher {
        let mut voucher = Voucher::empty(voucher_id);
        let cmd = draft_cmd(
            tenant_id,
            voucher_id,
            vec![debit_line("1000", 100), credit_line("2000", 100)],
        );
        let events = voucher.handle(&VoucherCommand::DraftVoucher(cmd)).unwrap();
        voucher.apply(&events[0]);
        voucher
    }

    fn approve(voucher: &mut Voucher, tenant_id: TenantId, voucher_id: VoucherId) {
        let cmd = ApproveVoucher {
            tenant_id,
            voucher_id,
            occurred_at: test_time(),
        };
        let events = voucher.handle(&VoucherCommand::ApproveVoucher(cmd)).unwrap();
        voucher.apply(&events[0]);
    }

    #[test]
    fn draft_balanced_voucher_emits_event() {
        let tenant_id = test_tenant_id();
        let voucher_id = test_voucher_id();
        let voucher = Voucher::empty(voucher_id);

        let lines = vec![debit_line("1000", 100), credit_line("2000", 100)];
        let cmd = draft_cmd(tenant_id, voucher_id, lines.clone());
        let events = voucher.handle(&VoucherCommand::DraftVoucher(cmd)).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            VoucherEvent::VoucherDrafted(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.voucher_id, voucher_id);
                assert_eq!(e.voucher_no, "V-1001");
                assert_eq!(e.lines, lines);
            }
            _ => panic!("Expected VoucherDrafted"),
        }
    }

    #[test]
    fn unbalanced_draft_is_rejected() {
        let voucher = Voucher::empty(test_voucher_id());
        let cmd = draft_cmd(
            test_tenant_id(),
            test_voucher_id(),
            vec![debit_line("1000", 100), credit_line("2000", 50)],
        );
        let err = voucher.handle(&VoucherCommand::DraftVoucher(cmd)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("debits must equal credits") => {}
            _ => panic!("Expected invariant violation for unbalanced voucher"),
        }
    }

    #[test]
    fn line_with_both_sides_set_is_rejected() {
        let voucher = Voucher::empty(test_voucher_id());
        let mut bad = debit_line("1000", 100);
        bad.credit = 100;
        let cmd = draft_cmd(test_tenant_id(), test_voucher_id(), vec![bad]);
        let err = voucher.handle(&VoucherCommand::DraftVoucher(cmd)).unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "lines"),
            _ => panic!("Expected Validation error for two-sided line"),
        }
    }

    #[test]
    fn line_with_no_amount_is_rejected() {
        let voucher = Voucher::empty(test_voucher_id());
        let cmd = draft_cmd(
            test_tenant_id(),
            test_voucher_id(),
            vec![debit_line("1000", 0), credit_line("2000", 0)],
        );
        let err = voucher.handle(&VoucherCommand::DraftVoucher(cmd)).unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "lines"),
            _ => panic!("Expected Validation error for empty line"),
        }
    }

    #[test]
    fn negative_amount_is_rejected() {
        let voucher = Voucher::empty(test_voucher_id());
        let cmd = draft_cmd(
            test_tenant_id(),
            test_voucher_id(),
            vec![debit_line("1000", -100), credit_line("2000", -100)],
        );
        let err = voucher.handle(&VoucherCommand::DraftVoucher(cmd)).unwrap_err();
        match err {
            DomainError::Validation { field, .. } => assert_eq!(field, "lines"),
            _ => panic!("Expected Validation error for negative amounts"),
        }
    }

    #[test]
    fn revise_replaces_lines_in_draft() {
        let tenant_id = test_tenant_id();
        let voucher_id = test_voucher_id();
        let mut voucher = drafted_voucher(tenant_id, voucher_id);

        let replacement = vec![debit_line("1100", 250), credit_line("4000", 250)];
        let cmd = ReviseVoucher {
            tenant_id,
            voucher_id,
            narration: None,
            lines: replacement.clone(),
            occurred_at: test_time(),
        };
        let events = voucher.handle(&VoucherCommand::ReviseVoucher(cmd)).unwrap();
        voucher.apply(&events[0]);
        assert_eq!(voucher.lines(), replacement.as_slice());
        assert_eq!(voucher.narration(), None);
    }

    #[test]
    fn approve_then_post_sets_posted_at() {
        let tenant_id = test_tenant_id();
        let voucher_id = test_voucher_id();
        let mut voucher = drafted_voucher(tenant_id, voucher_id);

        approve(&mut voucher, tenant_id, voucher_id);
        assert_eq!(voucher.status(), VoucherStatus::Approved);

        let posted_at = test_time();
        let cmd = PostVoucher {
            tenant_id,
            voucher_id,
            posted_at,
            occurred_at: posted_at,
        };
        let events = voucher.handle(&VoucherCommand::PostVoucher(cmd)).unwrap();
        match &events[0] {
            VoucherEvent::VoucherPosted(e) => {
                assert_eq!(e.lines, voucher.lines());
                assert_eq!(e.posted_at, posted_at);
            }
            _ => panic!("Expected VoucherPosted"),
        }
        voucher.apply(&events[0]);
        assert_eq!(voucher.status(), VoucherStatus::Posted);
        assert_eq!(voucher.posted_at(), Some(posted_at));
    }

    #[test]
    fn post_requires_approval_first() {
        let tenant_id = test_tenant_id();
        let voucher_id = test_voucher_id();
        let voucher = drafted_voucher(tenant_id, voucher_id);

        let cmd = PostVoucher {
            tenant_id,
            voucher_id,
            posted_at: test_time(),
            occurred_at: test_time(),
        };
        let err = voucher.handle(&VoucherCommand::PostVoucher(cmd)).unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict when posting a draft"),
        }
    }

    #[test]
    fn revise_after_approval_conflicts() {
        let tenant_id = test_tenant_id();
        let voucher_id = test_voucher_id();
        let mut voucher = drafted_voucher(tenant_id, voucher_id);
        approve(&mut voucher, tenant_id, voucher_id);

        let cmd = ReviseVoucher {
            tenant_id,
            voucher_id,
            narration: None,
            lines: vec![debit_line("1000", 10), credit_line("2000", 10)],
            occurred_at: test_time(),
        };
        let err = voucher.handle(&VoucherCommand::ReviseVoucher(cmd)).unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict when revising an approved voucher"),
        }
    }

    #[test]
    fn posted_voucher_cannot_be_cancelled() {
        let tenant_id = test_tenant_id();
        let voucher_id = test_voucher_id();
        let mut voucher = drafted_voucher(tenant_id, voucher_id);
        approve(&mut voucher, tenant_id, voucher_id);

        let post = PostVoucher {
            tenant_id,
            voucher_id,
            posted_at: test_time(),
            occurred_at: test_time(),
        };
        let events = voucher.handle(&VoucherCommand::PostVoucher(post)).unwrap();
        voucher.apply(&events[0]);

        let cancel = CancelVoucher {
            tenant_id,
            voucher_id,
            reason: Some("typo".to_string()),
            occurred_at: test_time(),
        };
        let err = voucher.handle(&VoucherCommand::CancelVoucher(cancel)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("immutable") => {}
            _ => panic!("Expected invariant violation for cancelling a posted voucher"),
        }
    }

    #[test]
    fn cancel_from_draft_and_double_cancel() {
        let tenant_id = test_tenant_id();
        let voucher_id = test_voucher_id();
        let mut voucher = drafted_voucher(tenant_id, voucher_id);

        let cancel = CancelVoucher {
            tenant_id,
            voucher_id,
            reason: None,
            occurred_at: test_time(),
        };
        let events = voucher
            .handle(&VoucherCommand::CancelVoucher(cancel.clone()))
            .unwrap();
        voucher.apply(&events[0]);
        assert_eq!(voucher.status(), VoucherStatus::Cancelled);

        let err = voucher.handle(&VoucherCommand::CancelVoucher(cancel)).unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict for double cancel"),
        }
    }

    #[test]
    fn act_before_draft_is_not_found() {
        let voucher = Voucher::empty(test_voucher_id());
        let cmd = ApproveVoucher {
            tenant_id: test_tenant_id(),
            voucher_id: test_voucher_id(),
            occurred_at: test_time(),
        };
        let err = voucher.handle(&VoucherCommand::ApproveVoucher(cmd)).unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound before drafting"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any generated sequence of balanced vouchers taken
        /// through draft -> approve -> post, the sum of debits minus credits
        /// across all posted events is zero.
        #[test]
        fn posted_events_stay_balanced(
            amounts in prop::collection::vec(1i64..1_000_000i64, 1..10)
        ) {
            let tenant_id = test_tenant_id();
            let mut posted: Vec<VoucherEvent> = Vec::new();

            for amount in amounts {
                let voucher_id = test_voucher_id();
                let mut voucher = Voucher::empty(voucher_id);

                let cmd = draft_cmd(
                    tenant_id,
                    voucher_id,
                    vec![debit_line("1000", amount), credit_line("2000", amount)],
                );
                let events = voucher.handle(&VoucherCommand::DraftVoucher(cmd)).unwrap();
                for e in &events {
                    voucher.apply(e);
                }

                approve(&mut voucher, tenant_id, voucher_id);

                let post = PostVoucher {
                    tenant_id,
                    voucher_id,
                    posted_at: test_time(),
                    occurred_at: test_time(),
                };
                let events = voucher.handle(&VoucherCommand::PostVoucher(post)).unwrap();
                for e in &events {
                    voucher.apply(e);
                }
                posted.extend(events);
            }

            let mut total: i128 = 0;
            for ev in &posted {
                if let VoucherEvent::VoucherPosted(vp) = ev {
                    let (debit_total, credit_total) = line_totals(&vp.lines);
                    total += debit_total - credit_total;
                }
            }

            prop_assert_eq!(total, 0);
        }

        /// Property: skewing the credit side of an otherwise balanced
        /// voucher always rejects the draft.
        #[test]
        fn skewed_vouchers_are_rejected(
            amount in 1i64..1_000_000i64,
            skew in 1i64..1_000i64,
        ) {
            let voucher = Voucher::empty(test_voucher_id());
            let cmd = draft_cmd(
                test_tenant_id(),
                test_voucher_id(),
                vec![debit_line("1000", amount + skew), credit_line("2000", amount)],
            );
            let err = voucher.handle(&VoucherCommand::DraftVoucher(cmd)).unwrap_err();
            prop_assert!(matches!(err, DomainError::InvariantViolation(_)));
        }
    }
}
