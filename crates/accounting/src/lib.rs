//! Accounting module (chart of accounts, fiscal calendar, double-entry
//! vouchers), event-sourced.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod fiscal;
pub mod voucher;

pub use account::{
    AccountArchived, AccountCommand, AccountEvent, AccountId, AccountKind, AccountOpened,
    AccountStatus, AccountUpdated, ArchiveAccount, ChartAccount, OpenAccount, UpdateAccount,
};
pub use fiscal::{
    CloseFiscalYear, ClosePeriod, FiscalCommand, FiscalEvent, FiscalPeriod, FiscalPeriodId,
    FiscalYear, FiscalYearClosed, FiscalYearId, FiscalYearOpened, OpenFiscalYear, PeriodClosed,
    PeriodReopened, PeriodStatus, ReopenPeriod, YearStatus, month_spans,
};
pub use voucher::{
    ApproveVoucher, CancelVoucher, DraftVoucher, PostVoucher, ReviseVoucher, Voucher,
    VoucherApproved, VoucherCancelled, VoucherCommand, VoucherDrafted, VoucherEvent, VoucherId,
    VoucherLine, VoucherPosted, VoucherRevised, VoucherStatus, line_totals,
};
