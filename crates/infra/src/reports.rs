//! Financial statement builders.
//!
//! Pure functions over `PeriodBalance` rows (and, for the cash flow, posted
//! voucher rows): no IO, no store access. The HTTP layer scopes the row sets
//! by fiscal year / period and serializes the results; i128 totals are
//! rendered as strings at that boundary.

use std::collections::BTreeMap;

use ledgerdesk_accounting::account::AccountKind;

use crate::projections::{PeriodBalance, VoucherReadModel};

/// One aggregated account row on the trial balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialBalanceRow {
    pub account_code: String,
    pub account_name: String,
    pub kind: AccountKind,
    pub debit_total: i128,
    pub credit_total: i128,
    /// Signed closing balance, debit-positive.
    pub balance: i128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialBalance {
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: i128,
    pub total_credit: i128,
}

/// Aggregate balances per account code, ordered by code.
pub fn trial_balance(rows: &[PeriodBalance]) -> TrialBalance {
    let mut by_code: BTreeMap<String, TrialBalanceRow> = BTreeMap::new();

    for r in rows {
        let entry = by_code
            .entry(r.account_code.clone())
            .or_insert_with(|| TrialBalanceRow {
                account_code: r.account_code.clone(),
                account_name: r.account_name.clone(),
                kind: r.kind,
                debit_total: 0,
                credit_total: 0,
                balance: 0,
            });
        entry.debit_total += r.debit_total;
        entry.credit_total += r.credit_total;
    }

    let mut total_debit = 0i128;
    let mut total_credit = 0i128;
    let rows = by_code
        .into_values()
        .map(|mut row| {
            row.balance = row.debit_total - row.credit_total;
            total_debit += row.debit_total;
            total_credit += row.credit_total;
            row
        })
        .collect();

    TrialBalance {
        rows,
        total_debit,
        total_credit,
    }
}

/// One statement row with a normal-side-positive amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRow {
    pub account_code: String,
    pub account_name: String,
    pub amount: i128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfitAndLoss {
    pub revenue: Vec<StatementRow>,
    pub expenses: Vec<StatementRow>,
    pub total_revenue: i128,
    pub total_expenses: i128,
    pub net_income: i128,
}

pub fn profit_and_loss(rows: &[PeriodBalance]) -> ProfitAndLoss {
    let tb = trial_balance(rows);

    let mut revenue = Vec::new();
    let mut expenses = Vec::new();
    let mut total_revenue = 0i128;
    let mut total_expenses = 0i128;

    for row in &tb.rows {
        match row.kind {
            AccountKind::Revenue => {
                // Credit-normal: balances are negative when revenue grows.
                let amount = -row.balance;
                total_revenue += amount;
                revenue.push(StatementRow {
                    account_code: row.account_code.clone(),
                    account_name: row.account_name.clone(),
                    amount,
                });
            }
            AccountKind::Expense => {
                let amount = row.balance;
                total_expenses += amount;
                expenses.push(StatementRow {
                    account_code: row.account_code.clone(),
                    account_name: row.account_name.clone(),
                    amount,
                });
            }
            _ => {}
        }
    }

    ProfitAndLoss {
        revenue,
        expenses,
        total_revenue,
        total_expenses,
        net_income: total_revenue - total_expenses,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSheet {
    pub assets: Vec<StatementRow>,
    pub liabilities: Vec<StatementRow>,
    /// Equity rows, including a synthetic retained-earnings row for the net
    /// income accumulated within the scoped rows.
    pub equity: Vec<StatementRow>,
    pub total_assets: i128,
    pub total_liabilities: i128,
    pub total_equity: i128,
}

/// Balance sheet as of the scoped rows (callers pass every period up to and
/// including the selected one). Retained earnings fold revenue and expense
/// activity into equity so assets == liabilities + equity.
pub fn balance_sheet(rows: &[PeriodBalance]) -> BalanceSheet {
    let tb = trial_balance(rows);

    let mut assets = Vec::new();
    let mut liabilities = Vec::new();
    let mut equity = Vec::new();
    let mut total_assets = 0i128;
    let mut total_liabilities = 0i128;
    let mut total_equity = 0i128;
    let mut retained_earnings = 0i128;

    for row in &tb.rows {
        match row.kind {
            AccountKind::Asset => {
                total_assets += row.balance;
                assets.push(StatementRow {
                    account_code: row.account_code.clone(),
                    account_name: row.account_name.clone(),
                    amount: row.balance,
                });
            }
            AccountKind::Liability => {
                let amount = -row.balance;
                total_liabilities += amount;
                liabilities.push(StatementRow {
                    account_code: row.account_code.clone(),
                    account_name: row.account_name.clone(),
                    amount,
                });
            }
            AccountKind::Equity => {
                let amount = -row.balance;
                total_equity += amount;
                equity.push(StatementRow {
                    account_code: row.account_code.clone(),
                    account_name: row.account_name.clone(),
                    amount,
                });
            }
            AccountKind::Revenue => retained_earnings += -row.balance,
            AccountKind::Expense => retained_earnings -= row.balance,
        }
    }

    total_equity += retained_earnings;
    equity.push(StatementRow {
        account_code: String::new(),
        account_name: "Retained earnings".to_string(),
        amount: retained_earnings,
    });

    BalanceSheet {
        assets,
        liabilities,
        equity,
        total_assets,
        total_liabilities,
        total_equity,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CashFlowSection {
    pub inflow: i128,
    pub outflow: i128,
}

impl CashFlowSection {
    pub fn net(&self) -> i128 {
        self.inflow - self.outflow
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CashFlow {
    pub operating: CashFlowSection,
    pub investing: CashFlowSection,
    pub financing: CashFlowSection,
    /// Delta of the cash accounts across the scoped vouchers; equals the sum
    /// of the three section nets.
    pub net_change: i128,
}

/// Classify cash movement by the counterpart account kind.
///
/// Callers pass the posted vouchers in scope and a chart lookup that
/// resolves an account code to `(kind, is_cash)`. Vouchers that never touch
/// a cash account are ignored; within a cash voucher every non-cash line is
/// a counterpart (revenue/expense → operating, non-cash asset → investing,
/// liability/equity → financing).
pub fn cash_flow(
    vouchers: &[VoucherReadModel],
    lookup: impl Fn(&str) -> Option<(AccountKind, bool)>,
) -> CashFlow {
    let mut report = CashFlow::default();

    for voucher in vouchers {
        let mut cash_delta = 0i128;
        let mut counterparts: Vec<(AccountKind, i128)> = Vec::new();

        for l in &voucher.lines {
            let (kind, is_cash) = match lookup(&l.account_code) {
                Some(v) => v,
                None => (AccountKind::Asset, false),
            };
            let delta = l.debit as i128 - l.credit as i128;
            if is_cash {
                cash_delta += delta;
            } else {
                // Cash effect mirrors the counterpart: crediting revenue
                // means cash came in.
                counterparts.push((kind, -delta));
            }
        }

        if cash_delta == 0 {
            continue;
        }
        report.net_change += cash_delta;

        for (kind, effect) in counterparts {
            let section = match kind {
                AccountKind::Revenue | AccountKind::Expense => &mut report.operating,
                AccountKind::Asset => &mut report.investing,
                AccountKind::Liability | AccountKind::Equity => &mut report.financing,
            };
            if effect >= 0 {
                section.inflow += effect;
            } else {
                section.outflow += -effect;
            }
        }
    }

    report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareholdersEquity {
    /// Equity plus accumulated net income from the prior rows.
    pub opening_equity: i128,
    /// Credits to equity accounts within the scope.
    pub contributions: i128,
    /// Debits to equity accounts within the scope.
    pub withdrawals: i128,
    pub net_income: i128,
    pub closing_equity: i128,
}

/// Movement statement: `prior` rows are the year's periods before the scope
/// (empty when the whole year is selected), `scope` rows are the selected
/// periods.
pub fn shareholders_equity(prior: &[PeriodBalance], scope: &[PeriodBalance]) -> ShareholdersEquity {
    let opening_equity = equity_balance(prior) + net_income(prior);

    let mut contributions = 0i128;
    let mut withdrawals = 0i128;
    for r in scope {
        if r.kind == AccountKind::Equity {
            contributions += r.credit_total;
            withdrawals += r.debit_total;
        }
    }

    let net = net_income(scope);

    ShareholdersEquity {
        opening_equity,
        contributions,
        withdrawals,
        net_income: net,
        closing_equity: opening_equity + contributions - withdrawals + net,
    }
}

fn equity_balance(rows: &[PeriodBalance]) -> i128 {
    rows.iter()
        .filter(|r| r.kind == AccountKind::Equity)
        .map(|r| r.credit_total - r.debit_total)
        .sum()
}

fn net_income(rows: &[PeriodBalance]) -> i128 {
    let mut net = 0i128;
    for r in rows {
        match r.kind {
            AccountKind::Revenue => net += r.credit_total - r.debit_total,
            AccountKind::Expense => net -= r.debit_total - r.credit_total,
            _ => {}
        }
    }
    net
}
