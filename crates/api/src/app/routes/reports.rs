//! Financial statement endpoints. All of these read the period-balance
//! projection (and, for cash flow, the voucher register) and run the pure
//! report builders over the scoped rows; i128 totals go over the wire as
//! decimal strings.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};

use ledgerdesk_accounting::fiscal::{FiscalPeriodId, FiscalYearId};
use ledgerdesk_accounting::voucher::VoucherStatus;
use ledgerdesk_auth::Permission;
use ledgerdesk_infra::projections::{FiscalYearReadModel, PeriodBalance};
use ledgerdesk_infra::reports::{
    self, CashFlowSection, StatementRow, TrialBalanceRow,
};

use crate::app::routes::common::{parse_aggregate_id, parse_uuid};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const READ: &str = "reports.read";

pub fn router() -> Router {
    Router::new()
        .route("/trial-balance", get(trial_balance))
        .route("/profit-loss", get(profit_loss))
        .route("/balance-sheet", get(balance_sheet))
        .route("/cash-flow", get(cash_flow))
        .route("/shareholders-equity", get(shareholders_equity))
}

#[derive(Debug, Default, Deserialize)]
struct ReportQuery {
    fiscal_year_id: Option<String>,
    fiscal_period_id: Option<String>,
}

struct ReportScope {
    year: FiscalYearReadModel,
    period_id: Option<FiscalPeriodId>,
}

impl ReportScope {
    fn period_seq(&self) -> Option<u32> {
        let id = self.period_id?;
        self.year.period_by_id(id).map(|p| p.seq)
    }

    /// seq for each balance row, via the year's calendar.
    fn seq_of(&self, row: &PeriodBalance) -> Option<u32> {
        self.year.period_by_id(row.fiscal_period_id).map(|p| p.seq)
    }
}

fn resolve_scope(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    query: &ReportQuery,
) -> Result<ReportScope, axum::response::Response> {
    if let Err(e) = crate::authz::require(tenant, principal, &Permission::new(READ)) {
        return Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            e.to_string(),
        ));
    }

    let raw_year = match query.fiscal_year_id.as_deref() {
        Some(v) => v,
        None => return Err(errors::validation_error("fiscal_year_id", "is required")),
    };
    let year_id = FiscalYearId::new(parse_aggregate_id(raw_year, "fiscal year id")?);
    let year = match services.fiscal_years_get(tenant.tenant_id(), year_id) {
        Some(y) => y,
        None => {
            return Err(errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                "fiscal year not found",
            ));
        }
    };

    let period_id = match query.fiscal_period_id.as_deref() {
        Some(raw) => {
            let id = FiscalPeriodId::new(parse_uuid(raw, "fiscal period id")?);
            if year.period_by_id(id).is_none() {
                return Err(errors::validation_error(
                    "fiscal_period_id",
                    "period does not belong to the fiscal year",
                ));
            }
            Some(id)
        }
        None => None,
    };

    Ok(ReportScope { year, period_id })
}

/// Balance rows restricted to the selected period, or the whole year.
fn scoped_rows(rows: &[PeriodBalance], scope: &ReportScope) -> Vec<PeriodBalance> {
    match scope.period_id {
        Some(p) => rows
            .iter()
            .filter(|r| r.fiscal_period_id == p)
            .cloned()
            .collect(),
        None => rows.to_vec(),
    }
}

async fn trial_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ReportQuery>,
) -> axum::response::Response {
    let scope = match resolve_scope(&services, &tenant, &principal, &query) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let rows = services.balances_for_year(tenant.tenant_id(), scope.year.fiscal_year_id);
    let report = reports::trial_balance(&scoped_rows(&rows, &scope));

    (
        StatusCode::OK,
        Json(json!({
            "fiscal_year_id": scope.year.fiscal_year_id.0.to_string(),
            "fiscal_period_id": scope.period_id.map(|p| p.0.to_string()),
            "rows": report.rows.iter().map(trial_balance_row_to_json).collect::<Vec<_>>(),
            "total_debit": report.total_debit.to_string(),
            "total_credit": report.total_credit.to_string(),
        })),
    )
        .into_response()
}

async fn profit_loss(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ReportQuery>,
) -> axum::response::Response {
    let scope = match resolve_scope(&services, &tenant, &principal, &query) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let rows = services.balances_for_year(tenant.tenant_id(), scope.year.fiscal_year_id);
    let report = reports::profit_and_loss(&scoped_rows(&rows, &scope));

    (
        StatusCode::OK,
        Json(json!({
            "fiscal_year_id": scope.year.fiscal_year_id.0.to_string(),
            "fiscal_period_id": scope.period_id.map(|p| p.0.to_string()),
            "revenue": statement_rows_to_json(&report.revenue),
            "expenses": statement_rows_to_json(&report.expenses),
            "total_revenue": report.total_revenue.to_string(),
            "total_expenses": report.total_expenses.to_string(),
            "net_income": report.net_income.to_string(),
        })),
    )
        .into_response()
}

async fn balance_sheet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ReportQuery>,
) -> axum::response::Response {
    let scope = match resolve_scope(&services, &tenant, &principal, &query) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let rows = services.balances_for_year(tenant.tenant_id(), scope.year.fiscal_year_id);

    // A balance sheet is a point-in-time statement: when a period is selected
    // it covers every period up to and including it.
    let as_of: Vec<PeriodBalance> = match scope.period_seq() {
        Some(seq) => rows
            .iter()
            .filter(|r| scope.seq_of(r).is_some_and(|s| s <= seq))
            .cloned()
            .collect(),
        None => rows.clone(),
    };
    let report = reports::balance_sheet(&as_of);

    (
        StatusCode::OK,
        Json(json!({
            "fiscal_year_id": scope.year.fiscal_year_id.0.to_string(),
            "fiscal_period_id": scope.period_id.map(|p| p.0.to_string()),
            "assets": statement_rows_to_json(&report.assets),
            "liabilities": statement_rows_to_json(&report.liabilities),
            "equity": statement_rows_to_json(&report.equity),
            "total_assets": report.total_assets.to_string(),
            "total_liabilities": report.total_liabilities.to_string(),
            "total_equity": report.total_equity.to_string(),
        })),
    )
        .into_response()
}

async fn cash_flow(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ReportQuery>,
) -> axum::response::Response {
    let scope = match resolve_scope(&services, &tenant, &principal, &query) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let mut vouchers = services.vouchers_list(tenant.tenant_id());
    vouchers.retain(|v| {
        v.status == VoucherStatus::Posted && v.fiscal_year_id == scope.year.fiscal_year_id
    });
    if let Some(p) = scope.period_id {
        vouchers.retain(|v| v.fiscal_period_id == p);
    }

    let tenant_id = tenant.tenant_id();
    let report = reports::cash_flow(&vouchers, |code| {
        services
            .accounts_get(tenant_id, code)
            .map(|a| (a.kind, a.is_cash))
    });

    (
        StatusCode::OK,
        Json(json!({
            "fiscal_year_id": scope.year.fiscal_year_id.0.to_string(),
            "fiscal_period_id": scope.period_id.map(|p| p.0.to_string()),
            "operating": cash_flow_section_to_json(&report.operating),
            "investing": cash_flow_section_to_json(&report.investing),
            "financing": cash_flow_section_to_json(&report.financing),
            "net_change": report.net_change.to_string(),
        })),
    )
        .into_response()
}

async fn shareholders_equity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ReportQuery>,
) -> axum::response::Response {
    let scope = match resolve_scope(&services, &tenant, &principal, &query) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let rows = services.balances_for_year(tenant.tenant_id(), scope.year.fiscal_year_id);

    let (prior, in_scope): (Vec<PeriodBalance>, Vec<PeriodBalance>) = match scope.period_seq() {
        Some(seq) => {
            let prior = rows
                .iter()
                .filter(|r| scope.seq_of(r).is_some_and(|s| s < seq))
                .cloned()
                .collect();
            (prior, scoped_rows(&rows, &scope))
        }
        None => (Vec::new(), rows.clone()),
    };
    let report = reports::shareholders_equity(&prior, &in_scope);

    (
        StatusCode::OK,
        Json(json!({
            "fiscal_year_id": scope.year.fiscal_year_id.0.to_string(),
            "fiscal_period_id": scope.period_id.map(|p| p.0.to_string()),
            "opening_equity": report.opening_equity.to_string(),
            "contributions": report.contributions.to_string(),
            "withdrawals": report.withdrawals.to_string(),
            "net_income": report.net_income.to_string(),
            "closing_equity": report.closing_equity.to_string(),
        })),
    )
        .into_response()
}

fn trial_balance_row_to_json(row: &TrialBalanceRow) -> Value {
    json!({
        "account_code": row.account_code,
        "account_name": row.account_name,
        "kind": dto::account_kind_str(row.kind),
        "debit_total": row.debit_total.to_string(),
        "credit_total": row.credit_total.to_string(),
        "balance": row.balance.to_string(),
    })
}

fn statement_rows_to_json(rows: &[StatementRow]) -> Vec<Value> {
    rows.iter()
        .map(|r| {
            json!({
                "account_code": r.account_code,
                "account_name": r.account_name,
                "amount": r.amount.to_string(),
            })
        })
        .collect()
}

fn cash_flow_section_to_json(s: &CashFlowSection) -> Value {
    json!({
        "inflow": s.inflow.to_string(),
        "outflow": s.outflow.to_string(),
        "net": s.net().to_string(),
    })
}
