use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;

use ledgerdesk_accounting::fiscal::{FiscalPeriodId, FiscalYearId};
use ledgerdesk_accounting::voucher::{
    ApproveVoucher, CancelVoucher, DraftVoucher, PostVoucher, ReviseVoucher, Voucher,
    VoucherCommand, VoucherId, VoucherLine,
};
use ledgerdesk_auth::Permission;
use ledgerdesk_core::AggregateId;

use crate::app::routes::common::{CmdAuth, id_message, matches_search, parse_aggregate_id, parse_uuid};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const READ: &str = "accounting.vouchers.read";
const WRITE: &str = "accounting.vouchers.write";

pub fn router() -> Router {
    Router::new()
        .route("/", post(draft_voucher).get(list_vouchers))
        .route("/:id", get(get_voucher).patch(revise_voucher))
        .route("/:id/approve", post(approve_voucher))
        .route("/:id/post", post(post_voucher))
        .route("/:id/cancel", post(cancel_voucher))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    status: Option<String>,
    fiscal_year_id: Option<String>,
    fiscal_period_id: Option<String>,
    search: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

/// Resolve request lines against the chart: codes must be postable, and the
/// account name is snapshotted from the chart so vouchers stay readable after
/// renames.
fn resolve_lines(
    services: &AppServices,
    tenant: &TenantContext,
    req_lines: Vec<dto::VoucherLineRequest>,
) -> Result<Vec<VoucherLine>, axum::response::Response> {
    let mut lines = Vec::with_capacity(req_lines.len());
    for l in req_lines {
        let account = services
            .accounts_get(tenant.tenant_id(), &l.account_code)
            .filter(|a| a.is_postable());
        let account = match account {
            Some(a) => a,
            None => {
                return Err(errors::validation_error(
                    "lines",
                    format!("unknown or archived account code: {}", l.account_code),
                ));
            }
        };
        lines.push(VoucherLine {
            account_code: l.account_code,
            account_name: account.name,
            debit: l.debit,
            credit: l.credit,
            description: l.description,
        });
    }
    Ok(lines)
}

/// Check year existence and period membership for a draft.
fn resolve_fiscal_scope(
    services: &AppServices,
    tenant: &TenantContext,
    fiscal_year_id: &str,
    fiscal_period_id: &str,
) -> Result<(FiscalYearId, FiscalPeriodId), axum::response::Response> {
    let year_agg = parse_aggregate_id(fiscal_year_id, "fiscal year id")?;
    let year_id = FiscalYearId::new(year_agg);
    let year = match services.fiscal_years_get(tenant.tenant_id(), year_id) {
        Some(y) => y,
        None => return Err(errors::validation_error("fiscal_year_id", "unknown fiscal year")),
    };

    let period_id = FiscalPeriodId::new(parse_uuid(fiscal_period_id, "fiscal period id")?);
    if year.period_by_id(period_id).is_none() {
        return Err(errors::validation_error(
            "fiscal_period_id",
            "period does not belong to the fiscal year",
        ));
    }

    Ok((year_id, period_id))
}

async fn draft_voucher(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::DraftVoucherRequest>,
) -> axum::response::Response {
    let (fiscal_year_id, fiscal_period_id) =
        match resolve_fiscal_scope(&services, &tenant, &body.fiscal_year_id, &body.fiscal_period_id)
        {
            Ok(v) => v,
            Err(resp) => return resp,
        };
    let lines = match resolve_lines(&services, &tenant, body.lines) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let agg = AggregateId::new();
    let voucher_no = body
        .voucher_no
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| format!("V-{}", &agg.as_uuid().simple().to_string()[..8]));

    let cmd = VoucherCommand::DraftVoucher(DraftVoucher {
        tenant_id: tenant.tenant_id(),
        voucher_id: VoucherId::new(agg),
        voucher_no,
        fiscal_year_id,
        fiscal_period_id,
        narration: body.narration,
        lines,
        occurred_at: Utc::now(),
    });

    dispatch_voucher(services, tenant, principal, agg, cmd, StatusCode::CREATED, "voucher drafted").await
}

async fn list_vouchers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let year_filter = match query.fiscal_year_id.as_deref() {
        Some(raw) => match parse_aggregate_id(raw, "fiscal year id") {
            Ok(v) => Some(FiscalYearId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };
    let period_filter = match query.fiscal_period_id.as_deref() {
        Some(raw) => match parse_uuid(raw, "fiscal period id") {
            Ok(v) => Some(FiscalPeriodId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };

    let mut items = services.vouchers_list(tenant.tenant_id());
    if let Some(year_id) = year_filter {
        items.retain(|v| v.fiscal_year_id == year_id);
    }
    if let Some(period_id) = period_filter {
        items.retain(|v| v.fiscal_period_id == period_id);
    }
    if let Some(status) = query.status.as_deref() {
        let status = status.to_lowercase();
        items.retain(|v| v.status.as_str() == status);
    }
    if let Some(needle) = query.search.as_deref() {
        items.retain(|v| {
            matches_search(needle, &[Some(&v.voucher_no), v.narration.as_deref()])
        });
    }
    items.sort_by_key(|v| *v.voucher_id.0.as_uuid());

    let items = items.into_iter().map(dto::voucher_to_json).collect();
    (
        StatusCode::OK,
        Json(dto::paginate(
            items,
            &dto::PageQuery {
                page: query.page,
                per_page: query.per_page,
            },
            "/vouchers",
        )),
    )
        .into_response()
}

async fn get_voucher(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let agg = match parse_aggregate_id(&id, "voucher id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.vouchers_get(tenant.tenant_id(), VoucherId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::voucher_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "voucher not found"),
    }
}

async fn revise_voucher(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReviseVoucherRequest>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "voucher id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let lines = match resolve_lines(&services, &tenant, body.lines) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = VoucherCommand::ReviseVoucher(ReviseVoucher {
        tenant_id: tenant.tenant_id(),
        voucher_id: VoucherId::new(agg),
        narration: body.narration,
        lines,
        occurred_at: Utc::now(),
    });

    dispatch_voucher(services, tenant, principal, agg, cmd, StatusCode::OK, "voucher revised").await
}

async fn approve_voucher(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "voucher id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = VoucherCommand::ApproveVoucher(ApproveVoucher {
        tenant_id: tenant.tenant_id(),
        voucher_id: VoucherId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_voucher(services, tenant, principal, agg, cmd, StatusCode::OK, "voucher approved").await
}

async fn post_voucher(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PostVoucherRequest>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "voucher id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Posting requires an open period; the fiscal calendar is the gate.
    let rm = match services.vouchers_get(tenant.tenant_id(), VoucherId::new(agg)) {
        Some(rm) => rm,
        None => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "voucher not found"),
    };
    let period_open = services
        .fiscal_years_get(tenant.tenant_id(), rm.fiscal_year_id)
        .is_some_and(|y| y.period_is_open(rm.fiscal_period_id));
    if !period_open {
        return errors::json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            "fiscal period is not open for posting",
        );
    }

    let now = Utc::now();
    let cmd = VoucherCommand::PostVoucher(PostVoucher {
        tenant_id: tenant.tenant_id(),
        voucher_id: VoucherId::new(agg),
        posted_at: body.posted_at.unwrap_or(now),
        occurred_at: now,
    });

    dispatch_voucher(services, tenant, principal, agg, cmd, StatusCode::OK, "voucher posted").await
}

async fn cancel_voucher(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CancelVoucherRequest>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "voucher id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = VoucherCommand::CancelVoucher(CancelVoucher {
        tenant_id: tenant.tenant_id(),
        voucher_id: VoucherId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_voucher(services, tenant, principal, agg, cmd, StatusCode::OK, "voucher cancelled").await
}

async fn dispatch_voucher(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    agg: AggregateId,
    cmd: VoucherCommand,
    status: StatusCode,
    message: &'static str,
) -> axum::response::Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new(WRITE)],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services
        .dispatch::<Voucher>(
            tenant.tenant_id(),
            agg,
            "accounting.voucher",
            cmd_auth.inner,
            |_t, aggregate_id| Voucher::empty(VoucherId::new(aggregate_id)),
        )
        .await
    {
        Ok(_) => id_message(status, agg, message),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
