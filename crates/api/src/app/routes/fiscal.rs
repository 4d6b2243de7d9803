use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use uuid::Uuid;

use ledgerdesk_accounting::fiscal::{
    CloseFiscalYear, ClosePeriod, FiscalCommand, FiscalPeriodId, FiscalYear, FiscalYearId,
    OpenFiscalYear, ReopenPeriod, month_spans,
};
use ledgerdesk_auth::Permission;
use ledgerdesk_core::AggregateId;

use crate::app::routes::common::{CmdAuth, id_message, parse_aggregate_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const READ: &str = "accounting.fiscal.read";
const WRITE: &str = "accounting.fiscal.write";

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_year).get(list_years))
        .route("/:id", get(get_year))
        .route("/:id/close", post(close_year))
        .route("/:id/periods/:seq/close", post(close_period))
        .route("/:id/periods/:seq/reopen", post(reopen_period))
}

async fn open_year(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenFiscalYearRequest>,
) -> axum::response::Response {
    if body.end_date < body.start_date {
        return errors::validation_error("end_date", "must not precede start_date");
    }

    // One pre-minted id per calendar-month period; minted here so the
    // aggregate's decision stays deterministic.
    let period_ids = month_spans(body.start_date, body.end_date)
        .iter()
        .map(|_| FiscalPeriodId::new(Uuid::now_v7()))
        .collect();

    let agg = AggregateId::new();
    let cmd = FiscalCommand::OpenFiscalYear(OpenFiscalYear {
        tenant_id: tenant.tenant_id(),
        fiscal_year_id: FiscalYearId::new(agg),
        label: body.label,
        start_date: body.start_date,
        end_date: body.end_date,
        period_ids,
        occurred_at: Utc::now(),
    });

    dispatch_fiscal(services, tenant, principal, agg, cmd, StatusCode::CREATED, "fiscal year opened").await
}

async fn list_years(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(page): Query<dto::PageQuery>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let mut items = services.fiscal_years_list(tenant.tenant_id());
    items.sort_by_key(|y| (y.start_date, *y.fiscal_year_id.0.as_uuid()));

    let items = items.into_iter().map(dto::fiscal_year_to_json).collect();
    (
        StatusCode::OK,
        Json(dto::paginate(items, &page, "/fiscal-years")),
    )
        .into_response()
}

async fn get_year(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let agg = match parse_aggregate_id(&id, "fiscal year id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.fiscal_years_get(tenant.tenant_id(), FiscalYearId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::fiscal_year_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "fiscal year not found"),
    }
}

async fn close_year(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "fiscal year id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = FiscalCommand::CloseFiscalYear(CloseFiscalYear {
        tenant_id: tenant.tenant_id(),
        fiscal_year_id: FiscalYearId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_fiscal(services, tenant, principal, agg, cmd, StatusCode::OK, "fiscal year closed").await
}

async fn close_period(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, seq)): Path<(String, u32)>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "fiscal year id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = FiscalCommand::ClosePeriod(ClosePeriod {
        tenant_id: tenant.tenant_id(),
        fiscal_year_id: FiscalYearId::new(agg),
        seq,
        occurred_at: Utc::now(),
    });

    dispatch_fiscal(services, tenant, principal, agg, cmd, StatusCode::OK, "period closed").await
}

async fn reopen_period(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, seq)): Path<(String, u32)>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "fiscal year id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = FiscalCommand::ReopenPeriod(ReopenPeriod {
        tenant_id: tenant.tenant_id(),
        fiscal_year_id: FiscalYearId::new(agg),
        seq,
        occurred_at: Utc::now(),
    });

    dispatch_fiscal(services, tenant, principal, agg, cmd, StatusCode::OK, "period reopened").await
}

async fn dispatch_fiscal(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    agg: AggregateId,
    cmd: FiscalCommand,
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
        .dispatch::<FiscalYear>(
            tenant.tenant_id(),
            agg,
            "accounting.fiscal_year",
            cmd_auth.inner,
            |_t, aggregate_id| FiscalYear::empty(FiscalYearId::new(aggregate_id)),
        )
        .await
    {
        Ok(_) => id_message(status, agg, message),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
