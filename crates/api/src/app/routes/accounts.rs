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

use ledgerdesk_accounting::account::{
    AccountCommand, AccountId, ArchiveAccount, ChartAccount, OpenAccount, UpdateAccount,
};
use ledgerdesk_auth::Permission;
use ledgerdesk_core::AggregateId;

use crate::app::routes::common::{CmdAuth, id_message, matches_search};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const READ: &str = "accounting.accounts.read";
const WRITE: &str = "accounting.accounts.write";

/// Accounts are addressed by their ledger code, not their aggregate id; the
/// chart read model resolves one to the other.
pub fn router() -> Router {
    Router::new()
        .route("/", post(open_account).get(list_accounts))
        .route("/:code", get(get_account).patch(update_account))
        .route("/:code/archive", post(archive_account))
}

async fn open_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenAccountRequest>,
) -> axum::response::Response {
    let kind = match errors::parse_account_kind(&body.kind) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    // The aggregate trims the code before storing it, so the uniqueness
    // lookup has to compare the trimmed form too. Code uniqueness lives in
    // the read model; the aggregate only knows its own stream.
    let code = body.code.trim().to_string();
    if services.accounts_get(tenant.tenant_id(), &code).is_some() {
        return errors::validation_error("code", "account code already in use");
    }

    let agg = AggregateId::new();
    let cmd = AccountCommand::OpenAccount(OpenAccount {
        tenant_id: tenant.tenant_id(),
        account_id: AccountId::new(agg),
        code,
        name: body.name,
        kind,
        is_cash: body.is_cash,
        occurred_at: Utc::now(),
    });

    dispatch_account(services, tenant, principal, agg, cmd, StatusCode::CREATED, "account opened").await
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    search: Option<String>,
    kind: Option<String>,
    status: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let kind_filter = match query.kind.as_deref() {
        Some(raw) => match errors::parse_account_kind(raw) {
            Ok(k) => Some(k),
            Err(resp) => return resp,
        },
        None => None,
    };

    let mut items = services.accounts_list(tenant.tenant_id());
    if let Some(kind) = kind_filter {
        items.retain(|a| a.kind == kind);
    }
    if let Some(status) = query.status.as_deref() {
        let status = status.to_lowercase();
        items.retain(|a| a.status.as_str() == status);
    }
    if let Some(needle) = query.search.as_deref() {
        items.retain(|a| matches_search(needle, &[Some(&a.code), Some(&a.name)]));
    }
    items.sort_by(|a, b| a.code.cmp(&b.code));

    let items = items.into_iter().map(dto::account_to_json).collect();
    (
        StatusCode::OK,
        Json(dto::paginate(
            items,
            &dto::PageQuery {
                page: query.page,
                per_page: query.per_page,
            },
            "/accounts",
        )),
    )
        .into_response()
}

async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(code): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services.accounts_get(tenant.tenant_id(), &code) {
        Some(rm) => (StatusCode::OK, Json(dto::account_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
    }
}

async fn update_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(code): Path<String>,
    Json(body): Json<dto::UpdateAccountRequest>,
) -> axum::response::Response {
    let rm = match services.accounts_get(tenant.tenant_id(), &code) {
        Some(rm) => rm,
        None => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
    };

    let cmd = AccountCommand::UpdateAccount(UpdateAccount {
        tenant_id: tenant.tenant_id(),
        account_id: rm.account_id,
        name: body.name,
        is_cash: body.is_cash,
        occurred_at: Utc::now(),
    });

    dispatch_account(services, tenant, principal, rm.account_id.0, cmd, StatusCode::OK, "account updated").await
}

async fn archive_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(code): Path<String>,
) -> axum::response::Response {
    let rm = match services.accounts_get(tenant.tenant_id(), &code) {
        Some(rm) => rm,
        None => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
    };

    let cmd = AccountCommand::ArchiveAccount(ArchiveAccount {
        tenant_id: tenant.tenant_id(),
        account_id: rm.account_id,
        occurred_at: Utc::now(),
    });

    dispatch_account(services, tenant, principal, rm.account_id.0, cmd, StatusCode::OK, "account archived").await
}

async fn dispatch_account(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    agg: AggregateId,
    cmd: AccountCommand,
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
        .dispatch::<ChartAccount>(
            tenant.tenant_id(),
            agg,
            "accounting.account",
            cmd_auth.inner,
            |_t, aggregate_id| ChartAccount::empty(AccountId::new(aggregate_id)),
        )
        .await
    {
        Ok(_) => id_message(status, agg, message),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
