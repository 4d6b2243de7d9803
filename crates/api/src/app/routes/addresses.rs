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

use ledgerdesk_auth::Permission;
use ledgerdesk_core::AggregateId;
use ledgerdesk_crm::address::{
    AddAddress, Address, AddressCommand, AddressId, PostalAddress, RejectAddress, RemoveAddress,
    UpdateAddress, VerifyAddress,
};
use ledgerdesk_crm::customer::{CustomerId, CustomerStatus};

use crate::app::routes::common::{CmdAuth, id_message, matches_search, parse_aggregate_id};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const READ: &str = "crm.addresses.read";
const WRITE: &str = "crm.addresses.write";

pub fn router() -> Router {
    Router::new()
        .route("/", post(add_address).get(list_addresses))
        .route(
            "/:id",
            get(get_address).patch(update_address).delete(remove_address),
        )
        .route("/:id/verify", post(verify_address))
        .route("/:id/reject", post(reject_address))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    customer_id: Option<String>,
    status: Option<String>,
    search: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

fn postal_fields(req: dto::PostalFieldsRequest) -> PostalAddress {
    PostalAddress {
        line1: req.line1,
        line2: req.line2,
        city: req.city,
        region: req.region,
        postal_code: req.postal_code,
        country: req.country,
    }
}

async fn add_address(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::AddAddressRequest>,
) -> axum::response::Response {
    let customer_agg = match parse_aggregate_id(&body.customer_id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let customer_id = CustomerId::new(customer_agg);

    // An address needs a live owner.
    match services.customers_get(tenant.tenant_id(), customer_id) {
        Some(rm) if rm.status != CustomerStatus::Archived => {}
        _ => {
            return errors::validation_error("customer_id", "customer not found or archived");
        }
    }

    let agg = AggregateId::new();
    let cmd = AddressCommand::AddAddress(AddAddress {
        tenant_id: tenant.tenant_id(),
        address_id: AddressId::new(agg),
        customer_id,
        fields: postal_fields(body.fields),
        occurred_at: Utc::now(),
    });

    dispatch_address(services, tenant, principal, agg, cmd, StatusCode::CREATED, "address added").await
}

async fn list_addresses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let customer_filter = match query.customer_id.as_deref() {
        Some(raw) => match parse_aggregate_id(raw, "customer id") {
            Ok(v) => Some(CustomerId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };

    let mut items = services.addresses_list(tenant.tenant_id());
    if let Some(customer_id) = customer_filter {
        items.retain(|a| a.customer_id == customer_id);
    }
    if let Some(status) = query.status.as_deref() {
        let status = status.to_lowercase();
        items.retain(|a| a.verification.as_str() == status);
    }
    if let Some(needle) = query.search.as_deref() {
        items.retain(|a| {
            matches_search(
                needle,
                &[
                    Some(&a.fields.line1),
                    a.fields.line2.as_deref(),
                    Some(&a.fields.city),
                    a.fields.region.as_deref(),
                    a.fields.postal_code.as_deref(),
                    Some(&a.fields.country),
                ],
            )
        });
    }
    items.sort_by_key(|a| *a.address_id.0.as_uuid());

    let items = items.into_iter().map(dto::address_to_json).collect();
    (
        StatusCode::OK,
        Json(dto::paginate(
            items,
            &dto::PageQuery {
                page: query.page,
                per_page: query.per_page,
            },
            "/addresses",
        )),
    )
        .into_response()
}

async fn get_address(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let agg = match parse_aggregate_id(&id, "address id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.addresses_get(tenant.tenant_id(), AddressId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::address_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "address not found"),
    }
}

async fn update_address(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PostalFieldsRequest>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "address id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AddressCommand::UpdateAddress(UpdateAddress {
        tenant_id: tenant.tenant_id(),
        address_id: AddressId::new(agg),
        fields: postal_fields(body),
        occurred_at: Utc::now(),
    });

    dispatch_address(services, tenant, principal, agg, cmd, StatusCode::OK, "address updated").await
}

async fn verify_address(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "address id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AddressCommand::VerifyAddress(VerifyAddress {
        tenant_id: tenant.tenant_id(),
        address_id: AddressId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_address(services, tenant, principal, agg, cmd, StatusCode::OK, "address verified").await
}

async fn reject_address(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RejectAddressRequest>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "address id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AddressCommand::RejectAddress(RejectAddress {
        tenant_id: tenant.tenant_id(),
        address_id: AddressId::new(agg),
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    dispatch_address(services, tenant, principal, agg, cmd, StatusCode::OK, "address rejected").await
}

async fn remove_address(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "address id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AddressCommand::RemoveAddress(RemoveAddress {
        tenant_id: tenant.tenant_id(),
        address_id: AddressId::new(agg),
        occurred_at: Utc::now(),
    });

    dispatch_address(services, tenant, principal, agg, cmd, StatusCode::OK, "address removed").await
}

async fn dispatch_address(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    agg: AggregateId,
    cmd: AddressCommand,
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
        .dispatch::<Address>(
            tenant.tenant_id(),
            agg,
            "crm.address",
            cmd_auth.inner,
            |_t, aggregate_id| Address::empty(AddressId::new(aggregate_id)),
        )
        .await
    {
        Ok(_) => id_message(status, agg, message),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
