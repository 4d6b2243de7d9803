use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use ledgerdesk_auth::Permission;
use ledgerdesk_core::AggregateId;
use ledgerdesk_crm::customer::{
    AddFamilyRelation, ArchiveCustomer, AttachSignature, Customer, CustomerCommand, CustomerId,
    CustomerStatus, MediaRef, RegisterCustomer, RemoveFamilyRelation, RevokeSignature,
    UpdateCustomer,
};

use crate::app::routes::common::{
    CmdAuth, id_message, matches_search, parse_aggregate_id, parse_uuid,
};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

const READ: &str = "crm.customers.read";
const WRITE: &str = "crm.customers.write";

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_customer).get(list_customers))
        .route(
            "/:id",
            get(get_customer).patch(update_customer).delete(archive_customer),
        )
        .route("/:id/relations", post(add_relation))
        .route("/:id/relations/:relation_id", delete(remove_relation))
        .route("/:id/signatures", post(attach_signature))
        .route("/:id/signatures/:signature_id", delete(revoke_signature))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    search: Option<String>,
    status: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn register_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterCustomerRequest>,
) -> axum::response::Response {
    let agg = AggregateId::new();
    let customer_id = CustomerId::new(agg);

    let cmd = CustomerCommand::RegisterCustomer(RegisterCustomer {
        tenant_id: tenant.tenant_id(),
        customer_id,
        full_name: body.full_name,
        national_id: body.national_id,
        contact: body.contact,
        occurred_at: Utc::now(),
    });

    dispatch_customer_with(services, tenant, principal, agg, cmd, || {
        id_message(StatusCode::CREATED, agg, "customer registered")
    })
    .await
}

async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let mut items = services.customers_list(tenant.tenant_id());
    match query.status.as_deref() {
        Some(status) => {
            let status = status.to_lowercase();
            items.retain(|c| c.status.as_str() == status);
        }
        // Archived customers only show up when asked for by status.
        None => items.retain(|c| c.status != CustomerStatus::Archived),
    }
    if let Some(needle) = query.search.as_deref() {
        items.retain(|c| {
            matches_search(needle, &[Some(&c.full_name), c.national_id.as_deref()])
        });
    }
    // v7 ids sort by creation time.
    items.sort_by_key(|c| *c.customer_id.0.as_uuid());

    let items = items.into_iter().map(dto::customer_to_json).collect();
    (
        StatusCode::OK,
        Json(dto::paginate(
            items,
            &dto::PageQuery {
                page: query.page,
                per_page: query.per_page,
            },
            "/customers",
        )),
    )
        .into_response()
}

async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&tenant, &principal, &Permission::new(READ)) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }
    let agg = match parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.customers_get(tenant.tenant_id(), CustomerId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::customer_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "customer not found"),
    }
}

async fn update_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateCustomerRequest>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::UpdateCustomer(UpdateCustomer {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        full_name: body.full_name,
        national_id: body.national_id,
        contact: body.contact,
        occurred_at: Utc::now(),
    });

    dispatch_customer(services, tenant, principal, agg, cmd, "customer updated").await
}

async fn archive_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ArchiveCustomerRequest>>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::ArchiveCustomer(ArchiveCustomer {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        reason: body.and_then(|Json(b)| b.reason),
        occurred_at: Utc::now(),
    });

    dispatch_customer(services, tenant, principal, agg, cmd, "customer archived").await
}

async fn add_relation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddRelationRequest>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let related_customer_id = match body.related_customer_id.as_deref() {
        Some(raw) => match parse_aggregate_id(raw, "related customer id") {
            Ok(v) => Some(CustomerId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };

    let relation_id = Uuid::now_v7();
    let cmd = CustomerCommand::AddFamilyRelation(AddFamilyRelation {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        relation_id,
        kind: body.kind,
        full_name: body.full_name,
        related_customer_id,
        note: body.note,
        occurred_at: Utc::now(),
    });

    dispatch_customer_with(services, tenant, principal, agg, cmd, move || {
        (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": agg.to_string(),
                "relation_id": relation_id.to_string(),
                "message": "relation added",
            })),
        )
            .into_response()
    })
    .await
}

async fn remove_relation(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, relation_id)): Path<(String, String)>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let relation_id = match parse_uuid(&relation_id, "relation id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::RemoveFamilyRelation(RemoveFamilyRelation {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        relation_id,
        occurred_at: Utc::now(),
    });

    dispatch_customer(services, tenant, principal, agg, cmd, "relation removed").await
}

async fn attach_signature(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AttachSignatureRequest>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let signature_id = Uuid::now_v7();
    let cmd = CustomerCommand::AttachSignature(AttachSignature {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        signature_id,
        title: body.title,
        media: MediaRef {
            media_id: Uuid::now_v7(),
            file_name: body.media.file_name,
            content_type: body.media.content_type,
            byte_size: body.media.byte_size,
        },
        occurred_at: Utc::now(),
    });

    dispatch_customer_with(services, tenant, principal, agg, cmd, move || {
        (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": agg.to_string(),
                "signature_id": signature_id.to_string(),
                "message": "signature attached",
            })),
        )
            .into_response()
    })
    .await
}

async fn revoke_signature(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, signature_id)): Path<(String, String)>,
) -> axum::response::Response {
    let agg = match parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let signature_id = match parse_uuid(&signature_id, "signature id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = CustomerCommand::RevokeSignature(RevokeSignature {
        tenant_id: tenant.tenant_id(),
        customer_id: CustomerId::new(agg),
        signature_id,
        occurred_at: Utc::now(),
    });

    dispatch_customer(services, tenant, principal, agg, cmd, "signature revoked").await
}

async fn dispatch_customer(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    agg: AggregateId,
    cmd: CustomerCommand,
    message: &'static str,
) -> axum::response::Response {
    dispatch_customer_with(services, tenant, principal, agg, cmd, move || {
        id_message(StatusCode::OK, agg, message)
    })
    .await
}

async fn dispatch_customer_with(
    services: Arc<AppServices>,
    tenant: TenantContext,
    principal: PrincipalContext,
    agg: AggregateId,
    cmd: CustomerCommand,
    respond: impl FnOnce() -> axum::response::Response,
) -> axum::response::Response {
    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new(WRITE)],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match services
        .dispatch::<Customer>(
            tenant.tenant_id(),
            agg,
            "crm.customer",
            cmd_auth.inner,
            |_t, aggregate_id| Customer::empty(CustomerId::new(aggregate_id)),
        )
        .await
    {
        Ok(_) => respond(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
