use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use ledgerdesk_auth::{CommandAuthorization, Permission};
use ledgerdesk_core::AggregateId;

use crate::app::errors;

/// Small helper wrapper to associate required permissions with a command.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Parse a path/query id into an aggregate id, 400 on garbage.
pub fn parse_aggregate_id(
    raw: &str,
    label: &'static str,
) -> Result<AggregateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {label}"),
        )
    })
}

pub fn parse_uuid(raw: &str, label: &'static str) -> Result<Uuid, axum::response::Response> {
    Uuid::parse_str(raw).map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {label}"),
        )
    })
}

/// Case-insensitive substring match across the candidate fields.
pub fn matches_search(needle: &str, fields: &[Option<&str>]) -> bool {
    let needle = needle.to_lowercase();
    fields
        .iter()
        .flatten()
        .any(|f| f.to_lowercase().contains(&needle))
}

/// Standard mutation response: the row id plus a flash-style message.
pub fn id_message(
    status: StatusCode,
    agg: AggregateId,
    message: &'static str,
) -> axum::response::Response {
    (
        status,
        axum::Json(serde_json::json!({
            "id": agg.to_string(),
            "message": message,
        })),
    )
        .into_response()
}
