use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use ledgerdesk_accounting::AccountKind;
use ledgerdesk_accounting::fiscal::FiscalPeriod;
use ledgerdesk_accounting::voucher::VoucherLine;
use ledgerdesk_crm::customer::{ContactInfo, FamilyRelation, RelationKind, Signature};
use ledgerdesk_infra::projections::{
    AccountReadModel, AddressReadModel, CustomerReadModel, FiscalYearReadModel, VoucherReadModel,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterCustomerRequest {
    pub full_name: String,
    pub national_id: Option<String>,
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub full_name: Option<String>,
    pub national_id: Option<String>,
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveCustomerRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddRelationRequest {
    pub kind: RelationKind,
    pub full_name: String,
    pub related_customer_id: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaRefRequest {
    pub file_name: String,
    pub content_type: String,
    pub byte_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct AttachSignatureRequest {
    pub title: String,
    pub media: MediaRefRequest,
}

#[derive(Debug, Deserialize)]
pub struct AddAddressRequest {
    pub customer_id: String,
    #[serde(flatten)]
    pub fields: PostalFieldsRequest,
}

#[derive(Debug, Deserialize)]
pub struct PostalFieldsRequest {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectAddressRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub code: String,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub is_cash: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub is_cash: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct OpenFiscalYearRequest {
    pub label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct VoucherLineRequest {
    pub account_code: String,
    #[serde(default)]
    pub debit: i64,
    #[serde(default)]
    pub credit: i64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DraftVoucherRequest {
    pub voucher_no: Option<String>,
    pub fiscal_year_id: String,
    pub fiscal_period_id: String,
    pub narration: Option<String>,
    pub lines: Vec<VoucherLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ReviseVoucherRequest {
    pub narration: Option<String>,
    pub lines: Vec<VoucherLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct PostVoucherRequest {
    /// Ledger date of the posting; defaults to now.
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CancelVoucherRequest {
    pub reason: Option<String>,
}

// -------------------------
// Pagination
// -------------------------

const DEFAULT_PER_PAGE: usize = 25;
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

/// Wrap an already-ordered row set in the standard `data`/`meta`/`links`
/// envelope. `page` is 1-based; out-of-range pages return empty data.
pub fn paginate(items: Vec<serde_json::Value>, query: &PageQuery, base_path: &str) -> serde_json::Value {
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let page = query.page.unwrap_or(1).max(1);

    let total = items.len();
    let total_pages = total.div_ceil(per_page).max(1);

    let data: Vec<serde_json::Value> = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();

    let link = |p: usize| format!("{base_path}?page={p}&per_page={per_page}");
    let prev = (page > 1).then(|| link(page - 1));
    let next = (page < total_pages).then(|| link(page + 1));

    serde_json::json!({
        "data": data,
        "meta": {
            "page": page,
            "per_page": per_page,
            "total": total,
            "total_pages": total_pages,
        },
        "links": {
            "prev": prev,
            "next": next,
        },
    })
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn customer_to_json(rm: CustomerReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.customer_id.0.to_string(),
        "full_name": rm.full_name,
        "national_id": rm.national_id,
        "contact": {
            "email": rm.contact.email,
            "phone": rm.contact.phone,
        },
        "status": rm.status.as_str(),
        "relations": rm.relations.into_iter().map(relation_to_json).collect::<Vec<_>>(),
        "signatures": rm.signatures.into_iter().map(signature_to_json).collect::<Vec<_>>(),
    })
}

fn relation_to_json(r: FamilyRelation) -> serde_json::Value {
    serde_json::json!({
        "relation_id": r.relation_id.to_string(),
        "kind": format!("{:?}", r.kind).to_lowercase(),
        "full_name": r.full_name,
        "related_customer_id": r.related_customer_id.map(|id| id.0.to_string()),
        "note": r.note,
    })
}

fn signature_to_json(s: Signature) -> serde_json::Value {
    serde_json::json!({
        "signature_id": s.signature_id.to_string(),
        "title": s.title,
        "media": {
            "media_id": s.media.media_id.to_string(),
            "file_name": s.media.file_name,
            "content_type": s.media.content_type,
            "byte_size": s.media.byte_size,
        },
        "revoked": s.revoked,
    })
}

pub fn address_to_json(rm: AddressReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.address_id.0.to_string(),
        "customer_id": rm.customer_id.0.to_string(),
        "line1": rm.fields.line1,
        "line2": rm.fields.line2,
        "city": rm.fields.city,
        "region": rm.fields.region,
        "postal_code": rm.fields.postal_code,
        "country": rm.fields.country,
        "verification": rm.verification.as_str(),
        "rejection_reason": rm.rejection_reason,
    })
}

pub fn account_kind_str(kind: AccountKind) -> String {
    format!("{kind:?}").to_lowercase()
}

pub fn account_to_json(rm: AccountReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.account_id.0.to_string(),
        "code": rm.code,
        "name": rm.name,
        "kind": account_kind_str(rm.kind),
        "is_cash": rm.is_cash,
        "status": rm.status.as_str(),
    })
}

pub fn fiscal_year_to_json(rm: FiscalYearReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.fiscal_year_id.0.to_string(),
        "label": rm.label,
        "start_date": rm.start_date.to_string(),
        "end_date": rm.end_date.to_string(),
        "status": rm.status.as_str(),
        "periods": rm.periods.into_iter().map(period_to_json).collect::<Vec<_>>(),
    })
}

fn period_to_json(p: FiscalPeriod) -> serde_json::Value {
    serde_json::json!({
        "period_id": p.period_id.0.to_string(),
        "seq": p.seq,
        "start_date": p.start_date.to_string(),
        "end_date": p.end_date.to_string(),
        "status": p.status.as_str(),
    })
}

pub fn voucher_to_json(rm: VoucherReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.voucher_id.0.to_string(),
        "voucher_no": rm.voucher_no,
        "fiscal_year_id": rm.fiscal_year_id.0.to_string(),
        "fiscal_period_id": rm.fiscal_period_id.0.to_string(),
        "narration": rm.narration,
        "status": rm.status.as_str(),
        "total_debit": rm.total_debit.to_string(),
        "total_credit": rm.total_credit.to_string(),
        "posted_at": rm.posted_at.map(|t| t.to_rfc3339()),
        "lines": rm.lines.into_iter().map(voucher_line_to_json).collect::<Vec<_>>(),
    })
}

fn voucher_line_to_json(l: VoucherLine) -> serde_json::Value {
    serde_json::json!({
        "account_code": l.account_code,
        "account_name": l.account_name,
        "debit": l.debit,
        "credit": l.credit,
        "description": l.description,
    })
}
