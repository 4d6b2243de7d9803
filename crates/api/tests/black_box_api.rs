use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ledgerdesk_auth::{JwtClaims, PrincipalId, Role};
use ledgerdesk_core::TenantId;
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = ledgerdesk_api::app::build_app(jwt_secret.to_string()).await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, tenant_id: TenantId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        tenant_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// The API is intentionally eventual-consistent (command path vs projection
/// update). Poll a GET briefly until the projection catches up.
async fn get_eventually(
    client: &reqwest::Client,
    url: &str,
    token: &str,
) -> serde_json::Value {
    for _ in 0..50 {
        let res = client.get(url).bearer_auth(token).send().await.unwrap();

        if res.status() == StatusCode::OK {
            return res.json().await.unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("resource at {url} did not become visible in projection within timeout");
}

/// Like `get_eventually`, but also waits until `pred` holds on the body.
/// Needed when the row already exists but a later event has not been folded
/// in yet.
async fn get_eventually_until(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..50 {
        let res = client.get(url).bearer_auth(token).send().await.unwrap();

        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if pred(&body) {
                return body;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("resource at {url} did not reach expected state within timeout");
}

async fn post_ok(
    client: &reqwest::Client,
    url: &str,
    token: &str,
    body: serde_json::Value,
    expected: StatusCode,
) -> serde_json::Value {
    let res = client
        .post(url)
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    assert_eq!(status, expected, "POST {url} body={text}");
    serde_json::from_str(&text).unwrap_or(serde_json::Value::Null)
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "admin"));
}

#[tokio::test]
async fn customer_lifecycle_register_update_archive() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let created = post_ok(
        &client,
        &format!("{}/customers", srv.base_url),
        &token,
        json!({ "full_name": "Ada Lovelace", "national_id": "A-1001" }),
        StatusCode::CREATED,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let customer =
        get_eventually(&client, &format!("{}/customers/{}", srv.base_url, id), &token).await;
    assert_eq!(customer["full_name"], "Ada Lovelace");
    assert_eq!(customer["status"], "active");

    // Patch the name, then archive.
    let res = client
        .patch(format!("{}/customers/{}", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "full_name": "Ada King" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(format!("{}/customers/{}", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "reason": "duplicate record" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "customer archived");

    let archived = get_eventually_until(
        &client,
        &format!("{}/customers/{}", srv.base_url, id),
        &token,
        |c| c["status"] == "archived",
    )
    .await;
    assert_eq!(archived["full_name"], "Ada King");

    // Default list hides archived rows; a status filter brings them back.
    let list: serde_json::Value =
        get_eventually(&client, &format!("{}/customers", srv.base_url), &token).await;
    assert!(
        !list["data"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["id"] == id.as_str())
    );

    let list: serde_json::Value = get_eventually(
        &client,
        &format!("{}/customers?status=archived", srv.base_url),
        &token,
    )
    .await;
    assert!(
        list["data"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c["id"] == id.as_str())
    );

    // Search narrows by name or national id.
    let list: serde_json::Value = get_eventually(
        &client,
        &format!("{}/customers?status=archived&search=king", srv.base_url),
        &token,
    )
    .await;
    assert_eq!(list["meta"]["total"], 1);
    let list: serde_json::Value = get_eventually(
        &client,
        &format!("{}/customers?status=archived&search=lovelace", srv.base_url),
        &token,
    )
    .await;
    assert_eq!(list["meta"]["total"], 0);
}

#[tokio::test]
async fn address_requires_existing_customer_and_verification_resets_on_update() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    // Unknown owner is rejected with a field error.
    let res = client
        .post(format!("{}/addresses", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "customer_id": uuid::Uuid::now_v7().to_string(),
            "line1": "1 Main St",
            "city": "Springfield",
            "country": "US",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["errors"]["customer_id"].is_array());

    let created = post_ok(
        &client,
        &format!("{}/customers", srv.base_url),
        &token,
        json!({ "full_name": "Grace Hopper" }),
        StatusCode::CREATED,
    )
    .await;
    let customer_id = created["id"].as_str().unwrap().to_string();
    get_eventually(
        &client,
        &format!("{}/customers/{}", srv.base_url, customer_id),
        &token,
    )
    .await;

    let created = post_ok(
        &client,
        &format!("{}/addresses", srv.base_url),
        &token,
        json!({
            "customer_id": customer_id,
            "line1": "1 Main St",
            "city": "Springfield",
            "country": "US",
        }),
        StatusCode::CREATED,
    )
    .await;
    let address_id = created["id"].as_str().unwrap().to_string();

    let address = get_eventually(
        &client,
        &format!("{}/addresses/{}", srv.base_url, address_id),
        &token,
    )
    .await;
    assert_eq!(address["verification"], "pending");

    post_ok(
        &client,
        &format!("{}/addresses/{}/verify", srv.base_url, address_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;
    get_eventually_until(
        &client,
        &format!("{}/addresses/{}", srv.base_url, address_id),
        &token,
        |a| a["verification"] == "verified",
    )
    .await;

    // Any field change invalidates the earlier verification.
    let res = client
        .patch(format!("{}/addresses/{}", srv.base_url, address_id))
        .bearer_auth(&token)
        .json(&json!({
            "line1": "2 Main St",
            "city": "Springfield",
            "country": "US",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    get_eventually_until(
        &client,
        &format!("{}/addresses/{}", srv.base_url, address_id),
        &token,
        |a| a["verification"] == "pending" && a["line1"] == "2 Main St",
    )
    .await;
}

#[tokio::test]
async fn duplicate_account_code_is_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    post_ok(
        &client,
        &format!("{}/accounts", srv.base_url),
        &token,
        json!({ "code": "1000", "name": "Cash", "kind": "asset", "is_cash": true }),
        StatusCode::CREATED,
    )
    .await;
    get_eventually(&client, &format!("{}/accounts/1000", srv.base_url), &token).await;

    let res = client
        .post(format!("{}/accounts", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "code": "1000", "name": "Petty Cash", "kind": "asset" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["errors"]["code"].is_array());

    // Whitespace padding must not slip past the uniqueness check; the chart
    // stores the trimmed code.
    let res = client
        .post(format!("{}/accounts", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "code": " 1000 ", "name": "Petty Cash", "kind": "asset" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["errors"]["code"].is_array());
}

#[tokio::test]
async fn fiscal_year_opens_with_monthly_periods_and_periods_toggle() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let created = post_ok(
        &client,
        &format!("{}/fiscal-years", srv.base_url),
        &token,
        json!({ "label": "FY2025", "start_date": "2025-01-01", "end_date": "2025-12-31" }),
        StatusCode::CREATED,
    )
    .await;
    let year_id = created["id"].as_str().unwrap().to_string();

    let year = get_eventually(
        &client,
        &format!("{}/fiscal-years/{}", srv.base_url, year_id),
        &token,
    )
    .await;
    assert_eq!(year["status"], "open");
    let periods = year["periods"].as_array().unwrap();
    assert_eq!(periods.len(), 12);
    assert_eq!(periods[0]["seq"], 1);
    assert_eq!(periods[0]["start_date"], "2025-01-01");
    assert_eq!(periods[11]["end_date"], "2025-12-31");

    post_ok(
        &client,
        &format!("{}/fiscal-years/{}/periods/1/close", srv.base_url, year_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;
    get_eventually_until(
        &client,
        &format!("{}/fiscal-years/{}", srv.base_url, year_id),
        &token,
        |y| y["periods"][0]["status"] == "closed",
    )
    .await;

    post_ok(
        &client,
        &format!("{}/fiscal-years/{}/periods/1/reopen", srv.base_url, year_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;
    get_eventually_until(
        &client,
        &format!("{}/fiscal-years/{}", srv.base_url, year_id),
        &token,
        |y| y["periods"][0]["status"] == "open",
    )
    .await;
}

#[tokio::test]
async fn closed_fiscal_period_blocks_posting() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let (year_id, period_id) = seed_books(&client, &srv.base_url, &token).await;

    let created = post_ok(
        &client,
        &format!("{}/vouchers", srv.base_url),
        &token,
        json!({
            "fiscal_year_id": year_id,
            "fiscal_period_id": period_id,
            "narration": "late entry",
            "lines": [
                { "account_code": "1000", "debit": 1_200 },
                { "account_code": "4000", "credit": 1_200 },
            ],
        }),
        StatusCode::CREATED,
    )
    .await;
    let voucher_id = created["id"].as_str().unwrap().to_string();
    get_eventually(
        &client,
        &format!("{}/vouchers/{}", srv.base_url, voucher_id),
        &token,
    )
    .await;

    post_ok(
        &client,
        &format!("{}/vouchers/{}/approve", srv.base_url, voucher_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;

    post_ok(
        &client,
        &format!("{}/fiscal-years/{}/periods/1/close", srv.base_url, year_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;
    get_eventually_until(
        &client,
        &format!("{}/fiscal-years/{}", srv.base_url, year_id),
        &token,
        |y| y["periods"][0]["status"] == "closed",
    )
    .await;

    let res = client
        .post(format!("{}/vouchers/{}/post", srv.base_url, voucher_id))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invariant_violation");

    // Reopening the period lifts the block.
    post_ok(
        &client,
        &format!("{}/fiscal-years/{}/periods/1/reopen", srv.base_url, year_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;
    get_eventually_until(
        &client,
        &format!("{}/fiscal-years/{}", srv.base_url, year_id),
        &token,
        |y| y["periods"][0]["status"] == "open",
    )
    .await;
    post_ok(
        &client,
        &format!("{}/vouchers/{}/post", srv.base_url, voucher_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;
}

/// Opens a cash asset account and a revenue account, opens FY2025, and
/// returns (year_id, first period id).
async fn seed_books(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
) -> (String, String) {
    post_ok(
        client,
        &format!("{base_url}/accounts"),
        token,
        json!({ "code": "1000", "name": "Cash", "kind": "asset", "is_cash": true }),
        StatusCode::CREATED,
    )
    .await;
    post_ok(
        client,
        &format!("{base_url}/accounts"),
        token,
        json!({ "code": "4000", "name": "Sales", "kind": "revenue" }),
        StatusCode::CREATED,
    )
    .await;
    get_eventually(client, &format!("{base_url}/accounts/1000"), token).await;
    get_eventually(client, &format!("{base_url}/accounts/4000"), token).await;

    let created = post_ok(
        client,
        &format!("{base_url}/fiscal-years"),
        token,
        json!({ "label": "FY2025", "start_date": "2025-01-01", "end_date": "2025-12-31" }),
        StatusCode::CREATED,
    )
    .await;
    let year_id = created["id"].as_str().unwrap().to_string();
    let year = get_eventually(client, &format!("{base_url}/fiscal-years/{year_id}"), token).await;
    let period_id = year["periods"][0]["period_id"].as_str().unwrap().to_string();

    (year_id, period_id)
}

#[tokio::test]
async fn voucher_lifecycle_and_trial_balance() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let (year_id, period_id) = seed_books(&client, &srv.base_url, &token).await;

    let created = post_ok(
        &client,
        &format!("{}/vouchers", srv.base_url),
        &token,
        json!({
            "fiscal_year_id": year_id,
            "fiscal_period_id": period_id,
            "narration": "cash sale",
            "lines": [
                { "account_code": "1000", "debit": 5_000 },
                { "account_code": "4000", "credit": 5_000 },
            ],
        }),
        StatusCode::CREATED,
    )
    .await;
    let voucher_id = created["id"].as_str().unwrap().to_string();

    let voucher = get_eventually(
        &client,
        &format!("{}/vouchers/{}", srv.base_url, voucher_id),
        &token,
    )
    .await;
    assert_eq!(voucher["status"], "draft");
    assert_eq!(voucher["total_debit"], "5000");
    // Account names are snapshotted from the chart.
    assert_eq!(voucher["lines"][0]["account_name"], "Cash");

    post_ok(
        &client,
        &format!("{}/vouchers/{}/approve", srv.base_url, voucher_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;
    post_ok(
        &client,
        &format!("{}/vouchers/{}/post", srv.base_url, voucher_id),
        &token,
        json!({}),
        StatusCode::OK,
    )
    .await;

    get_eventually_until(
        &client,
        &format!("{}/vouchers/{}", srv.base_url, voucher_id),
        &token,
        |v| v["status"] == "posted",
    )
    .await;

    let tb = get_eventually_until(
        &client,
        &format!(
            "{}/reports/trial-balance?fiscal_year_id={}",
            srv.base_url, year_id
        ),
        &token,
        |tb| tb["total_debit"] == "5000",
    )
    .await;
    assert_eq!(tb["total_debit"], tb["total_credit"]);
    let rows = tb["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["account_code"], "1000");
    assert_eq!(rows[0]["balance"], "5000");
    assert_eq!(rows[1]["account_code"], "4000");
    assert_eq!(rows[1]["balance"], "-5000");

    let pl: serde_json::Value = get_eventually(
        &client,
        &format!(
            "{}/reports/profit-loss?fiscal_year_id={}",
            srv.base_url, year_id
        ),
        &token,
    )
    .await;
    assert_eq!(pl["total_revenue"], "5000");
    assert_eq!(pl["net_income"], "5000");
}

#[tokio::test]
async fn unbalanced_voucher_is_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(jwt_secret, tenant_id, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let (year_id, period_id) = seed_books(&client, &srv.base_url, &token).await;

    let res = client
        .post(format!("{}/vouchers", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({
            "fiscal_year_id": year_id,
            "fiscal_period_id": period_id,
            "lines": [
                { "account_code": "1000", "debit": 5_000 },
                { "account_code": "4000", "credit": 4_000 },
            ],
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn role_permissions_gate_commands() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant_id = TenantId::new();
    let client = reqwest::Client::new();

    // Viewers cannot write anywhere.
    let viewer = mint_jwt(jwt_secret, tenant_id, vec![Role::new("viewer")]);
    let res = client
        .post(format!("{}/customers", srv.base_url))
        .bearer_auth(&viewer)
        .json(&json!({ "full_name": "Nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Registrars own the CRM side but not the books.
    let registrar = mint_jwt(jwt_secret, tenant_id, vec![Role::new("registrar")]);
    let res = client
        .post(format!("{}/accounts", srv.base_url))
        .bearer_auth(&registrar)
        .json(&json!({ "code": "1000", "name": "Cash", "kind": "asset" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/customers", srv.base_url))
        .bearer_auth(&registrar)
        .json(&json!({ "full_name": "Allowed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_tenant_reads_and_writes() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let tenant1 = TenantId::new();
    let tenant2 = TenantId::new();
    let token1 = mint_jwt(jwt_secret, tenant1, vec![Role::new("admin")]);
    let token2 = mint_jwt(jwt_secret, tenant2, vec![Role::new("admin")]);

    let client = reqwest::Client::new();

    let created = post_ok(
        &client,
        &format!("{}/customers", srv.base_url),
        &token1,
        json!({ "full_name": "Tenant One Customer" }),
        StatusCode::CREATED,
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    get_eventually(&client, &format!("{}/customers/{}", srv.base_url, id), &token1).await;

    // Tenant2 cannot read it (projection lookup is tenant-scoped).
    let res = client
        .get(format!("{}/customers/{}", srv.base_url, id))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Tenant2 cannot mutate it either (dispatch runs under tenant2's stream).
    let res = client
        .patch(format!("{}/customers/{}", srv.base_url, id))
        .bearer_auth(&token2)
        .json(&json!({ "full_name": "Hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
