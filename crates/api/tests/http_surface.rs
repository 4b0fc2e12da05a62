//! Handler-level tests for the HTTP contract: envelopes, status codes,
//! role gates, and the guardrail hooks in the hold path.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use centime_api::config::ServerConfig;
use centime_api::{routes, state::AppState};
use centime_core::guardrail::PER_TURN_TOKEN_CAP;
use centime_db::models::alert::AlertQuery;
use centime_db::repositories::AlertRepo;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec![],
        request_timeout_secs: 30,
    }
}

fn app(pool: PgPool) -> Router {
    let state = AppState {
        pool,
        config: Arc::new(test_config()),
    };
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .with_state(state)
}

fn request(method: &str, uri: &str, role: Option<(&str, i64)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((role, user_id)) = role {
        builder = builder
            .header("x-user-id", user_id.to_string())
            .header("x-user-role", role);
    }
    match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn credit(app: &Router, user_id: i64, amount: i64, ref_id: &str) {
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/ledger/credit",
            Some(("service", 500)),
            Some(json!({
                "user_id": user_id,
                "amount_tokens": amount,
                "source": "recharge",
                "ref_id": ref_id,
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn health_reports_ok(pool: PgPool) {
    let app = app(pool);
    let response = app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_healthy"], true);
}

// ---------------------------------------------------------------------------
// Identity and role gates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_identity_is_unauthorized(pool: PgPool) {
    let app = app(pool);
    let response = app
        .oneshot(request(
            "POST",
            "/api/v1/ledger/credit",
            None,
            Some(json!({
                "user_id": 1,
                "amount_tokens": 100,
                "source": "recharge",
                "ref_id": "r-1",
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn end_users_cannot_mutate_the_ledger(pool: PgPool) {
    let app = app(pool);
    let response = app
        .oneshot(request(
            "POST",
            "/api/v1/ledger/credit",
            Some(("user", 1)),
            Some(json!({
                "user_id": 1,
                "amount_tokens": 100,
                "source": "recharge",
                "ref_id": "r-1",
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn users_read_only_their_own_balance(pool: PgPool) {
    let app = app(pool);
    credit(&app, 1, 1000, "r-1").await;

    let own = app
        .clone()
        .oneshot(request("GET", "/api/v1/wallets/1/balance", Some(("user", 1)), None))
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);
    let body = body_json(own).await;
    assert_eq!(body["data"]["token_balance"], 1000);
    assert_eq!(body["data"]["spendable"], 1000);

    let other = app
        .oneshot(request("GET", "/api/v1/wallets/1/balance", Some(("user", 2)), None))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Ledger flows over HTTP
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_webhook_is_absorbed_over_http(pool: PgPool) {
    let app = app(pool);

    let payload = json!({
        "user_id": 1,
        "amount_tokens": 15_000,
        "source": "plan_allocation",
        "ref_id": "alloc-2024-01",
    });
    let first = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/ledger/credit",
            Some(("service", 500)),
            Some(payload.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(first).await["data"]["credited"], 15_000);

    let second = app
        .oneshot(request(
            "POST",
            "/api/v1/ledger/credit",
            Some(("service", 500)),
            Some(payload),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_json(second).await;
    assert_eq!(body["data"]["idempotent"], true);
    assert_eq!(body["data"]["credited"], 0);
    assert_eq!(body["data"]["balance"], 15_000);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn refused_hold_returns_402_and_raises_an_alert(pool: PgPool) {
    let app = app(pool.clone());
    credit(&app, 1, 500, "r-1").await;

    let response = app
        .oneshot(request(
            "POST",
            "/api/v1/ledger/holds",
            Some(("service", 500)),
            Some(json!({
                "user_id": 1,
                "amount_tokens": 800,
                "ref_id": "turn-1",
                "provider": "openai",
                "model": "gpt-4o",
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body_json(response).await["code"], "INSUFFICIENT_BALANCE");

    // The caller-side guardrail recorded the refusal.
    let alerts = AlertRepo::query(
        &pool,
        &AlertQuery {
            alert_type: Some("insufficient_tokens".to_string()),
            user_id: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].meta["required"], 800);
    assert_eq!(alerts[0].meta["spendable"], 500);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn oversized_request_hits_the_turn_cap(pool: PgPool) {
    let app = app(pool.clone());
    credit(&app, 1, 1_000_000, "r-1").await;

    let response = app
        .oneshot(request(
            "POST",
            "/api/v1/ledger/holds",
            Some(("service", 500)),
            Some(json!({
                "user_id": 1,
                "amount_tokens": PER_TURN_TOKEN_CAP + 1,
                "ref_id": "turn-big",
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "CAP_EXCEEDED");

    let alerts = AlertRepo::query(
        &pool,
        &AlertQuery {
            alert_type: Some("cap_exceeded".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(alerts.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn hold_then_release_settles_actuals(pool: PgPool) {
    let app = app(pool);
    credit(&app, 1, 5000, "r-1").await;

    let hold = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/ledger/holds",
            Some(("service", 500)),
            Some(json!({
                "user_id": 1,
                "amount_tokens": 1000,
                "ref_id": "turn-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(hold.status(), StatusCode::OK);

    let release = app
        .oneshot(request(
            "POST",
            "/api/v1/ledger/holds/turn-1/release",
            Some(("service", 500)),
            Some(json!({
                "user_id": 1,
                "actual_amount_tokens": 650,
            })),
        ))
        .await
        .unwrap();
    assert_eq!(release.status(), StatusCode::OK);
    let body = body_json(release).await;
    assert_eq!(body["data"]["released"], 1000);
    assert_eq!(body["data"]["settled"], 650);
    assert_eq!(body["data"]["balance"], 4350);
    assert_eq!(body["data"]["hold_amount"], 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn adjustment_requires_a_reason(pool: PgPool) {
    let app = app(pool);

    let response = app
        .oneshot(request(
            "POST",
            "/api/v1/ledger/adjust",
            Some(("admin", 99)),
            Some(json!({
                "user_id": 1,
                "amount_tokens": 100,
                "reason": "  ",
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Pricing over HTTP
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn overlapping_pricing_window_is_a_conflict(pool: PgPool) {
    let app = app(pool);

    let create = |from: &str| {
        json!({
            "provider": "openai",
            "model": "gpt-4o",
            "currency": "USD",
            "input_per_1k_cents": 30,
            "output_per_1k_cents": 60,
            "effective_from": from,
        })
    };

    let first = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/admin/pricing",
            Some(("admin", 99)),
            Some(create("2024-01-01T00:00:00Z")),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(request(
            "POST",
            "/api/v1/admin/pricing",
            Some(("admin", 99)),
            Some(create("2024-06-01T00:00:00Z")),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["code"], "OVERLAPPING_PRICING_WINDOW");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn quote_prices_a_usage_pair(pool: PgPool) {
    let app = app(pool);

    app.clone()
        .oneshot(request(
            "POST",
            "/api/v1/admin/pricing",
            Some(("admin", 99)),
            Some(json!({
                "provider": "openai",
                "model": "gpt-4o",
                "currency": "USD",
                "input_per_1k_cents": 30,
                "output_per_1k_cents": 60,
                "effective_from": "2024-01-01T00:00:00Z",
            })),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(request(
            "GET",
            "/api/v1/pricing/quote?provider=openai&model=gpt-4o&currency=USD&tokens_in=2000&tokens_out=1000",
            Some(("user", 1)),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["cost_cents"], 120);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unpriced_usage_is_rejected(pool: PgPool) {
    let app = app(pool);

    let response = app
        .oneshot(request(
            "GET",
            "/api/v1/pricing/resolve?provider=openai&model=gpt-4o&currency=USD",
            Some(("user", 1)),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "NO_PRICE_FOR_WINDOW");
}
