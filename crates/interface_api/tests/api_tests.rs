//! HTTP tests over the in-memory backend
//!
//! Every request goes through the full router, so status mapping, body
//! validation and JSON shapes are exercised together.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use core_kernel::FixedClock;
use interface_api::{config::AppConfig, create_router, AppState};

fn app() -> Router {
    let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
    create_router(AppState::in_memory(&AppConfig::default(), clock))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("Content-Type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn amount(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal encoded as string")).unwrap()
}

async fn open_account(app: &Router, member_id: Uuid, opening_balance: &str) -> Value {
    let (status, account) = send(
        app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({
            "member_id": member_id,
            "account_type": "regular",
            "opening_balance": opening_balance,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    account
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["adapters"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_open_deposit_and_approved_withdrawal() {
    let app = app();
    let account = open_account(&app, Uuid::new_v4(), "1000").await;
    assert_eq!(amount(&account["balance"]), dec!(1000));
    let account_id = id_of(&account);

    let (status, deposit) = send(
        &app,
        Method::POST,
        &format!("/api/v1/accounts/{account_id}/transactions"),
        Some(json!({"transaction_type": "deposit", "amount": "200", "reference_number": "DEP-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(amount(&deposit["balance_after"]), dec!(1200));
    assert_eq!(deposit["status"], "completed");

    let (status, withdrawal) = send(
        &app,
        Method::POST,
        &format!("/api/v1/accounts/{account_id}/transactions"),
        Some(json!({"transaction_type": "withdrawal", "amount": "52", "fees": "2"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(withdrawal["status"], "pending");
    let withdrawal_id = id_of(&withdrawal);

    let (status, completed) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/transactions/{withdrawal_id}/status"),
        Some(json!({"status": "completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&completed["balance_after"]), dec!(1146));

    let (status, account) = send(&app, Method::GET, &format!("/api/v1/accounts/{account_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&account["balance"]), dec!(1146));

    let (_, history) = send(
        &app,
        Method::GET,
        &format!("/api/v1/accounts/{account_id}/transactions"),
        None,
    )
    .await;
    assert_eq!(history.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_replayed_reference_returns_original_posting() {
    let app = app();
    let account_id = id_of(&open_account(&app, Uuid::new_v4(), "0").await);
    let uri = format!("/api/v1/accounts/{account_id}/transactions");
    let body = json!({"transaction_type": "deposit", "amount": "75", "reference_number": "DEP-7"});

    let (_, first) = send(&app, Method::POST, &uri, Some(body.clone())).await;
    let (_, second) = send(&app, Method::POST, &uri, Some(body)).await;
    assert_eq!(first["id"], second["id"]);

    let (status, error) = send(
        &app,
        Method::POST,
        &uri,
        Some(json!({"transaction_type": "deposit", "amount": "80", "reference_number": "DEP-7"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "DUPLICATE_REFERENCE");
}

#[tokio::test]
async fn test_overdraw_is_a_conflict_with_its_code() {
    let app = app();
    let account_id = id_of(&open_account(&app, Uuid::new_v4(), "100").await);

    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/v1/accounts/{account_id}/transactions"),
        Some(json!({"transaction_type": "withdrawal", "amount": "100.01"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "INSUFFICIENT_FUNDS");
    assert_eq!(error["retryable"], false);
}

#[tokio::test]
async fn test_invalid_body_lists_fields() {
    let app = app();
    let account_id = id_of(&open_account(&app, Uuid::new_v4(), "0").await);

    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/v1/accounts/{account_id}/transactions"),
        Some(json!({"transaction_type": "deposit", "amount": "0"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"], "VALIDATION_ERROR");
    let details = error["details"].as_array().unwrap();
    assert!(details[0].as_str().unwrap().starts_with("amount"));
}

#[tokio::test]
async fn test_unknown_account_is_not_found() {
    let app = app();
    let (status, error) = send(
        &app,
        Method::GET,
        &format!("/api/v1/accounts/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_transfer_moves_money_both_ways() {
    let app = app();
    let from = id_of(&open_account(&app, Uuid::new_v4(), "500").await);
    let to = id_of(&open_account(&app, Uuid::new_v4(), "0").await);

    let (status, receipt) = send(
        &app,
        Method::POST,
        "/api/v1/transfers",
        Some(json!({"from_account": from, "to_account": to, "amount": "120", "reference_number": "TRF-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["outgoing"]["transaction_type"], "transfer_out");
    assert_eq!(receipt["incoming"]["transaction_type"], "transfer_in");

    let (_, source) = send(&app, Method::GET, &format!("/api/v1/accounts/{from}"), None).await;
    let (_, target) = send(&app, Method::GET, &format!("/api/v1/accounts/{to}"), None).await;
    assert_eq!(amount(&source["balance"]), dec!(380));
    assert_eq!(amount(&target["balance"]), dec!(120));
}

#[tokio::test]
async fn test_reverse_once_only() {
    let app = app();
    let account_id = id_of(&open_account(&app, Uuid::new_v4(), "0").await);
    let (_, deposit) = send(
        &app,
        Method::POST,
        &format!("/api/v1/accounts/{account_id}/transactions"),
        Some(json!({"transaction_type": "deposit", "amount": "40"})),
    )
    .await;
    let deposit_id = id_of(&deposit);

    let (status, reversal) = send(
        &app,
        Method::POST,
        &format!("/api/v1/transactions/{deposit_id}/reverse"),
        Some(json!({"reason": "keyed twice"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reversal["reversal_of"], deposit["id"]);

    let (status, error) = send(
        &app,
        Method::POST,
        &format!("/api/v1/transactions/{deposit_id}/reverse"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "NOT_REVERSIBLE");

    let (_, original) = send(&app, Method::GET, &format!("/api/v1/transactions/{deposit_id}"), None).await;
    assert_eq!(original["status"], "reversed");
}

#[tokio::test]
async fn test_interest_posts_once_per_period() {
    let app = app();
    let (status, account) = send(
        &app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({
            "member_id": Uuid::new_v4(),
            "account_type": "regular",
            "opening_balance": "1000",
            "interest_rate_percent": "12",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/v1/accounts/{}/interest", id_of(&account));

    let (status, first) = send(&app, Method::POST, &uri, Some(json!({"period": "2024-01"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(amount(&first["amount"]), dec!(10));

    let (_, again) = send(&app, Method::POST, &uri, Some(json!({"period": "2024-01"}))).await;
    assert_eq!(first["id"], again["id"]);

    let empty = id_of(&open_account(&app, Uuid::new_v4(), "0").await);
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/accounts/{empty}/interest"),
        Some(json!({"period": "2024-01"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_statement_rejects_inverted_window() {
    let app = app();
    let account_id = id_of(&open_account(&app, Uuid::new_v4(), "10").await);

    let (status, statement) = send(
        &app,
        Method::GET,
        &format!("/api/v1/accounts/{account_id}/statement?from=2024-01-01T00:00:00Z&to=2024-02-01T00:00:00Z"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&statement["closing_balance"]), dec!(10));

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/accounts/{account_id}/statement?from=2024-02-01T00:00:00Z&to=2024-01-01T00:00:00Z"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_loan_lifecycle_through_the_api() {
    let app = app();
    let borrower = Uuid::new_v4();
    let guarantor = Uuid::new_v4();
    let account = open_account(&app, borrower, "0").await;
    let account_id = id_of(&account);

    let (status, loan) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(json!({
            "member_id": borrower,
            "principal": "1200",
            "purpose": "School fees",
            "term_months": 12,
            "annual_rate_percent": "0",
            "disbursement_account": account_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["status"], "pending");
    assert_eq!(amount(&loan["monthly_payment"]), dec!(100));
    let loan_id = id_of(&loan);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/loans/{loan_id}/guarantors"),
        Some(json!({"guarantor_member_id": guarantor, "guarantee_percentage": "50"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, approved) = send(&app, Method::POST, &format!("/api/v1/loans/{loan_id}/approve"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (status, active) = send(&app, Method::POST, &format!("/api/v1/loans/{loan_id}/disburse"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["status"], "active");
    assert_eq!(amount(&active["remaining_balance"]), dec!(1200));

    let (_, account) = send(&app, Method::GET, &format!("/api/v1/accounts/{account_id}"), None).await;
    assert_eq!(amount(&account["balance"]), dec!(1200));

    let (_, capacity) = send(
        &app,
        Method::GET,
        &format!("/api/v1/members/{guarantor}/guarantee-capacity?amount=100"),
        None,
    )
    .await;
    assert_eq!(capacity["allowed"], true);
    assert_eq!(capacity["current_guarantees"], 1);
    assert_eq!(amount(&capacity["current_exposure"]), dec!(600));

    let (status, receipt) = send(
        &app,
        Method::POST,
        &format!("/api/v1/loans/{loan_id}/repayments"),
        Some(json!({"amount": "1200", "account_id": account_id, "reference": "PAYOFF"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["loan"]["status"], "paid");

    let (status, replay) = send(
        &app,
        Method::POST,
        &format!("/api/v1/loans/{loan_id}/repayments"),
        Some(json!({"amount": "1200", "account_id": account_id, "reference": "PAYOFF"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["replayed"], true);

    let (_, account) = send(&app, Method::GET, &format!("/api/v1/accounts/{account_id}"), None).await;
    assert!(amount(&account["balance"]).is_zero());

    let (_, guarantors) = send(&app, Method::GET, &format!("/api/v1/loans/{loan_id}/guarantors"), None).await;
    assert_eq!(guarantors[0]["status"], "released");
}

#[tokio::test]
async fn test_cancelled_loan_cannot_be_approved() {
    let app = app();
    let borrower = Uuid::new_v4();
    let account_id = id_of(&open_account(&app, borrower, "0").await);
    let (_, loan) = send(
        &app,
        Method::POST,
        "/api/v1/loans",
        Some(json!({
            "member_id": borrower,
            "principal": "5000",
            "purpose": "Roof",
            "term_months": 24,
            "annual_rate_percent": "12",
            "disbursement_account": account_id,
        })),
    )
    .await;
    let loan_id = id_of(&loan);

    let (status, cancelled) = send(
        &app,
        Method::POST,
        &format!("/api/v1/loans/{loan_id}/cancel"),
        Some(json!({"reason": "withdrawn by member"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, error) = send(&app, Method::POST, &format!("/api/v1/loans/{loan_id}/approve"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "INVALID_STATE_TRANSITION");
}
