//! Integration tests driving the full router in-process over the in-memory
//! store: authentication, role guards, the booking flow and the payment
//! webhook.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt; // For `oneshot` method

use sp_server::api::auth::{Role, TokenVerifier};
use sp_server::api::{AppState, create_router};
use stayport::booking::{BookingOrchestrator, CommissionPolicy};
use stayport::coupon::CouponValidator;
use stayport::db::{InventoryStore, MemoryStore};
use stayport::inventory::NewRoomType;
use stayport::payment::{MockGateway, PaymentReconciler};
use stayport::wallet::WalletService;

const JWT_SECRET: &str = "integration-test-secret-32-chars!!";
const WEBHOOK_SECRET: &str = "webhook-secret-16ch";
const PARTNER: i64 = 700;

struct TestServer {
    app: Router,
    store: Arc<MemoryStore>,
    gateway: Arc<MockGateway>,
    tokens: Arc<TokenVerifier>,
}

fn test_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new(WEBHOOK_SECRET));
    let tokens = Arc::new(TokenVerifier::new(JWT_SECRET));

    let wallets = Arc::new(WalletService::new(store.clone(), gateway.clone(), 10_000));
    let bookings = Arc::new(BookingOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        CouponValidator::new(store.clone()),
        gateway.clone(),
        CommissionPolicy::new(1_500),
        "INR",
    ));
    let reconciler = Arc::new(PaymentReconciler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        gateway.verifier(),
        Duration::minutes(30),
    ));

    let state = AppState {
        bookings,
        reconciler,
        wallets,
        tokens: tokens.clone(),
        database: None,
        currency: "INR".to_string(),
    };

    TestServer {
        app: create_router(state),
        store,
        gateway,
        tokens,
    }
}

impl TestServer {
    fn token(&self, user_id: i64, role: Role) -> String {
        self.tokens
            .issue(user_id, role, Duration::minutes(15))
            .expect("token issuance")
    }

    async fn seed_room(&self) -> i64 {
        self.store
            .insert_room_type(NewRoomType {
                property_id: 1,
                name: "Standard".to_string(),
                total_inventory: 3,
                price_per_night: 2_000,
                max_occupancy: 2,
                is_active: true,
            })
            .await
            .unwrap()
            .id
    }
}

fn authed_post(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("JSON body")
}

fn booking_payload(room_id: i64) -> Value {
    json!({
        "room_type_id": room_id,
        "check_in": "2026-09-10",
        "check_out": "2026-09-12",
        "rooms": 1,
        "guests": 2,
        "pay_at_property": false,
        "partner_id": PARTNER,
    })
}

#[tokio::test]
async fn health_check_is_public_and_healthy() {
    let server = test_server();

    let response = server
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let server = test_server();

    let response = server
        .app
        .oneshot(
            Request::builder()
                .uri("/api/wallet")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_token_is_rejected() {
    let server = test_server();

    let response = server
        .app
        .oneshot(authed_get("/api/wallet", "not-a-jwt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guest_creates_a_prepaid_booking() {
    let server = test_server();
    let room = server.seed_room().await;
    let token = server.token(42, Role::Guest);

    let response = server
        .app
        .clone()
        .oneshot(authed_post("/api/bookings", &token, booking_payload(room)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    // 2 nights x 2000, confirmed immediately with a gateway order attached.
    assert_eq!(body["total_amount"], 4_000);
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["user_id"], 42);
    assert!(body["payment_ref"].is_string());
}

#[tokio::test]
async fn booking_user_id_comes_from_the_token() {
    let server = test_server();
    let room = server.seed_room().await;
    let token = server.token(42, Role::Guest);

    // A payload cannot book on someone else's behalf.
    let mut payload = booking_payload(room);
    payload["user_id"] = json!(999);

    let response = server
        .app
        .oneshot(authed_post("/api/bookings", &token, payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user_id"], 42);
}

#[tokio::test]
async fn guest_cannot_read_another_guests_booking() {
    let server = test_server();
    let room = server.seed_room().await;
    let owner = server.token(42, Role::Guest);
    let stranger = server.token(43, Role::Guest);

    let response = server
        .app
        .clone()
        .oneshot(authed_post("/api/bookings", &owner, booking_payload(room)))
        .await
        .unwrap();
    let id = json_body(response).await["id"].as_i64().unwrap();

    let response = server
        .app
        .oneshot(authed_get(&format!("/api/bookings/{id}"), &stranger))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn guest_token_cannot_reach_partner_actions() {
    let server = test_server();
    let room = server.seed_room().await;
    let token = server.token(42, Role::Guest);

    let response = server
        .app
        .clone()
        .oneshot(authed_post("/api/bookings", &token, booking_payload(room)))
        .await
        .unwrap();
    let id = json_body(response).await["id"].as_i64().unwrap();

    let response = server
        .app
        .oneshot(authed_post(
            &format!("/api/bookings/{id}/check-in"),
            &token,
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_the_owning_partner_may_check_in() {
    let server = test_server();
    let room = server.seed_room().await;
    let guest = server.token(42, Role::Guest);
    let other_partner = server.token(999, Role::Partner);
    let owning_partner = server.token(PARTNER, Role::Partner);

    let response = server
        .app
        .clone()
        .oneshot(authed_post("/api/bookings", &guest, booking_payload(room)))
        .await
        .unwrap();
    let id = json_body(response).await["id"].as_i64().unwrap();

    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            &format!("/api/bookings/{id}/check-in"),
            &other_partner,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = server
        .app
        .oneshot(authed_post(
            &format!("/api/bookings/{id}/check-in"),
            &owning_partner,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "checked_in");
}

#[tokio::test]
async fn topup_then_webhook_credits_the_wallet() {
    let server = test_server();
    let token = server.token(5, Role::Guest);

    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            "/api/wallet/add-money",
            &token,
            json!({ "amount": 5_000 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let order_id = body["order"]["order_id"].as_str().unwrap().to_string();

    // The gateway delivers the capture; no bearer token on the webhook.
    let signature = server.gateway.sign(&order_id, "pay_001");
    let webhook = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "order_id": order_id,
                "payment_id": "pay_001",
                "amount": 5_000,
                "signature": signature,
            })
            .to_string(),
        ))
        .unwrap();

    let response = server.app.clone().oneshot(webhook).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");

    let response = server
        .app
        .oneshot(authed_get("/api/wallet", &token))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["balance"], 5_000);
    assert_eq!(body["available_balance"], 5_000);
}

#[tokio::test]
async fn replayed_webhook_is_a_duplicate_not_a_second_credit() {
    let server = test_server();
    let token = server.token(5, Role::Guest);

    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            "/api/wallet/add-money",
            &token,
            json!({ "amount": 5_000 }),
        ))
        .await
        .unwrap();
    let order_id = json_body(response).await["order"]["order_id"]
        .as_str()
        .unwrap()
        .to_string();
    let signature = server.gateway.sign(&order_id, "pay_001");

    let payload = json!({
        "order_id": order_id,
        "payment_id": "pay_001",
        "amount": 5_000,
        "signature": signature,
    });

    for expected in ["ok", "duplicate"] {
        let webhook = Request::builder()
            .method("POST")
            .uri("/api/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let response = server.app.clone().oneshot(webhook).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], expected);
    }

    let response = server
        .app
        .oneshot(authed_get("/api/wallet", &token))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["balance"], 5_000);
}

#[tokio::test]
async fn forged_webhook_is_ignored_and_never_credits() {
    let server = test_server();
    let token = server.token(5, Role::Guest);

    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            "/api/wallet/add-money",
            &token,
            json!({ "amount": 5_000 }),
        ))
        .await
        .unwrap();
    let order_id = json_body(response).await["order"]["order_id"]
        .as_str()
        .unwrap()
        .to_string();

    let webhook = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "order_id": order_id,
                "payment_id": "pay_001",
                "amount": 5_000,
                "signature": "deadbeef",
            })
            .to_string(),
        ))
        .unwrap();

    // 200 so the gateway stops retrying, but the event is ignored.
    let response = server.app.clone().oneshot(webhook).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ignored");

    let response = server
        .app
        .oneshot(authed_get("/api/wallet", &token))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["balance"], 0);
}

#[tokio::test]
async fn withdrawal_review_is_admin_only() {
    let server = test_server();
    let partner = server.token(PARTNER, Role::Partner);
    let admin = server.token(1, Role::Admin);

    // Fund the partner wallet via a verified top-up.
    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            "/api/wallet/add-money",
            &partner,
            json!({ "amount": 50_000 }),
        ))
        .await
        .unwrap();
    let order_id = json_body(response).await["order"]["order_id"]
        .as_str()
        .unwrap()
        .to_string();
    let signature = server.gateway.sign(&order_id, "pay_77");
    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            "/api/wallet/verify-add-money",
            &partner,
            json!({
                "order_id": order_id,
                "payment_id": "pay_77",
                "amount": 50_000,
                "signature": signature,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            "/api/wallet/withdraw",
            &partner,
            json!({
                "amount": 20_000,
                "bank_details": {
                    "account_name": "Test Partner",
                    "account_number": "000111222333",
                    "ifsc_code": "TEST0001234",
                },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let withdrawal_id = json_body(response).await["id"].as_i64().unwrap();

    // A partner cannot review their own request.
    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            &format!("/api/admin/withdrawals/{withdrawal_id}/review"),
            &partner,
            json!({ "approve": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            &format!("/api/admin/withdrawals/{withdrawal_id}/review"),
            &admin,
            json!({ "approve": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "paid");

    let response = server
        .app
        .oneshot(authed_get("/api/wallet", &partner))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["balance"], 30_000);
    assert_eq!(body["available_balance"], 30_000);
}

#[tokio::test]
async fn withdrawal_below_minimum_is_a_bad_request() {
    let server = test_server();
    let partner = server.token(PARTNER, Role::Partner);

    let response = server
        .app
        .oneshot(authed_post(
            "/api/wallet/withdraw",
            &partner,
            json!({
                "amount": 500,
                "bank_details": {
                    "account_name": "Test Partner",
                    "account_number": "000111222333",
                    "ifsc_code": "TEST0001234",
                },
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("below the minimum"));
}

#[tokio::test]
async fn cancelling_a_captured_booking_refunds_the_guest_wallet() {
    let server = test_server();
    let room = server.seed_room().await;
    let guest = server.token(42, Role::Guest);

    let response = server
        .app
        .clone()
        .oneshot(authed_post("/api/bookings", &guest, booking_payload(room)))
        .await
        .unwrap();
    let body = json_body(response).await;
    let id = body["id"].as_i64().unwrap();
    let order_id = body["payment_ref"].as_str().unwrap().to_string();

    let signature = server.gateway.sign(&order_id, "pay_9");
    let webhook = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "order_id": order_id,
                "payment_id": "pay_9",
                "amount": 4_000,
                "signature": signature,
            })
            .to_string(),
        ))
        .unwrap();
    let response = server.app.clone().oneshot(webhook).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            &format!("/api/bookings/{id}/cancel"),
            &guest,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["payment_status"], "refunded");

    let response = server
        .app
        .oneshot(authed_get("/api/wallet", &guest))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["balance"], 4_000);
}

#[tokio::test]
async fn transactions_endpoint_lists_the_topup() {
    let server = test_server();
    let token = server.token(5, Role::Guest);

    let response = server
        .app
        .clone()
        .oneshot(authed_post(
            "/api/wallet/add-money",
            &token,
            json!({ "amount": 2_500 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .app
        .oneshot(authed_get("/api/wallet/transactions?limit=10", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let transactions = body.as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["category"], "topup");
    assert_eq!(transactions[0]["status"], "pending");
}
