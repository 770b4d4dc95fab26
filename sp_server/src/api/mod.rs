//! HTTP API for the booking and wallet engine.
//!
//! The API is built with:
//! - **Axum**: async web framework
//! - **Tower**: middleware for CORS and authentication
//! - **JWT**: bearer-token authentication with role claims
//!
//! # Modules
//!
//! - [`auth`]: token verification and role claims
//! - [`bookings`]: booking creation, lookup and lifecycle actions
//! - [`wallet`]: balances, transactions, withdrawals, top-ups
//! - [`payments`]: the gateway capture webhook
//! - [`middleware`]: authentication and role guards
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                              - Health check (public)
//! POST /api/payments/webhook                - Gateway capture webhook (signature-authenticated)
//! POST /api/bookings                        - Create booking (auth)
//! GET  /api/bookings/{id}                   - Get booking (owner or partner)
//! POST /api/bookings/{id}/cancel            - Cancel booking (owner or partner)
//! POST /api/bookings/{id}/mark-paid         - Record cash payment (partner)
//! POST /api/bookings/{id}/check-in          - Check the guest in (partner)
//! POST /api/bookings/{id}/complete          - Complete the stay (partner)
//! POST /api/bookings/{id}/no-show           - Mark no-show (partner)
//! GET  /api/wallet                          - Wallet with available balance (auth)
//! GET  /api/wallet/transactions             - Recent transactions (auth)
//! GET  /api/wallet/withdrawals              - Withdrawal requests (auth)
//! POST /api/wallet/withdraw                 - Request a withdrawal (auth)
//! POST /api/wallet/add-money                - Start a gateway top-up (auth)
//! POST /api/wallet/verify-add-money         - Client-side capture verification (auth)
//! POST /api/admin/withdrawals/{id}/review   - Approve or reject a withdrawal (admin)
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod auth;
pub mod bookings;
pub mod middleware;
pub mod payments;
pub mod wallet;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use stayport::db::Database;
use stayport::payment::PaymentReconciler;
use stayport::{BookingOrchestrator, WalletService};
use tower_http::cors::CorsLayer;

use auth::TokenVerifier;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingOrchestrator>,
    pub reconciler: Arc<PaymentReconciler>,
    pub wallets: Arc<WalletService>,
    pub tokens: Arc<TokenVerifier>,
    /// Present only when serving against PostgreSQL; the in-memory backend
    /// has no pool to health-check.
    pub database: Option<Database>,
    pub currency: String,
}

/// Error payload returned by every handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    // Public routes: health, plus the webhook which authenticates itself
    // by HMAC signature rather than a bearer token.
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/payments/webhook", post(payments::gateway_webhook));

    // Partner lifecycle actions carry an extra role guard.
    let partner_routes = Router::new()
        .route("/api/bookings/{id}/mark-paid", post(bookings::mark_paid))
        .route("/api/bookings/{id}/check-in", post(bookings::check_in))
        .route("/api/bookings/{id}/complete", post(bookings::complete))
        .route("/api/bookings/{id}/no-show", post(bookings::no_show))
        .layer(axum::middleware::from_fn(middleware::require_partner));

    let protected_routes = Router::new()
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/{id}", get(bookings::get_booking))
        .route("/api/bookings/{id}/cancel", post(bookings::cancel_booking))
        .route("/api/wallet", get(wallet::get_wallet))
        .route("/api/wallet/transactions", get(wallet::list_transactions))
        .route("/api/wallet/withdrawals", get(wallet::list_withdrawals))
        .route("/api/wallet/withdraw", post(wallet::request_withdrawal))
        .route("/api/wallet/add-money", post(wallet::add_money))
        .route("/api/wallet/verify-add-money", post(wallet::verify_add_money))
        .route(
            "/api/admin/withdrawals/{id}/review",
            post(wallet::review_withdrawal),
        )
        .merge(partner_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the backing store is reachable, `503` otherwise.
/// The in-memory backend is always healthy.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match &state.database {
        Some(db) => db.health_check().await.is_ok(),
        None => true,
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
