//! Wallet API handlers.
//!
//! Every handler resolves the wallet from the authenticated principal, so a
//! token can never read or move another principal's money. Partners and
//! admins operate on partner wallets, guests on guest wallets.

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use stayport::payment::{CaptureOutcome, GatewayCapture, GatewayOrder};
use stayport::wallet::{
    BankDetails, OwnerKind, Wallet, WalletError, WalletTransaction, WithdrawalRequest,
};

use super::auth::{Claims, Role};
use super::bookings::payment_error_response;
use super::{AppState, ErrorResponse};
use crate::metrics;

/// Which wallet a role operates on.
fn wallet_kind(role: Role) -> OwnerKind {
    if role.is_partner() {
        OwnerKind::Partner
    } else {
        OwnerKind::Guest
    }
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    #[serde(flatten)]
    pub wallet: Wallet,
    /// Recorded balance minus pending withdrawal holds.
    pub available_balance: i64,
}

/// `GET /api/wallet`
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<WalletResponse>, (StatusCode, Json<ErrorResponse>)> {
    let wallet = state
        .wallets
        .get_or_create_wallet(claims.sub, wallet_kind(claims.role))
        .await
        .map_err(|e| wallet_error_response(&e))?;
    let available_balance = state
        .wallets
        .available_balance(wallet.id)
        .await
        .map_err(|e| wallet_error_response(&e))?;
    Ok(Json(WalletResponse {
        wallet,
        available_balance,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    /// Maximum rows returned, newest first.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /api/wallet/transactions`
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<WalletTransaction>>, (StatusCode, Json<ErrorResponse>)> {
    let wallet = state
        .wallets
        .get_or_create_wallet(claims.sub, wallet_kind(claims.role))
        .await
        .map_err(|e| wallet_error_response(&e))?;
    let transactions = state
        .wallets
        .transactions(wallet.id, query.limit.clamp(1, 500))
        .await
        .map_err(|e| wallet_error_response(&e))?;
    Ok(Json(transactions))
}

/// `GET /api/wallet/withdrawals`
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<WithdrawalRequest>>, (StatusCode, Json<ErrorResponse>)> {
    let wallet = state
        .wallets
        .get_or_create_wallet(claims.sub, wallet_kind(claims.role))
        .await
        .map_err(|e| wallet_error_response(&e))?;
    let withdrawals = state
        .wallets
        .withdrawals(wallet.id)
        .await
        .map_err(|e| wallet_error_response(&e))?;
    Ok(Json(withdrawals))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub amount: i64,
    pub bank_details: BankDetails,
}

/// `POST /api/wallet/withdraw`
///
/// Holds the amount against the available balance until a reviewer decides.
pub async fn request_withdrawal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<WithdrawRequest>,
) -> Result<Json<WithdrawalRequest>, (StatusCode, Json<ErrorResponse>)> {
    let wallet = state
        .wallets
        .get_or_create_wallet(claims.sub, wallet_kind(claims.role))
        .await
        .map_err(|e| wallet_error_response(&e))?;
    let request = state
        .wallets
        .request_withdrawal(wallet.id, payload.amount, payload.bank_details)
        .await
        .map_err(|e| wallet_error_response(&e))?;
    metrics::withdrawals_requested_total();
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct AddMoneyRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct AddMoneyResponse {
    pub order: GatewayOrder,
    pub transaction: WalletTransaction,
}

/// `POST /api/wallet/add-money`
///
/// Starts the top-up handshake: a gateway order plus a pending credit keyed
/// by the order id. The capture webhook (or verify-add-money) settles it.
pub async fn add_money(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AddMoneyRequest>,
) -> Result<Json<AddMoneyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let (order, transaction) = state
        .wallets
        .begin_topup(
            claims.sub,
            wallet_kind(claims.role),
            payload.amount,
            &state.currency,
        )
        .await
        .map_err(|e| payment_error_response(&e))?;
    Ok(Json(AddMoneyResponse { order, transaction }))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub status: &'static str,
    pub transaction: Option<WalletTransaction>,
}

/// `POST /api/wallet/verify-add-money`
///
/// Client-side capture verification: the app posts the gateway's order id,
/// payment id and signature after checkout. Goes through the same
/// reconciliation path as the webhook, so whichever arrives first wins and
/// the other resolves as a duplicate.
pub async fn verify_add_money(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(capture): Json<GatewayCapture>,
) -> Result<Json<VerifyResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.reconciler.apply_capture(&capture).await {
        Ok(CaptureOutcome::Applied(tx)) => {
            metrics::captures_total("applied");
            Ok(Json(VerifyResponse {
                status: "verified",
                transaction: Some(tx),
            }))
        }
        Ok(CaptureOutcome::Duplicate) => {
            metrics::captures_total("duplicate");
            Ok(Json(VerifyResponse {
                status: "already_verified",
                transaction: None,
            }))
        }
        Err(e) => {
            metrics::captures_total("rejected");
            Err(payment_error_response(&e))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub approve: bool,
}

/// `POST /api/admin/withdrawals/{id}/review`
///
/// Admin-only. Approval settles the hold and pays out; rejection releases
/// the hold.
pub async fn review_withdrawal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<WithdrawalRequest>, (StatusCode, Json<ErrorResponse>)> {
    if !claims.role.is_admin() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "Admin role required".to_string(),
            }),
        ));
    }

    let reviewed = state
        .wallets
        .review_withdrawal(id, payload.approve)
        .await
        .map_err(|e| wallet_error_response(&e))?;
    Ok(Json(reviewed))
}

/// Map a wallet error to an HTTP response with a client-safe message.
fn wallet_error_response(e: &WalletError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        WalletError::WalletNotFound(_)
        | WalletError::TransactionNotFound(_)
        | WalletError::WithdrawalNotFound(_) => StatusCode::NOT_FOUND,
        WalletError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WalletError::InvalidWithdrawalState { .. } | WalletError::ImmutableTransaction { .. } => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.client_message(),
        }),
    )
}
