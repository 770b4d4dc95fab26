//! Payment gateway webhook handler.
//!
//! The webhook is unauthenticated at the HTTP layer; trust comes from the
//! HMAC signature inside the payload. Rejected events (bad signature, wrong
//! amount, unknown order) still answer `200` with an `ignored` status:
//! gateways treat non-2xx as transient and retry for days, and a forged or
//! corrupted event will never become valid.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use stayport::payment::{CaptureOutcome, GatewayCapture, PaymentError};

use super::{AppState, ErrorResponse};
use crate::logging::log_security_event;
use crate::metrics;

/// `POST /api/payments/webhook`
pub async fn gateway_webhook(
    State(state): State<AppState>,
    Json(capture): Json<GatewayCapture>,
) -> Result<Json<Value>, (StatusCode, Json<ErrorResponse>)> {
    match state.reconciler.apply_capture(&capture).await {
        Ok(CaptureOutcome::Applied(tx)) => {
            metrics::captures_total("applied");
            Ok(Json(json!({
                "status": "ok",
                "transaction_id": tx.id,
            })))
        }
        Ok(CaptureOutcome::Duplicate) => {
            metrics::captures_total("duplicate");
            Ok(Json(json!({ "status": "duplicate" })))
        }
        Err(
            e @ (PaymentError::SignatureMismatch { .. }
            | PaymentError::AmountMismatch { .. }
            | PaymentError::UnknownOrder(_)),
        ) => {
            metrics::captures_total("rejected");
            log_security_event("webhook_rejected", None, &e.to_string());
            Ok(Json(json!({ "status": "ignored" })))
        }
        Err(e) => {
            metrics::captures_total("error");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.client_message(),
                }),
            ))
        }
    }
}
