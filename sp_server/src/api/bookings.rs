//! Booking API handlers.
//!
//! Creation and lookup go through the orchestrator; lifecycle actions
//! (cancel, mark-paid, check-in, complete, no-show) go through the payment
//! reconciler so money compensation and inventory release stay atomic with
//! the status move.
//!
//! Ownership rules: guests may act only on their own bookings, partners only
//! on bookings at their properties, admins on anything.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Deserialize;
use stayport::booking::{BookingError, BookingRequest};
use stayport::Booking;
use stayport::payment::PaymentError;

use super::auth::Claims;
use super::{AppState, ErrorResponse};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub room_type_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: i32,
    pub guests: i32,
    pub coupon_code: Option<String>,
    /// Discount the client saw at quote time; the server re-validates.
    pub quoted_discount: Option<i64>,
    #[serde(default)]
    pub pay_at_property: bool,
    pub partner_id: i64,
}

/// `POST /api/bookings`
///
/// The booking is created for the authenticated principal; the user id in
/// the token wins over anything in the payload.
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, (StatusCode, Json<ErrorResponse>)> {
    let request = BookingRequest {
        user_id: claims.sub,
        room_type_id: payload.room_type_id,
        check_in: payload.check_in,
        check_out: payload.check_out,
        rooms: payload.rooms,
        guests: payload.guests,
        coupon_code: payload.coupon_code,
        quoted_discount: payload.quoted_discount,
        pay_at_property: payload.pay_at_property,
        partner_id: payload.partner_id,
    };

    match state.bookings.create_booking(request).await {
        Ok(booking) => {
            metrics::bookings_created_total();
            Ok(Json(booking))
        }
        Err(e) => {
            if matches!(
                e,
                BookingError::Inventory(
                    stayport::inventory::InventoryError::OutOfInventory { .. }
                )
            ) {
                metrics::booking_conflicts_total();
            }
            Err(booking_error_response(&e))
        }
    }
}

/// `GET /api/bookings/{id}`
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, (StatusCode, Json<ErrorResponse>)> {
    let booking = state
        .bookings
        .get_booking(id)
        .await
        .map_err(|e| booking_error_response(&e))?;
    authorize_view(&claims, &booking)?;
    Ok(Json(booking))
}

/// `POST /api/bookings/{id}/cancel`
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, (StatusCode, Json<ErrorResponse>)> {
    let booking = state
        .bookings
        .get_booking(id)
        .await
        .map_err(|e| booking_error_response(&e))?;
    authorize_view(&claims, &booking)?;

    let cancelled = state
        .reconciler
        .cancel(id)
        .await
        .map_err(|e| payment_error_response(&e))?;
    Ok(Json(cancelled))
}

/// `POST /api/bookings/{id}/mark-paid`
///
/// Records a cash payment for a pay-at-property booking. Idempotent; the
/// booking status is untouched.
pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, (StatusCode, Json<ErrorResponse>)> {
    authorize_partner_action(&state, &claims, id).await?;

    let booking = state
        .reconciler
        .mark_paid(id)
        .await
        .map_err(|e| payment_error_response(&e))?;
    Ok(Json(booking))
}

/// `POST /api/bookings/{id}/check-in`
pub async fn check_in(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, (StatusCode, Json<ErrorResponse>)> {
    authorize_partner_action(&state, &claims, id).await?;

    let booking = state
        .reconciler
        .check_in(id)
        .await
        .map_err(|e| payment_error_response(&e))?;
    Ok(Json(booking))
}

/// `POST /api/bookings/{id}/complete`
pub async fn complete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, (StatusCode, Json<ErrorResponse>)> {
    authorize_partner_action(&state, &claims, id).await?;

    let booking = state
        .reconciler
        .complete(id)
        .await
        .map_err(|e| payment_error_response(&e))?;
    Ok(Json(booking))
}

/// `POST /api/bookings/{id}/no-show`
pub async fn no_show(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, (StatusCode, Json<ErrorResponse>)> {
    authorize_partner_action(&state, &claims, id).await?;

    let booking = state
        .reconciler
        .no_show(id)
        .await
        .map_err(|e| payment_error_response(&e))?;
    Ok(Json(booking))
}

/// Owner, the booking's partner, or an admin may view and cancel.
fn authorize_view(
    claims: &Claims,
    booking: &Booking,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let allowed = claims.role.is_admin()
        || booking.user_id == claims.sub
        || (claims.role.is_partner() && booking.partner_id == claims.sub);
    if allowed {
        Ok(())
    } else {
        Err(forbidden())
    }
}

/// Lifecycle actions require the partner that owns the booking, or an admin.
async fn authorize_partner_action(
    state: &AppState,
    claims: &Claims,
    id: i64,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let booking = state
        .bookings
        .get_booking(id)
        .await
        .map_err(|e| booking_error_response(&e))?;
    if claims.role.is_admin() || booking.partner_id == claims.sub {
        Ok(())
    } else {
        Err(forbidden())
    }
}

fn forbidden() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "Not allowed to act on this booking".to_string(),
        }),
    )
}

/// Map a booking error to an HTTP response with a client-safe message.
pub fn booking_error_response(e: &BookingError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        BookingError::BookingNotFound(_) => StatusCode::NOT_FOUND,
        BookingError::ConcurrentTransition { .. } => StatusCode::CONFLICT,
        BookingError::Inventory(stayport::inventory::InventoryError::OutOfInventory {
            ..
        }) => StatusCode::CONFLICT,
        BookingError::Database(_) | BookingError::Gateway(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
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

/// Map a payment error to an HTTP response with a client-safe message.
pub fn payment_error_response(e: &PaymentError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        PaymentError::UnknownOrder(_) => StatusCode::NOT_FOUND,
        PaymentError::SignatureMismatch { .. } | PaymentError::AmountMismatch { .. } => {
            StatusCode::BAD_REQUEST
        }
        PaymentError::Database(_) | PaymentError::Gateway(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PaymentError::Booking(inner) => return booking_error_response(inner),
        PaymentError::Wallet(_) => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.client_message(),
        }),
    )
}
