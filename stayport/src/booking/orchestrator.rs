//! Booking creation: validation, pricing, reservation and the prepaid
//! payment handshake.

use std::sync::Arc;

use log::{error, info};
use uuid::Uuid;

use crate::coupon::CouponValidator;
use crate::db::{BookingStore, InventoryStore, LedgerStore};
use crate::inventory::{InventoryError, night_count};
use crate::payment::PaymentGateway;
use crate::wallet::{OwnerId, OwnerKind, TxCategory};

use super::errors::{BookingError, BookingResult};
use super::models::{Booking, BookingId, BookingRequest, BookingStatus, NewBooking, PaymentStatus};
use super::pricing::{CommissionPolicy, booking_total};

/// Creates bookings and owns the reserve-then-write ordering.
///
/// The reservation is taken before the booking row is written and rolled
/// back if the write fails, so inventory is never held without a booking.
/// Conversely a booking is only returned to the caller once its holds
/// exist, so a booking never outlives its inventory claim.
pub struct BookingOrchestrator {
    bookings: Arc<dyn BookingStore>,
    inventory: Arc<dyn InventoryStore>,
    ledger: Arc<dyn LedgerStore>,
    coupons: CouponValidator,
    gateway: Arc<dyn PaymentGateway>,
    commission: CommissionPolicy,
    currency: String,
}

impl BookingOrchestrator {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        inventory: Arc<dyn InventoryStore>,
        ledger: Arc<dyn LedgerStore>,
        coupons: CouponValidator,
        gateway: Arc<dyn PaymentGateway>,
        commission: CommissionPolicy,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            bookings,
            inventory,
            ledger,
            coupons,
            gateway,
            commission,
            currency: currency.into(),
        }
    }

    /// Create a booking.
    ///
    /// Prepaid bookings come back `confirmed` with a gateway order attached
    /// and a pending payout credit on the partner wallet, both keyed by the
    /// order id; the capture webhook settles them. Pay-at-property bookings
    /// come back `pending` with no gateway involvement.
    pub async fn create_booking(&self, request: BookingRequest) -> BookingResult<Booking> {
        if request.check_out <= request.check_in {
            return Err(BookingError::InvalidDates {
                check_in: request.check_in,
                check_out: request.check_out,
            });
        }
        if request.rooms < 1 {
            return Err(BookingError::InvalidRooms(request.rooms));
        }

        let room = self.inventory.get_room_type(request.room_type_id).await?;
        if !room.is_active {
            return Err(InventoryError::RoomTypeInactive(room.id).into());
        }
        let capacity = room.max_occupancy * request.rooms;
        if request.guests < 1 || request.guests > capacity {
            return Err(BookingError::OverOccupancy {
                guests: request.guests,
                capacity,
            });
        }

        let nights = night_count(request.check_in, request.check_out);
        let gross = nights * room.price_per_night * i64::from(request.rooms);

        // Server-side validation is authoritative; the quote the client saw
        // is advisory and a drift is only worth a log line.
        let (coupon_code, discount) = match &request.coupon_code {
            Some(code) => {
                let quote = self
                    .coupons
                    .validate(code, gross, request.user_id)
                    .await?;
                if let Some(quoted) = request.quoted_discount
                    && quoted != quote.discount
                {
                    info!(
                        "coupon {} quote drift for user {}: client {quoted}, server {}",
                        quote.code, request.user_id, quote.discount
                    );
                }
                (Some(quote.code), quote.discount)
            }
            None => (None, 0),
        };

        let total = booking_total(
            nights,
            room.price_per_night,
            i64::from(request.rooms),
            discount,
        );
        let payout = self.commission.partner_payout(total);
        let reference = Uuid::new_v4();

        self.inventory
            .reserve(
                room.id,
                reference,
                request.check_in,
                request.check_out,
                request.rooms,
            )
            .await?;

        let status = if request.pay_at_property {
            BookingStatus::Pending
        } else {
            BookingStatus::Confirmed
        };
        let new = NewBooking {
            reference,
            user_id: request.user_id,
            property_id: room.property_id,
            room_type_id: room.id,
            check_in: request.check_in,
            check_out: request.check_out,
            rooms: request.rooms,
            guests: request.guests,
            status,
            payment_status: PaymentStatus::Pending,
            total_amount: total,
            discount_amount: discount,
            coupon_code,
            partner_payout: payout,
            partner_id: request.partner_id,
        };

        let booking = match self.bookings.insert_booking(new).await {
            Ok(booking) => booking,
            Err(e) => {
                self.release_or_log(reference).await;
                return Err(e);
            }
        };

        let booking = if request.pay_at_property || total == 0 {
            booking
        } else {
            match self.init_prepaid(&booking).await {
                Ok(booking) => booking,
                Err(e) => {
                    // The booking exists but cannot be paid for; kill it
                    // rather than strand the guest with a dead confirmation.
                    self.release_or_log(reference).await;
                    if let Err(te) = self
                        .bookings
                        .transition_status(
                            booking.id,
                            BookingStatus::Confirmed,
                            BookingStatus::Cancelled,
                        )
                        .await
                    {
                        error!("failed to cancel unpayable booking {}: {te}", booking.id);
                    }
                    return Err(e);
                }
            }
        };

        info!(
            "booking {} created: {} for user {} ({} nights x {} rooms, total {})",
            booking.id, booking.reference, booking.user_id, nights, booking.rooms, total
        );
        Ok(booking)
    }

    /// Attach a gateway order and the pending partner payout credit.
    async fn init_prepaid(&self, booking: &Booking) -> BookingResult<Booking> {
        let order = self
            .gateway
            .create_order(booking.total_amount, &self.currency)
            .await
            .map_err(|e| BookingError::Gateway(e.to_string()))?;
        let partner_wallet = self
            .ledger
            .get_or_create_wallet(booking.partner_id, OwnerKind::Partner)
            .await?;
        self.ledger
            .credit_pending(
                partner_wallet.id,
                booking.total_amount,
                TxCategory::BookingPayout,
                &order.order_id,
                Some("Booking payment"),
            )
            .await?;
        self.bookings
            .set_payment_ref(booking.id, &order.order_id)
            .await
    }

    async fn release_or_log(&self, reference: Uuid) {
        if let Err(e) = self.inventory.release(reference).await {
            error!("failed to release holds for {reference}: {e}");
        }
    }

    /// Get booking by id.
    pub async fn get_booking(&self, id: BookingId) -> BookingResult<Booking> {
        self.bookings.get_booking(id).await
    }

    /// Bookings for a user, newest first.
    pub async fn bookings_for_user(
        &self,
        user_id: OwnerId,
        limit: i64,
    ) -> BookingResult<Vec<Booking>> {
        self.bookings.bookings_for_user(user_id, limit).await
    }
}
