//! Booking data models and the status transition table.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inventory::{PropertyId, RoomTypeId};
use crate::wallet::OwnerId;

/// Booking ID type
pub type BookingId = i64;

/// Booking lifecycle status.
///
/// Transitions are closed: anything not admitted by
/// [`BookingStatus::can_transition_to`] is rejected by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "checked_in" => Some(BookingStatus::CheckedIn),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "no_show" => Some(BookingStatus::NoShow),
            _ => None,
        }
    }

    /// The transition table.
    ///
    /// - `pending -> confirmed` on payment capture
    /// - `pending | confirmed -> cancelled | no_show`
    /// - `confirmed -> checked_in` on arrival, `-> completed` on rollover
    /// - `checked_in -> completed`
    /// - terminal states admit nothing
    #[must_use]
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::{Cancelled, CheckedIn, Completed, Confirmed, NoShow, Pending};
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending | Confirmed, Cancelled | NoShow)
                | (Confirmed, CheckedIn | Completed)
                | (CheckedIn, Completed)
        )
    }

    /// States whose bookings hold inventory.
    #[must_use]
    pub fn holds_inventory(self) -> bool {
        matches!(
            self,
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::CheckedIn
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status, independent of the booking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booking record. Never hard-deleted; cancellation is a state, not a
/// deletion, so the ledger audit trail stays intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    /// Externally visible reference; inventory holds are keyed by it.
    pub reference: Uuid,
    pub user_id: OwnerId,
    pub property_id: PropertyId,
    pub room_type_id: RoomTypeId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: i32,
    pub guests: i32,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    /// Charged amount after discount, minor units.
    pub total_amount: i64,
    pub discount_amount: i64,
    pub coupon_code: Option<String>,
    /// Partner's share of `total_amount` after platform commission.
    pub partner_payout: i64,
    /// Partner principal credited on payout.
    pub partner_id: OwnerId,
    /// Gateway order id for the prepaid flow, if one was created.
    pub payment_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a booking row.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub reference: Uuid,
    pub user_id: OwnerId,
    pub property_id: PropertyId,
    pub room_type_id: RoomTypeId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: i32,
    pub guests: i32,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: i64,
    pub discount_amount: i64,
    pub coupon_code: Option<String>,
    pub partner_payout: i64,
    pub partner_id: OwnerId,
}

/// A booking request as it arrives from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub user_id: OwnerId,
    pub room_type_id: RoomTypeId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: i32,
    pub guests: i32,
    pub coupon_code: Option<String>,
    /// Discount the client saw at quote time. Advisory only; the server
    /// re-validates and its value wins.
    pub quoted_discount: Option<i64>,
    /// Pay-at-property bookings start `pending` with no gateway order;
    /// prepaid bookings start `confirmed` with a gateway order attached.
    pub pay_at_property: bool,
    /// Partner principal that owns the property.
    pub partner_id: OwnerId,
}
