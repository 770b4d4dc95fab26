//! Booking error types.

use chrono::NaiveDate;
use thiserror::Error;

use super::models::BookingStatus;
use crate::coupon::CouponError;
use crate::inventory::InventoryError;
use crate::wallet::WalletError;

/// Booking errors
#[derive(Debug, Error)]
pub enum BookingError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Booking not found
    #[error("Booking not found: {0}")]
    BookingNotFound(i64),

    /// Check-out must be strictly after check-in
    #[error("Invalid dates: check-in {check_in}, check-out {check_out}")]
    InvalidDates {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },

    /// Rooms requested must be at least 1
    #[error("Invalid room count: {0}")]
    InvalidRooms(i32),

    /// Guests exceed unit capacity for the rooms requested
    #[error("{guests} guests exceed the capacity of {capacity}")]
    OverOccupancy { guests: i32, capacity: i32 },

    /// Transition not admitted by the status table
    #[error("Cannot transition booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    /// Concurrent transition won; the booking is no longer in the expected state
    #[error("Booking {id} changed concurrently; expected {expected}")]
    ConcurrentTransition { id: i64, expected: BookingStatus },

    /// Inventory failure (out of capacity, unknown unit)
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Coupon failure
    #[error(transparent)]
    Coupon(#[from] CouponError),

    /// Wallet failure during refund or payout
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Gateway order creation failed for a prepaid booking
    #[error("Payment gateway error: {0}")]
    Gateway(String),
}

impl BookingError {
    /// Get a client-safe, actionable error message.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            BookingError::Database(_) | BookingError::Gateway(_) => {
                "Internal server error".to_string()
            }
            BookingError::BookingNotFound(_) => "Booking not found".to_string(),
            BookingError::ConcurrentTransition { .. } => {
                "Booking was updated by someone else; refresh and retry".to_string()
            }
            BookingError::Inventory(e) => e.client_message(),
            BookingError::Coupon(e) => e.client_message(),
            BookingError::Wallet(e) => e.client_message(),
            _ => self.to_string(),
        }
    }
}

/// Result type for booking operations
pub type BookingResult<T> = Result<T, BookingError>;
