//! Coupon error types.

use thiserror::Error;

/// Coupon validation errors
#[derive(Debug, Error)]
pub enum CouponError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unknown or inactive coupon code
    #[error("Invalid coupon code: {0}")]
    InvalidCoupon(String),

    /// Outside the offer's validity window
    #[error("Coupon {0} has expired or is not yet valid")]
    Expired(String),

    /// Booking amount below the offer's minimum
    #[error("Booking amount {amount} is below the coupon minimum of {minimum}")]
    BelowMinimum { minimum: i64, amount: i64 },

    /// Per-user usage limit reached
    #[error("Coupon {code} usage limit of {limit} reached")]
    UsageExceeded { code: String, limit: i32 },
}

impl CouponError {
    /// Get a client-safe, actionable error message.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            CouponError::Database(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for coupon operations
pub type CouponResult<T> = Result<T, CouponError>;
