//! Payment error types.

use thiserror::Error;

use crate::booking::BookingError;
use crate::wallet::WalletError;

/// Payment errors
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Wallet failure while settling or compensating
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Booking failure while routing a capture
    #[error(transparent)]
    Booking(#[from] BookingError),

    /// No pending transaction matches the gateway order id
    #[error("Unknown gateway order: {0}")]
    UnknownOrder(String),

    /// Signature verification failed; the event is untrusted
    #[error("Signature mismatch for order {order_id}")]
    SignatureMismatch { order_id: String },

    /// Captured amount differs from the recorded pending amount
    #[error("Amount mismatch for order {order_id}: expected {expected}, got {got}")]
    AmountMismatch {
        order_id: String,
        expected: i64,
        got: i64,
    },

    /// Upstream gateway call failed
    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl PaymentError {
    /// Get a client-safe error message.
    ///
    /// Signature and amount mismatches are reported without the recorded
    /// amounts; the full detail goes to the security log only.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            PaymentError::Database(_) | PaymentError::Gateway(_) => {
                "Internal server error".to_string()
            }
            PaymentError::SignatureMismatch { .. } => "Payment verification failed".to_string(),
            PaymentError::AmountMismatch { .. } => "Payment verification failed".to_string(),
            PaymentError::UnknownOrder(_) => "Unknown payment order".to_string(),
            PaymentError::Wallet(e) => e.client_message(),
            PaymentError::Booking(e) => e.client_message(),
        }
    }
}

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;
