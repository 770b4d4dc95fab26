//! Inventory error types.

use chrono::NaiveDate;
use thiserror::Error;

/// Inventory errors
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Room type not found
    #[error("Room type not found: {0}")]
    RoomTypeNotFound(i64),

    /// Room type is not accepting bookings
    #[error("Room type {0} is inactive")]
    RoomTypeInactive(i64),

    /// No capacity left for at least one night in the requested range
    #[error("No inventory left for room type {room_type_id} on {night}")]
    OutOfInventory {
        room_type_id: i64,
        night: NaiveDate,
    },

    /// Check-out must be strictly after check-in
    #[error("Invalid date range: {check_in} to {check_out}")]
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
}

impl InventoryError {
    /// Get a client-safe, actionable error message.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            InventoryError::Database(_) => "Internal server error".to_string(),
            InventoryError::RoomTypeNotFound(_) | InventoryError::RoomTypeInactive(_) => {
                "Room is not available for booking".to_string()
            }
            InventoryError::OutOfInventory { .. } => {
                "Room no longer available for the selected dates".to_string()
            }
            InventoryError::InvalidRange { .. } => {
                "Check-out date must be after check-in date".to_string()
            }
        }
    }
}

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;
