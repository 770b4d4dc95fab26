//! Inventory module: room types and nightly reservation holds.
//!
//! A reservation holds one unit per room per night across the half-open
//! range `[check_in, check_out)`, all-or-nothing. The capacity check and the
//! hold insertion are a single atomic store operation, so concurrent
//! requests for the last unit cannot both succeed.

pub mod errors;
pub mod models;

pub use errors::{InventoryError, InventoryResult};
pub use models::{NewRoomType, PropertyId, RoomType, RoomTypeId, night_count, nights};
