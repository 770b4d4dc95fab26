//! Inventory data models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Room type (inventory unit) ID
pub type RoomTypeId = i64;

/// Property ID
pub type PropertyId = i64;

/// A bookable room/unit category with finite nightly capacity.
///
/// Availability is derived, not stored: each active booking holds one unit
/// per room per night in `[check_in, check_out)`, and the holds for any
/// night must never exceed `total_inventory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomType {
    pub id: RoomTypeId,
    pub property_id: PropertyId,
    pub name: String,
    pub total_inventory: i32,
    /// Nightly price in minor currency units.
    pub price_per_night: i64,
    /// Guests per room.
    pub max_occupancy: i32,
    pub is_active: bool,
}

/// Room type fields written by the onboarding boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoomType {
    pub property_id: PropertyId,
    pub name: String,
    pub total_inventory: i32,
    pub price_per_night: i64,
    pub max_occupancy: i32,
    pub is_active: bool,
}

/// Iterate the nights of a half-open stay range `[check_in, check_out)`.
pub fn nights(check_in: NaiveDate, check_out: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    check_in.iter_days().take_while(move |d| *d < check_out)
}

/// Number of nights in `[check_in, check_out)`. Zero or negative ranges
/// yield 0; callers validate date order before pricing.
#[must_use]
pub fn night_count(check_in: NaiveDate, check_out: NaiveDate) -> i64 {
    (check_out - check_in).num_days().max(0)
}
