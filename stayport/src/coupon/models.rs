//! Offer/coupon data models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Discount type for an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Flat,
    Percent,
}

impl DiscountType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DiscountType::Flat => "flat",
            DiscountType::Percent => "percent",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flat" => Some(DiscountType::Flat),
            "percent" => Some(DiscountType::Percent),
            _ => None,
        }
    }
}

/// A time-bounded discount rule identified by a code.
///
/// The stored `code` is the canonical (uppercase) form; lookup is
/// case-insensitive. `valid_until` uses end-of-day semantics: an offer
/// ending today is valid through the whole day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub min_booking_amount: i64,
    pub usage_limit_per_user: i32,
    pub is_active: bool,
}

impl Offer {
    /// Discount for `amount`, per the offer's type, never exceeding `amount`.
    ///
    /// Flat offers cap at the amount; percent offers floor the quotient.
    #[must_use]
    pub fn discount_for(&self, amount: i64) -> i64 {
        let raw = match self.discount_type {
            DiscountType::Flat => self.discount_value,
            DiscountType::Percent => amount * self.discount_value / 100,
        };
        raw.clamp(0, amount)
    }
}

/// Offer fields written by the admin boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOffer {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    pub min_booking_amount: i64,
    pub usage_limit_per_user: i32,
    pub is_active: bool,
}

/// Canonical form of a coupon code: trimmed, uppercased.
#[must_use]
pub fn canonical_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// A validated discount quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponQuote {
    /// Canonical code, as stored.
    pub code: String,
    pub discount: i64,
}
