//! Booking totals and the injected commission policy.

use serde::{Deserialize, Serialize};

/// Platform commission as a pure function of the charged amount.
///
/// The rate is configuration, not domain logic; nothing in this crate
/// hard-codes a percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommissionPolicy {
    /// Commission in basis points of the charged total (250 = 2.5%).
    pub rate_basis_points: i64,
}

impl CommissionPolicy {
    #[must_use]
    pub const fn new(rate_basis_points: i64) -> Self {
        Self { rate_basis_points }
    }

    /// Platform's share of `total`, floored.
    #[must_use]
    pub fn commission(&self, total: i64) -> i64 {
        (total * self.rate_basis_points / 10_000).clamp(0, total)
    }

    /// Partner's share of `total` after commission.
    #[must_use]
    pub fn partner_payout(&self, total: i64) -> i64 {
        total - self.commission(total)
    }
}

/// Charged total for a stay: nights x nightly price x rooms, minus discount.
/// The discount never pushes the total below zero.
#[must_use]
pub fn booking_total(nights: i64, price_per_night: i64, rooms: i64, discount: i64) -> i64 {
    (nights * price_per_night * rooms - discount).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_splits_total() {
        let policy = CommissionPolicy::new(1_500); // 15%
        assert_eq!(policy.commission(10_000), 1_500);
        assert_eq!(policy.partner_payout(10_000), 8_500);
        assert_eq!(policy.commission(10_000) + policy.partner_payout(10_000), 10_000);
    }

    #[test]
    fn commission_floors_odd_amounts() {
        let policy = CommissionPolicy::new(333);
        assert_eq!(policy.commission(101), 3);
        assert_eq!(policy.partner_payout(101), 98);
    }

    #[test]
    fn total_never_negative() {
        assert_eq!(booking_total(2, 1_000, 1, 5_000), 0);
        assert_eq!(booking_total(3, 2_000, 2, 500), 11_500);
    }
}
