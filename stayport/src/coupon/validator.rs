//! Coupon validation against the offer store.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::db::OfferStore;
use crate::wallet::OwnerId;

use super::errors::{CouponError, CouponResult};
use super::models::{CouponQuote, canonical_code};

/// Validates coupon codes and computes discounts.
///
/// Checks run in a fixed order so the user sees the most actionable failure:
/// existence and active flag, validity window, minimum booking amount, then
/// the per-user usage limit.
pub struct CouponValidator {
    offers: Arc<dyn OfferStore>,
}

impl CouponValidator {
    pub fn new(offers: Arc<dyn OfferStore>) -> Self {
        Self { offers }
    }

    /// Validate `code` against today's date.
    pub async fn validate(
        &self,
        code: &str,
        amount: i64,
        user_id: OwnerId,
    ) -> CouponResult<CouponQuote> {
        self.validate_on(code, amount, user_id, Utc::now().date_naive())
            .await
    }

    /// Validate against an explicit date. Pure in its inputs: the same code,
    /// amount, usage count and date always yield the same quote.
    pub async fn validate_on(
        &self,
        code: &str,
        amount: i64,
        user_id: OwnerId,
        today: NaiveDate,
    ) -> CouponResult<CouponQuote> {
        let canonical = canonical_code(code);
        let offer = self
            .offers
            .find_offer(&canonical)
            .await?
            .filter(|o| o.is_active)
            .ok_or_else(|| CouponError::InvalidCoupon(canonical.clone()))?;

        // valid_until is inclusive: the offer works through its last day.
        if today < offer.valid_from || today > offer.valid_until {
            return Err(CouponError::Expired(offer.code));
        }
        if amount < offer.min_booking_amount {
            return Err(CouponError::BelowMinimum {
                minimum: offer.min_booking_amount,
                amount,
            });
        }

        let used = self.offers.coupon_usage(user_id, &offer.code).await?;
        if used >= i64::from(offer.usage_limit_per_user) {
            return Err(CouponError::UsageExceeded {
                code: offer.code,
                limit: offer.usage_limit_per_user,
            });
        }

        let discount = offer.discount_for(amount);
        Ok(CouponQuote {
            code: offer.code,
            discount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::models::{DiscountType, NewOffer};
    use crate::db::MemoryStore;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn offer(code: &str) -> NewOffer {
        NewOffer {
            code: code.to_string(),
            discount_type: DiscountType::Percent,
            discount_value: 15,
            valid_from: date(2026, 1, 1),
            valid_until: date(2026, 12, 31),
            min_booking_amount: 1_000,
            usage_limit_per_user: 1,
            is_active: true,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seeded(new: NewOffer) -> (Arc<MemoryStore>, CouponValidator) {
        let store = Arc::new(MemoryStore::new());
        store.insert_offer(new).await.unwrap();
        let validator = CouponValidator::new(store.clone());
        (store, validator)
    }

    #[tokio::test]
    async fn percent_discount_on_qualifying_amount() {
        let (_, v) = seeded(offer("WINTER15")).await;
        let quote = v
            .validate_on("WINTER15", 2_000, 1, date(2026, 6, 1))
            .await
            .unwrap();
        assert_eq!(quote.discount, 300);
        assert_eq!(quote.code, "WINTER15");
    }

    #[tokio::test]
    async fn below_minimum_is_rejected_not_discounted() {
        let (_, v) = seeded(offer("WINTER15")).await;
        let err = v
            .validate_on("WINTER15", 500, 1, date(2026, 6, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CouponError::BelowMinimum {
                minimum: 1_000,
                amount: 500
            }
        ));
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let (_, v) = seeded(offer("WINTER15")).await;
        let quote = v
            .validate_on("  winter15 ", 2_000, 1, date(2026, 6, 1))
            .await
            .unwrap();
        assert_eq!(quote.code, "WINTER15");
    }

    #[tokio::test]
    async fn unknown_and_inactive_codes_look_the_same() {
        let mut inactive = offer("GONE");
        inactive.is_active = false;
        let (_, v) = seeded(inactive).await;
        assert!(matches!(
            v.validate_on("GONE", 2_000, 1, date(2026, 6, 1)).await,
            Err(CouponError::InvalidCoupon(_))
        ));
        assert!(matches!(
            v.validate_on("NEVER", 2_000, 1, date(2026, 6, 1)).await,
            Err(CouponError::InvalidCoupon(_))
        ));
    }

    #[tokio::test]
    async fn window_is_inclusive_of_the_last_day() {
        let (_, v) = seeded(offer("WINTER15")).await;
        assert!(v
            .validate_on("WINTER15", 2_000, 1, date(2026, 12, 31))
            .await
            .is_ok());
        assert!(matches!(
            v.validate_on("WINTER15", 2_000, 1, date(2027, 1, 1)).await,
            Err(CouponError::Expired(_))
        ));
        assert!(matches!(
            v.validate_on("WINTER15", 2_000, 1, date(2025, 12, 31)).await,
            Err(CouponError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn flat_discount_never_exceeds_the_amount() {
        let mut flat = offer("FLAT500");
        flat.discount_type = DiscountType::Flat;
        flat.discount_value = 500;
        flat.min_booking_amount = 0;
        let (_, v) = seeded(flat).await;

        let quote = v
            .validate_on("FLAT500", 300, 1, date(2026, 6, 1))
            .await
            .unwrap();
        assert_eq!(quote.discount, 300);
    }

    #[tokio::test]
    async fn same_inputs_always_yield_the_same_quote() {
        let (_, v) = seeded(offer("WINTER15")).await;
        let a = v
            .validate_on("WINTER15", 2_000, 1, date(2026, 6, 1))
            .await
            .unwrap();
        let b = v
            .validate_on("WINTER15", 2_000, 1, date(2026, 6, 1))
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn discount_stays_within_bounds(
            amount in 0i64..10_000_000,
            value in 0i64..200,
            flat in proptest::bool::ANY,
        ) {
            let offer = crate::coupon::models::Offer {
                id: 1,
                code: "P".to_string(),
                discount_type: if flat { DiscountType::Flat } else { DiscountType::Percent },
                discount_value: value,
                valid_from: date(2026, 1, 1),
                valid_until: date(2026, 12, 31),
                min_booking_amount: 0,
                usage_limit_per_user: 1,
                is_active: true,
            };
            let discount = offer.discount_for(amount);
            prop_assert!(discount >= 0);
            prop_assert!(discount <= amount);
        }
    }
}
