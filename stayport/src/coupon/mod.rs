//! Coupon module: offer lookup and discount validation.
//!
//! Validation is stateless aside from reading offer and usage records. The
//! same inputs always produce the same quote, which is what lets the
//! orchestrator re-validate at commit time and let the server-side value
//! win over whatever the client sent.

pub mod errors;
pub mod models;
pub mod validator;

pub use errors::{CouponError, CouponResult};
pub use models::{CouponQuote, DiscountType, NewOffer, Offer, canonical_code};
pub use validator::CouponValidator;
