//! Payment gateway boundary, signature verification and event
//! reconciliation.

pub mod errors;
pub mod gateway;
pub mod reconciler;

pub use errors::{PaymentError, PaymentResult};
pub use gateway::{GatewayOrder, MockGateway, PaymentGateway, SignatureVerifier};
pub use reconciler::{CaptureOutcome, GatewayCapture, PaymentReconciler};
