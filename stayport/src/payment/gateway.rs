//! Payment gateway boundary.
//!
//! The gateway is a trait seam so the reconciliation flows can run against
//! [`MockGateway`] in tests and local development. Capture authenticity is
//! checked by [`SignatureVerifier`]: HMAC-SHA256 over
//! `"{order_id}|{payment_id}"` with the webhook secret, compared in constant
//! time. The captured amount is checked separately against the recorded
//! pending transaction, which is the authoritative figure.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::{PaymentError, PaymentResult};

type HmacSha256 = Hmac<Sha256>;

/// An order created at the gateway, to be paid by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    /// Gateway-issued order id; doubles as the ledger idempotency key.
    pub order_id: String,
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
}

/// Trait for the upstream payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an order for the given amount.
    async fn create_order(&self, amount: i64, currency: &str) -> PaymentResult<GatewayOrder>;
}

/// Verifies gateway capture signatures.
///
/// The signed payload is `"{order_id}|{payment_id}"`; the signature is
/// lowercase hex of the HMAC-SHA256 digest.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Compute the expected signature for a capture.
    #[must_use]
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison against the expected signature.
    #[must_use]
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let expected = self.sign(order_id, payment_id);
        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// In-process gateway for tests and `--memory` runs.
///
/// Issues sequential order ids and signs captures with the same secret its
/// verifier checks against, so end-to-end flows work without a network.
pub struct MockGateway {
    verifier: SignatureVerifier,
    counter: AtomicU64,
    /// When set, `create_order` fails with this message.
    fail_with: Option<String>,
}

impl MockGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            verifier: SignatureVerifier::new(secret),
            counter: AtomicU64::new(0),
            fail_with: None,
        }
    }

    /// A gateway whose `create_order` always fails, for rollback tests.
    pub fn failing(secret: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            verifier: SignatureVerifier::new(secret),
            counter: AtomicU64::new(0),
            fail_with: Some(message.into()),
        }
    }

    /// Verifier sharing this gateway's secret.
    #[must_use]
    pub fn verifier(&self) -> SignatureVerifier {
        self.verifier.clone()
    }

    /// Sign a capture the way the real gateway would.
    #[must_use]
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        self.verifier.sign(order_id, payment_id)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(&self, amount: i64, currency: &str) -> PaymentResult<GatewayOrder> {
        if let Some(message) = &self.fail_with {
            return Err(PaymentError::Gateway(message.clone()));
        }
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(GatewayOrder {
            order_id: format!("order_mock_{seq:08}"),
            amount,
            currency: currency.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let verifier = SignatureVerifier::new("webhook-secret");
        let sig = verifier.sign("order_1", "pay_1");
        assert!(verifier.verify("order_1", "pay_1", &sig));
    }

    #[test]
    fn tampered_fields_fail_verification() {
        let verifier = SignatureVerifier::new("webhook-secret");
        let sig = verifier.sign("order_1", "pay_1");
        assert!(!verifier.verify("order_2", "pay_1", &sig));
        assert!(!verifier.verify("order_1", "pay_2", &sig));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let signer = SignatureVerifier::new("secret-a");
        let verifier = SignatureVerifier::new("secret-b");
        let sig = signer.sign("order_1", "pay_1");
        assert!(!verifier.verify("order_1", "pay_1", &sig));
    }

    #[tokio::test]
    async fn mock_gateway_issues_distinct_orders() {
        let gateway = MockGateway::new("s");
        let a = gateway.create_order(100, "INR").await.unwrap();
        let b = gateway.create_order(100, "INR").await.unwrap();
        assert_ne!(a.order_id, b.order_id);
        assert_eq!(a.amount, 100);
    }

    #[tokio::test]
    async fn failing_gateway_reports_error() {
        let gateway = MockGateway::failing("s", "gateway down");
        let err = gateway.create_order(100, "INR").await.unwrap_err();
        assert!(matches!(err, PaymentError::Gateway(_)));
    }
}
