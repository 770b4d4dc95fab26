//! JWT token verification and role claims.
//!
//! Token issuance for login lives in the identity service; this server only
//! verifies access tokens and reads the role claim. `TokenVerifier::issue` is
//! kept for operational tooling and the integration tests.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Role carried in the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Partner,
    Admin,
}

impl Role {
    /// Whether this role may act on partner endpoints.
    #[must_use]
    pub fn is_partner(self) -> bool {
        matches!(self, Role::Partner | Role::Admin)
    }

    /// Whether this role bypasses ownership checks.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal ID
    pub sub: i64,
    pub role: Role,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// Verifies access tokens against the shared JWT secret.
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Verify an access token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, expired or signed with a
    /// different secret.
    pub fn verify_access_token(
        &self,
        token: &str,
    ) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        Ok(token_data.claims)
    }

    /// Issue an access token for a principal.
    ///
    /// # Errors
    ///
    /// Returns an error if token serialization fails.
    pub fn issue(
        &self,
        user_id: i64,
        role: Role,
        ttl: chrono::Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new("test-secret-at-least-32-chars-long!")
    }

    #[test]
    fn issued_token_round_trips() {
        let v = verifier();
        let token = v.issue(42, Role::Partner, chrono::Duration::minutes(15)).unwrap();
        let claims = v.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, Role::Partner);
    }

    #[test]
    fn expired_token_is_rejected() {
        let v = verifier();
        let token = v.issue(42, Role::Guest, chrono::Duration::minutes(-5)).unwrap();
        assert!(v.verify_access_token(&token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = verifier()
            .issue(42, Role::Guest, chrono::Duration::minutes(15))
            .unwrap();
        let other = TokenVerifier::new("another-secret-also-32-chars-long!!");
        assert!(other.verify_access_token(&token).is_err());
    }

    #[test]
    fn partner_and_admin_can_act_on_partner_endpoints() {
        assert!(!Role::Guest.is_partner());
        assert!(Role::Partner.is_partner());
        assert!(Role::Admin.is_partner());
        assert!(Role::Admin.is_admin());
        assert!(!Role::Partner.is_admin());
    }
}
